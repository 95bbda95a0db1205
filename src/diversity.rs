//! Embedding dispersion of recommendation lists at several rank depths.
//!
//! For every user, items are ranked by `⟨user, item⟩` (descending) and for
//! each fixed rank window two statistics are taken over the windowed items'
//! embeddings:
//!
//! - mean Euclidean distance of each item to the window centroid
//! - mean Euclidean distance over all unordered item pairs
//!
//! Both are averaged over users, giving fourteen scalars. Low values mean the
//! items a user sees at that depth are tightly clustered.
//!
//! Windows that run past the item count are truncated. A user contributes to
//! the centroid statistic only if its window holds at least one item and to
//! the pairwise statistic only with at least two; a statistic no user
//! contributes to reads 0.

use std::fmt;

use log::{debug, info};
use rayon::prelude::*;

use crate::embedding::BranchEmbeddings;
use crate::model::Qgcn;
use crate::operators::{centroid, euclidean, to_row_major};
use crate::scoring::{all_item_scores, rank_order};

/// Rank windows `[start, end)`.
pub const RANK_WINDOWS: [(usize, usize); 7] = [
    (0, 5),
    (25, 30),
    (50, 55),
    (75, 80),
    (100, 105),
    (150, 155),
    (250, 255),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDiversity {
    pub start: usize,
    pub end: usize,
    pub centroid_distance: f64,
    pub pairwise_distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiversityReport {
    pub windows: [WindowDiversity; 7],
    pub users: usize,
}

impl DiversityReport {
    /// Seven centroid statistics followed by seven pairwise statistics.
    pub fn to_array(&self) -> [f64; 14] {
        let mut out = [0.0; 14];
        for (k, w) in self.windows.iter().enumerate() {
            out[k] = w.centroid_distance;
            out[7 + k] = w.pairwise_distance;
        }
        out
    }
}

impl fmt::Display for DiversityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diversity over {} users:", self.users)?;
        for w in &self.windows {
            writeln!(
                f,
                "  ranks {:>3}-{:<3}  centroid {:.6}  pairwise {:.6}",
                w.start, w.end, w.centroid_distance, w.pairwise_distance
            )?;
        }
        Ok(())
    }
}

// Per-user (centroid, pairwise) for one window, None when too few items.
fn window_stats(items: &[&[f64]]) -> (Option<f64>, Option<f64>) {
    if items.is_empty() {
        return (None, None);
    }
    let c = centroid(items);
    let to_centroid = items.iter().map(|e| euclidean(e, &c)).sum::<f64>() / items.len() as f64;

    if items.len() < 2 {
        return (Some(to_centroid), None);
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for a in 0..items.len() {
        for b in a + 1..items.len() {
            total += euclidean(items[a], items[b]);
            pairs += 1;
        }
    }
    (Some(to_centroid), Some(total / pairs as f64))
}

/// Fourteen dispersion statistics for the given user/item tables.
pub fn embedding_diversity(embeddings: &BranchEmbeddings) -> DiversityReport {
    let n_users = embeddings.n_users();
    let n_items = embeddings.n_items();
    let d = embeddings.embedding_size();
    info!("Computing diversity for {} users over {} items", n_users, n_items);

    let items = to_row_major(&embeddings.items);
    let users: Vec<usize> = (0..n_users).collect();
    let scores = all_item_scores(embeddings, &users);

    // per user: 7 × (centroid, pairwise)
    let per_user: Vec<Vec<(Option<f64>, Option<f64>)>> = scores
        .into_par_iter()
        .map(|row| {
            let mut ranked: Vec<(usize, f64)> = row.into_iter().enumerate().collect();
            ranked.sort_by(rank_order);
            RANK_WINDOWS
                .iter()
                .map(|&(start, end)| {
                    let lo = start.min(n_items);
                    let hi = end.min(n_items);
                    let window: Vec<&[f64]> = ranked[lo..hi]
                        .iter()
                        .map(|&(i, _)| &items[i * d..(i + 1) * d])
                        .collect();
                    window_stats(&window)
                })
                .collect()
        })
        .collect();

    let mut windows = [WindowDiversity {
        start: 0,
        end: 0,
        centroid_distance: 0.0,
        pairwise_distance: 0.0,
    }; 7];
    for (k, &(start, end)) in RANK_WINDOWS.iter().enumerate() {
        let mean = |vals: Vec<f64>| {
            if vals.is_empty() {
                0.0
            } else {
                vals.iter().sum::<f64>() / vals.len() as f64
            }
        };
        let centroid_distance = mean(per_user.iter().filter_map(|u| u[k].0).collect());
        let pairwise_distance = mean(per_user.iter().filter_map(|u| u[k].1).collect());
        windows[k] = WindowDiversity { start, end, centroid_distance, pairwise_distance };
        debug!(
            "Window {}-{}: centroid {:.6}, pairwise {:.6}",
            start, end, centroid_distance, pairwise_distance
        );
    }

    DiversityReport { windows, users: n_users }
}

impl Qgcn {
    /// Diversity of the branch-averaged raw (unpropagated) tables.
    pub fn calculate_diversity(&self) -> DiversityReport {
        let averaged = self.embeddings.averaged();
        self.context.install(|| embedding_diversity(&averaged))
    }
}
