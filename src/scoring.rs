//! Scoring entry points used by training and evaluation.
//!
//! Every call runs a fresh forward pass; score many users per pass with
//! `score_users` or `full_sort_predict`.

use std::cmp::Ordering;

use log::{debug, trace};
use rayon::prelude::*;

use crate::dataset::{InteractionBatch, InteractionSet};
use crate::embedding::BranchEmbeddings;
use crate::error::QgcnResult;
use crate::model::Qgcn;
use crate::operators::{dot, to_row_major};

impl Qgcn {
    /// `⟨final_user[user], final_item[item]⟩`
    pub fn score(&self, user: usize, item: usize) -> QgcnResult<f64> {
        self.check_user(user)?;
        self.check_item(item)?;
        let out = self.forward();
        Ok(dot(&out.user(user), &out.item(item)))
    }

    /// Scores of `user` against every item, in item order.
    pub fn score_all_items(&self, user: usize) -> QgcnResult<Vec<f64>> {
        self.check_user(user)?;
        let out = self.forward();
        Ok(self.context.install(|| all_item_scores(&out, &[user])).remove(0))
    }

    /// One row of all-item scores per requested user, single forward pass.
    pub fn score_users(&self, users: &[usize]) -> QgcnResult<Vec<Vec<f64>>> {
        for &u in users {
            self.check_user(u)?;
        }
        let out = self.forward();
        Ok(self.context.install(|| all_item_scores(&out, users)))
    }

    /// Pairwise scores for the user/item columns of `batch`.
    pub fn predict(&self, batch: &InteractionBatch) -> QgcnResult<Vec<f64>> {
        let [users, items] = batch.aligned([
            self.params.user_idx_name.as_str(),
            self.params.item_idx_name.as_str(),
        ])?;
        for (&u, &i) in users.iter().zip(items.iter()) {
            self.check_user(u)?;
            self.check_item(i)?;
        }
        let out = self.forward();
        Ok(users
            .iter()
            .zip(items.iter())
            .map(|(&u, &i)| dot(&out.user(u), &out.item(i)))
            .collect())
    }

    /// All-item scores for every user in the batch's user column, flattened
    /// user-major (`users.len() × n_items`).
    pub fn full_sort_predict(&self, batch: &InteractionBatch) -> QgcnResult<Vec<f64>> {
        let users = batch.get(&self.params.user_idx_name)?;
        Ok(self.score_users(users)?.into_iter().flatten().collect())
    }

    /// Top `k` items for `user`, best first, skipping items in `exclude`.
    /// Ties go to the lower item index.
    pub fn recommend_top_k(
        &self,
        user: usize,
        k: usize,
        exclude: Option<&InteractionSet>,
    ) -> QgcnResult<Vec<(usize, f64)>> {
        let scores = self.score_all_items(user)?;
        let mut ranked: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(i, _)| exclude.map(|ex| !ex.contains(user, *i)).unwrap_or(true))
            .collect();
        ranked.sort_by(rank_order);
        ranked.truncate(k);
        debug!("Top-{} for user {}: {:?}", k, user, ranked);
        Ok(ranked)
    }
}

/// Descending by score, then ascending by index.
pub(crate) fn rank_order(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// `U[users] · Iᵀ`, parallel over users.
pub(crate) fn all_item_scores(out: &BranchEmbeddings, users: &[usize]) -> Vec<Vec<f64>> {
    let d = out.embedding_size();
    let n_items = out.n_items();
    let items = to_row_major(&out.items);
    trace!("Scoring {} users against {} items", users.len(), n_items);
    users
        .par_iter()
        .map(|&u| {
            let ue = out.user(u);
            (0..n_items)
                .map(|i| dot(&ue, &items[i * d..(i + 1) * d]))
                .collect()
        })
        .collect()
}
