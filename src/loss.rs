//! Pairwise ranking loss with embedding regularisation.
//!
//! For a batch of `(user, positive, negative)` triples:
//!
//! ```text
//! ranking = mean_b  -ln σ(⟨u_b, p_b⟩ − ⟨u_b, n_b⟩)          (final embeddings)
//! reg_k   = (Σ_b ‖u_b‖² + ‖p_b‖² + ‖n_b‖²) / B               (raw tables of branch k)
//! total   = ranking + reg_weight · (reg_local + reg_spectral)
//! ```
//!
//! `-ln σ(x)` is evaluated as `softplus(−x)` so large margins neither
//! overflow nor lose precision.

use std::fmt;

use log::trace;
use smartcore::linalg::basic::arrays::{Array, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::dataset::InteractionBatch;
use crate::embedding::{BranchEmbeddings, DualEmbeddings};
use crate::error::QgcnResult;
use crate::model::Qgcn;
use crate::operators::{dot, from_row_major, squared_norm, vstack};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossBreakdown {
    pub ranking: f64,
    /// `reg_local + reg_spectral`, before `reg_weight`.
    pub reg: f64,
    pub total: f64,
}

impl fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss {:.6} (ranking {:.6}, reg {:.6})",
            self.total, self.ranking, self.reg
        )
    }
}

/// `ln(1 + e^z)` without overflow.
#[inline]
pub fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean `-ln σ(pos − neg)`.
pub fn bpr_loss(pos_scores: &[f64], neg_scores: &[f64]) -> f64 {
    assert_eq!(pos_scores.len(), neg_scores.len());
    if pos_scores.is_empty() {
        return 0.0;
    }
    let sum: f64 = pos_scores
        .iter()
        .zip(neg_scores.iter())
        .map(|(p, n)| softplus(n - p))
        .sum();
    sum / pos_scores.len() as f64
}

/// Summed squared L2 norm of every given vector, divided by the batch size.
pub fn emb_loss(batch_size: usize, embeddings: &[&[Vec<f64>]]) -> f64 {
    if batch_size == 0 {
        return 0.0;
    }
    let total: f64 = embeddings
        .iter()
        .flat_map(|group| group.iter())
        .map(|v| squared_norm(v))
        .sum();
    total / batch_size as f64
}

struct Triples<'a> {
    users: &'a [usize],
    pos: &'a [usize],
    neg: &'a [usize],
}

impl Qgcn {
    fn triples<'a>(&self, batch: &'a InteractionBatch) -> QgcnResult<Triples<'a>> {
        let [users, pos, neg] = batch.aligned([
            self.params.user_idx_name.as_str(),
            self.params.item_idx_name.as_str(),
            self.params.neg_item_idx_name.as_str(),
        ])?;
        for &u in users {
            self.check_user(u)?;
        }
        for &i in pos.iter().chain(neg.iter()) {
            self.check_item(i)?;
        }
        Ok(Triples { users, pos, neg })
    }

    /// Scalar training loss for a batch keyed by the configured field names.
    pub fn calculate_loss(&self, batch: &InteractionBatch) -> QgcnResult<f64> {
        Ok(self.loss_breakdown(batch)?.total)
    }

    pub fn loss_breakdown(&self, batch: &InteractionBatch) -> QgcnResult<LossBreakdown> {
        let t = self.triples(batch)?;
        let out = self.forward();
        Ok(self.evaluate(&t, &out))
    }

    fn evaluate(&self, t: &Triples<'_>, out: &BranchEmbeddings) -> LossBreakdown {
        let b = t.users.len();
        let mut pos_scores = Vec::with_capacity(b);
        let mut neg_scores = Vec::with_capacity(b);
        for k in 0..b {
            let u = out.user(t.users[k]);
            pos_scores.push(dot(&u, &out.item(t.pos[k])));
            neg_scores.push(dot(&u, &out.item(t.neg[k])));
        }
        let ranking = bpr_loss(&pos_scores, &neg_scores);

        let reg_of = |branch: &BranchEmbeddings| {
            let u: Vec<Vec<f64>> = t.users.iter().map(|&i| branch.user(i)).collect();
            let p: Vec<Vec<f64>> = t.pos.iter().map(|&i| branch.item(i)).collect();
            let n: Vec<Vec<f64>> = t.neg.iter().map(|&i| branch.item(i)).collect();
            emb_loss(b, &[u.as_slice(), p.as_slice(), n.as_slice()])
        };
        let reg = reg_of(&self.embeddings.local) + reg_of(&self.embeddings.spectral);

        let total = ranking + self.params.reg_weight * reg;
        trace!("Batch of {}: ranking {:.6}, reg {:.6}", b, ranking, reg);
        LossBreakdown { ranking, reg, total }
    }

    /// Loss and its gradient w.r.t. the four raw tables.
    pub(crate) fn loss_and_gradients(
        &self,
        batch: &InteractionBatch,
    ) -> QgcnResult<(LossBreakdown, DualEmbeddings)> {
        let t = self.triples(batch)?;
        let out = self.forward();
        let loss = self.evaluate(&t, &out);

        let b = t.users.len();
        let d = self.params.embedding_size;
        let inv_b = 1.0 / b as f64;

        // d ranking / d final tables
        let mut g_users = vec![0.0f64; self.n_users * d];
        let mut g_items = vec![0.0f64; self.n_items * d];
        for k in 0..b {
            let (u, p, n) = (t.users[k], t.pos[k], t.neg[k]);
            let ue = out.user(u);
            let pe = out.item(p);
            let ne = out.item(n);
            let margin = dot(&ue, &pe) - dot(&ue, &ne);
            // d/dx softplus(-x) = -σ(-x)
            let g = -sigmoid(-margin) * inv_b;
            for c in 0..d {
                g_users[u * d + c] += g * (pe[c] - ne[c]);
                g_items[p * d + c] += g * ue[c];
                g_items[n * d + c] -= g * ue[c];
            }
        }
        let output_grad = vstack(
            &from_row_major(g_users, self.n_users, d),
            &from_row_major(g_items, self.n_items, d),
        );
        let mut grads = self.backpropagate(&output_grad);

        // d reg / d raw tables
        let scale = 2.0 * self.params.reg_weight * inv_b;
        if scale > 0.0 {
            add_reg_gradient(&mut grads.local, &self.embeddings.local, &t, scale);
            add_reg_gradient(&mut grads.spectral, &self.embeddings.spectral, &t, scale);
        }

        Ok((loss, grads))
    }
}

fn add_reg_gradient(
    grad: &mut BranchEmbeddings,
    raw: &BranchEmbeddings,
    t: &Triples<'_>,
    scale: f64,
) {
    let bump = |g: &mut DenseMatrix<f64>, src: &DenseMatrix<f64>, idx: &[usize]| {
        let d = src.shape().1;
        for &i in idx {
            for c in 0..d {
                let v = *g.get((i, c)) + scale * src.get((i, c));
                g.set((i, c), v);
            }
        }
    };
    bump(&mut grad.users, &raw.users, t.users);
    bump(&mut grad.items, &raw.items, t.pos);
    bump(&mut grad.items, &raw.items, t.neg);
}
