//! # Dual-branch embedding propagation
//!
//! Two independent embedding sets are diffused through two operators:
//!
//! - **local** branch: `E1_t = A_hat · E1_{t-1}` (sparse, neighbourhood diffusion)
//! - **spectral** branch: `E2_t = Q0 · E2_{t-1}` (dense, all-eigenmode diffusion)
//!
//! for `t = 1..n_layers`. Each layer is weighted by `alpha[t]`, the two
//! branches are averaged *per layer*, and the layers are summed:
//!
//! ```text
//! M_t   = (alpha[t] · E1_t + alpha[t] · E2_t) / 2
//! E_out = Σ_t M_t
//! ```
//!
//! The output is split at `n_users` into final user and item tables.
//!
//! Both branches run through the same generic `propagate` routine; only the
//! operator and the table differ. The forward pass reads the current tables
//! and has no side effects, so two calls without an update in between agree
//! exactly.

use log::{debug, info, trace};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::dataset::InteractionBatch;
use crate::embedding::{BranchEmbeddings, DualEmbeddings};
use crate::error::{QgcnError, QgcnResult};
use crate::graph::NormalisedAdjacency;
use crate::loss::LossBreakdown;
use crate::operators::{add_scaled, from_row_major, to_row_major, PropagationOperator};
use crate::optim::Adam;
use crate::params::{ExecutionContext, QgcnParams};
use crate::spectral::SpectralOperator;

/// Layer outputs `E_0 … E_{n_layers}` of one branch.
pub fn propagate<O: PropagationOperator>(
    operator: &O,
    table: &DenseMatrix<f64>,
    n_layers: usize,
) -> Vec<DenseMatrix<f64>> {
    assert_eq!(
        operator.nnodes(),
        table.shape().0,
        "operator over {} nodes applied to a {}-row table",
        operator.nnodes(),
        table.shape().0
    );
    let mut layers = Vec::with_capacity(n_layers + 1);
    layers.push(table.clone());
    for t in 1..=n_layers {
        let next = operator.apply(&layers[t - 1]);
        trace!("Propagated layer {}", t);
        layers.push(next);
    }
    layers
}

/// `Σ_t (alpha[t] · local_t + alpha[t] · spectral_t) / 2`.
///
/// Layers are averaged across branches before summing across depth.
pub fn mix_layers(
    local: &[DenseMatrix<f64>],
    spectral: &[DenseMatrix<f64>],
    alpha: &[f64],
) -> DenseMatrix<f64> {
    assert_eq!(local.len(), alpha.len(), "one alpha weight per local layer");
    assert_eq!(spectral.len(), alpha.len(), "one alpha weight per spectral layer");
    let (n, d) = local[0].shape();

    let mut total = vec![0.0f64; n * d];
    for ((e1, e2), &a) in local.iter().zip(spectral.iter()).zip(alpha.iter()) {
        let mut layer = vec![0.0f64; n * d];
        add_scaled(&mut layer, e1, a);
        add_scaled(&mut layer, e2, a);
        for (acc, m) in total.iter_mut().zip(layer.iter()) {
            *acc += m / 2.0;
        }
    }
    from_row_major(total, n, d)
}

/// `Σ_t weights[t] · Op^t · X`.
pub(crate) fn weighted_power_sum<O: PropagationOperator>(
    operator: &O,
    x: &DenseMatrix<f64>,
    weights: &[f64],
) -> DenseMatrix<f64> {
    let (n, d) = x.shape();
    let layers = propagate(operator, x, weights.len().saturating_sub(1));
    let mut acc = vec![0.0f64; n * d];
    for (layer, &w) in layers.iter().zip(weights.iter()) {
        add_scaled(&mut acc, layer, w);
    }
    from_row_major(acc, n, d)
}

/// Dual-branch graph recommender. Built through [`crate::builder::QgcnBuilder`].
pub struct Qgcn {
    pub(crate) params: QgcnParams,
    pub(crate) alpha: Vec<f64>,
    pub(crate) n_users: usize,
    pub(crate) n_items: usize,
    pub(crate) adjacency: NormalisedAdjacency,
    pub(crate) spectral: SpectralOperator,
    pub(crate) embeddings: DualEmbeddings,
    // one optimiser state per raw table: local users/items, spectral users/items
    pub(crate) optimisers: [Adam; 4],
    pub(crate) context: ExecutionContext,
}

impl Qgcn {
    pub fn params(&self) -> &QgcnParams {
        &self.params
    }

    /// Normalised layer weights (sum to 1, length `n_layers + 1`).
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn n_layers(&self) -> usize {
        self.params.n_layers
    }

    pub fn n_users(&self) -> usize {
        self.n_users
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn embedding_size(&self) -> usize {
        self.params.embedding_size
    }

    pub fn adjacency(&self) -> &NormalisedAdjacency {
        &self.adjacency
    }

    pub fn spectral(&self) -> &SpectralOperator {
        &self.spectral
    }

    /// Raw (layer-0) tables of both branches.
    pub fn embeddings(&self) -> &DualEmbeddings {
        &self.embeddings
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Replace the raw tables, e.g. with a snapshot from another run.
    pub fn set_embeddings(&mut self, embeddings: DualEmbeddings) -> QgcnResult<()> {
        for branch in [&embeddings.local, &embeddings.spectral] {
            let expected = (self.n_users, self.n_items, self.params.embedding_size);
            let actual = (branch.n_users(), branch.n_items(), branch.embedding_size());
            if expected != actual {
                return Err(QgcnError::invalid(
                    "embeddings",
                    format!("{:?}", actual),
                    &format!("shape must be (users, items, d) = {:?}", expected),
                ));
            }
        }
        self.embeddings = embeddings;
        self.optimisers.iter_mut().for_each(|o| o.reset());
        Ok(())
    }

    pub(crate) fn check_user(&self, user: usize) -> QgcnResult<()> {
        if user >= self.n_users {
            Err(QgcnError::UserIndexOutOfBounds { index: user, count: self.n_users })
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_item(&self, item: usize) -> QgcnResult<()> {
        if item >= self.n_items {
            Err(QgcnError::ItemIndexOutOfBounds { index: item, count: self.n_items })
        } else {
            Ok(())
        }
    }

    /// Final propagated user and item tables.
    pub fn forward(&self) -> BranchEmbeddings {
        let n_layers = self.params.n_layers;
        let local_0 = self.embeddings.local.concat();
        let spectral_0 = self.embeddings.spectral.concat();

        let mixed = self.context.install(|| {
            let local = propagate(&self.adjacency, &local_0, n_layers);
            let spectral = propagate(&self.spectral, &spectral_0, n_layers);
            mix_layers(&local, &spectral, &self.alpha)
        });
        trace!("Forward pass done over {} layers", n_layers);

        BranchEmbeddings::split(&mixed, self.n_users)
    }

    /// One optimisation step: forward, loss, gradients, Adam update.
    pub fn train_step(&mut self, batch: &InteractionBatch) -> QgcnResult<LossBreakdown> {
        let (loss, grads) = self.loss_and_gradients(batch)?;

        let tables = [
            (&mut self.embeddings.local.users, &grads.local.users),
            (&mut self.embeddings.local.items, &grads.local.items),
            (&mut self.embeddings.spectral.users, &grads.spectral.users),
            (&mut self.embeddings.spectral.items, &grads.spectral.items),
        ];
        for ((table, grad), optimiser) in tables.into_iter().zip(self.optimisers.iter_mut()) {
            let (r, c) = table.shape();
            let mut values = to_row_major(table);
            optimiser.step(&mut values, &to_row_major(grad));
            *table = from_row_major(values, r, c);
        }

        debug!(
            "Train step: loss {:.6} (ranking {:.6}, reg {:.6})",
            loss.total, loss.ranking, loss.reg
        );
        Ok(loss)
    }

    /// Gradient of the loss w.r.t. the four raw tables, given the gradient
    /// w.r.t. the final node table.
    ///
    /// Forward is linear in the raw tables and both operators are symmetric,
    /// so the backward map is the forward map itself with weights `alpha / 2`.
    pub(crate) fn backpropagate(&self, output_grad: &DenseMatrix<f64>) -> DualEmbeddings {
        let half_alpha: Vec<f64> = self.alpha.iter().map(|a| a / 2.0).collect();
        let (local, spectral) = self.context.install(|| {
            (
                weighted_power_sum(&self.adjacency, output_grad, &half_alpha),
                weighted_power_sum(&self.spectral, output_grad, &half_alpha),
            )
        });
        DualEmbeddings {
            local: BranchEmbeddings::split(&local, self.n_users),
            spectral: BranchEmbeddings::split(&spectral, self.n_users),
        }
    }
}

impl std::fmt::Debug for Qgcn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Qgcn")
            .field("n_users", &self.n_users)
            .field("n_items", &self.n_items)
            .field("embedding_size", &self.params.embedding_size)
            .field("n_layers", &self.params.n_layers)
            .field("alpha", &self.alpha)
            .field("adjacency_nnz", &self.adjacency.nnz())
            .field("context", &self.context)
            .finish()
    }
}

pub(crate) fn log_ready(model: &Qgcn) {
    info!(
        "Model ready: {} users, {} items, d = {}, {} layers, alpha = {:?}",
        model.n_users, model.n_items, model.params.embedding_size, model.params.n_layers, model.alpha
    );
}
