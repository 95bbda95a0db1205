//! # Squared-eigenvector propagation operator (Q0)
//!
//! Given the normalised adjacency `A_hat = P Λ Pᵀ` (full symmetric
//! eigendecomposition, orthonormal eigenvectors in the columns of `P`):
//!
//! ```text
//! S  = P ∘ P                      (elementwise square)
//! Q0 = Σ_k S[:, k] S[:, k]ᵀ  =  S Sᵀ
//! ```
//!
//! `Q0` is dense, symmetric and positive semi-definite. Every eigenmode
//! contributes, so propagation through `Q0` is global rather than
//! neighbourhood-local.
//!
//! ## Cost
//!
//! Both the decomposition and the accumulation are `O(N³)` with
//! `N = n_users + n_items`. This is the dominant cost of model construction
//! and bounds the graph sizes the model is usable on. There is no incremental
//! path: a changed interaction set needs a rebuilt operator.
//!
//! ## Numerical caveats
//!
//! Each connected component of the bipartite graph contributes a ±1 eigenvalue
//! pair and isolated nodes contribute zeros, so graphs with many components have
//! highly degenerate spectra. Eigenvectors inside a degenerate eigenspace are
//! not unique and `Q0` depends on the basis the solver returns. This is not
//! guarded against; `degenerate_eigenvalue_count` and `zero_eigenvalue_count`
//! make it visible and construction logs a warning.

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::evd::EVDDecomposable;

use crate::error::{QgcnError, QgcnResult};
use crate::graph::NormalisedAdjacency;
use crate::operators::{dense_mul, from_row_major, to_row_major, PropagationOperator};

/// Eigenvalues closer than this are treated as one degenerate eigenspace.
pub const DEGENERACY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SpectralOperator {
    nnodes: usize,
    /// Eigenvalues of `A_hat`, in solver order.
    pub eigenvalues: Vec<f64>,
    /// Eigenvectors of `A_hat` as columns.
    pub eigenvectors: DenseMatrix<f64>,
    // Q0, row-major
    q0: Vec<f64>,
}

impl SpectralOperator {
    /// Decompose `adjacency` and accumulate `Q0`.
    pub fn build(adjacency: &NormalisedAdjacency) -> QgcnResult<Self> {
        let n = adjacency.nnodes;
        info!("Starting eigendecomposition of {}x{} adjacency", n, n);

        let dense = adjacency.to_dense();
        let evd = dense
            .evd(true)
            .map_err(|e| QgcnError::Decomposition(e.to_string()))?;
        let eigenvalues = evd.d;
        let eigenvectors = evd.V;
        info!("Eigendecomposition finished: {} eigenpairs", eigenvalues.len());

        let q0 = Self::accumulate_q0(&eigenvectors);

        let op = Self { nnodes: n, eigenvalues, eigenvectors, q0 };

        let zeros = op.zero_eigenvalue_count(DEGENERACY_TOLERANCE);
        let degenerate = op.degenerate_eigenvalue_count(DEGENERACY_TOLERANCE);
        debug!(
            "Spectrum: min {:.6}, max {:.6}, {} zero, {} in degenerate clusters",
            op.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min),
            op.eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            zeros,
            degenerate
        );
        if degenerate > 0 {
            warn!(
                "{} eigenvalues lie in degenerate eigenspaces; Q0 depends on the solver's basis choice",
                degenerate
            );
        }
        Ok(op)
    }

    /// `Q0 = S Sᵀ` with `S = P ∘ P`, parallel over rows.
    fn accumulate_q0(eigenvectors: &DenseMatrix<f64>) -> Vec<f64> {
        let (n, k) = eigenvectors.shape();
        info!("Accumulating Q0 from {} squared eigenvectors", k);

        let squared: Vec<f64> = to_row_major(eigenvectors).into_iter().map(|p| p * p).collect();

        let q0: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let si = &squared[i * k..(i + 1) * k];
                let squared = &squared;
                (0..n).map(move |j| {
                    let sj = &squared[j * k..(j + 1) * k];
                    si.iter().zip(sj.iter()).map(|(a, b)| a * b).sum::<f64>()
                })
            })
            .collect();

        trace!("Q0 accumulated ({} entries)", q0.len());
        info!("Q0 ready ({}x{})", n, n);
        q0
    }

    pub fn nnodes(&self) -> usize {
        self.nnodes
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nnodes && j < self.nnodes,
            "Index out of bounds: ({}, {}) for {}x{} matrix",
            i,
            j,
            self.nnodes,
            self.nnodes
        );
        self.q0[i * self.nnodes + j]
    }

    /// Dense copy of `Q0`.
    pub fn q0(&self) -> DenseMatrix<f64> {
        from_row_major(self.q0.clone(), self.nnodes, self.nnodes)
    }

    /// `P · diag(Λ) · Pᵀ`, which should reproduce `A_hat`.
    pub fn reconstruct(&self) -> DenseMatrix<f64> {
        let n = self.nnodes;
        let p = to_row_major(&self.eigenvectors);
        let k = self.eigenvalues.len();
        let mut data = vec![0.0f64; n * n];
        for i in 0..n {
            for j in 0..n {
                data[i * n + j] = (0..k)
                    .map(|c| p[i * k + c] * self.eigenvalues[c] * p[j * k + c])
                    .sum();
            }
        }
        from_row_major(data, n, n)
    }

    /// Largest absolute entry of `P Λ Pᵀ − A_hat`.
    pub fn reconstruction_error(&self, adjacency: &NormalisedAdjacency) -> f64 {
        let rec = self.reconstruct();
        let mut max_err: f64 = 0.0;
        for i in 0..self.nnodes {
            for j in 0..self.nnodes {
                max_err = max_err.max((rec.get((i, j)) - adjacency.get(i, j)).abs());
            }
        }
        debug!("Reconstruction error: {:.3e}", max_err);
        max_err
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let n = self.nnodes;
        (0..n).all(|i| (i + 1..n).all(|j| (self.q0[i * n + j] - self.q0[j * n + i]).abs() <= tolerance))
    }

    /// Smallest eigenvalue of `Q0` itself (≥ 0 up to round-off).
    pub fn min_q0_eigenvalue(&self) -> QgcnResult<f64> {
        let evd = self
            .q0()
            .evd(true)
            .map_err(|e| QgcnError::Decomposition(e.to_string()))?;
        let min = evd.d.iter().cloned().fold(f64::INFINITY, f64::min);
        if min < -1e-8 {
            warn!("Q0 has a negative eigenvalue {:.3e}", min);
        }
        Ok(min)
    }

    /// Eigenvalues of `A_hat` within `tolerance` of zero.
    pub fn zero_eigenvalue_count(&self, tolerance: f64) -> usize {
        self.eigenvalues.iter().filter(|l| l.abs() <= tolerance).count()
    }

    /// Eigenvalues sharing their value with at least one other eigenvalue.
    pub fn degenerate_eigenvalue_count(&self, tolerance: f64) -> usize {
        let mut sorted = self.eigenvalues.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        (0..sorted.len())
            .filter(|&i| {
                (i > 0 && (sorted[i] - sorted[i - 1]).abs() <= tolerance)
                    || (i + 1 < sorted.len() && (sorted[i + 1] - sorted[i]).abs() <= tolerance)
            })
            .count()
    }
}

impl PropagationOperator for SpectralOperator {
    fn nnodes(&self) -> usize {
        self.nnodes
    }

    fn apply(&self, x: &DenseMatrix<f64>) -> DenseMatrix<f64> {
        dense_mul(&self.q0, self.nnodes, x)
    }
}
