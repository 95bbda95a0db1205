//! # Symmetrically normalised bipartite adjacency
//!
//! Users occupy nodes `[0, n_users)`, items occupy `[n_users, n_users + n_items)`.
//! Every observed interaction `(u, i)` contributes the undirected edge
//! `u -- (n_users + i)`, and the operator is
//!
//! ```text
//! A_hat = D^{-1/2} A D^{-1/2},   A_hat[u, n_users + i] = 1 / sqrt(deg(u) · deg(i))
//! ```
//!
//! Zero degrees are replaced by 1 before inverting. An isolated node has no
//! edges, so its row and column stay empty instead of dividing by zero.
//!
//! Properties guaranteed by construction:
//! - symmetric
//! - no user–user or item–item entries
//! - every row sum lies in `[0, 1]`
//!
//! The matrix is stored as CSR (`sprs::CsMat`) and is never mutated after
//! `GraphNormaliser::build` returns.

use std::fmt;

use log::{debug, info, trace, warn};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use crate::dataset::InteractionSet;
use crate::error::{QgcnError, QgcnResult};
use crate::operators::{from_row_major, sparse_dense_mul, PropagationOperator};

/// Normalised user–item adjacency (CSR).
#[derive(Debug, Clone)]
pub struct NormalisedAdjacency {
    pub matrix: CsMat<f64>,
    pub nnodes: usize,
    pub n_users: usize,
    pub n_items: usize,
    // raw (unnormalised) node degrees
    degrees: Vec<f64>,
}

/// Builds `NormalisedAdjacency` from interaction data.
pub struct GraphNormaliser;

impl GraphNormaliser {
    pub fn build(interactions: &InteractionSet) -> QgcnResult<NormalisedAdjacency> {
        Self::from_pairs(
            interactions.user_count(),
            interactions.item_count(),
            interactions.pairs(),
        )
    }

    /// Lower level entry: pairs are assumed deduplicated and in range.
    pub fn from_pairs(
        n_users: usize,
        n_items: usize,
        pairs: &[(usize, usize)],
    ) -> QgcnResult<NormalisedAdjacency> {
        if n_users == 0 || n_items == 0 {
            return Err(QgcnError::EmptyGraph { users: n_users, items: n_items });
        }
        let nnodes = n_users + n_items;
        info!(
            "Building normalised adjacency: {} users + {} items = {} nodes, {} edges",
            n_users,
            n_items,
            nnodes,
            pairs.len()
        );

        // Step 1: node degrees of the undirected bipartite graph
        let mut degrees = vec![0.0f64; nnodes];
        for &(u, i) in pairs {
            if u >= n_users {
                return Err(QgcnError::UserIndexOutOfBounds { index: u, count: n_users });
            }
            if i >= n_items {
                return Err(QgcnError::ItemIndexOutOfBounds { index: i, count: n_items });
            }
            degrees[u] += 1.0;
            degrees[n_users + i] += 1.0;
        }

        // Step 2: D^{-1/2} with zero degrees treated as 1
        let inv_sqrt: Vec<f64> = degrees
            .iter()
            .map(|&d| if d == 0.0 { 1.0 } else { d.powf(-0.5) })
            .collect();
        let isolated = degrees.iter().filter(|&&d| d == 0.0).count();
        if isolated > 0 {
            debug!("{} isolated nodes normalise to empty rows", isolated);
        }

        // Step 3: both triangles of the bipartite block
        let mut tri = TriMat::with_capacity((nnodes, nnodes), 2 * pairs.len());
        for &(u, i) in pairs {
            let v = n_users + i;
            let w = inv_sqrt[u] * inv_sqrt[v];
            tri.add_triplet(u, v, w);
            tri.add_triplet(v, u, w);
        }
        let matrix: CsMat<f64> = tri.to_csr();
        trace!("CSR adjacency assembled with {} stored entries", matrix.nnz());

        let adjacency = NormalisedAdjacency { matrix, nnodes, n_users, n_items, degrees };
        info!(
            "Normalised adjacency ready ({}x{}) with {} non-zeros",
            nnodes,
            nnodes,
            adjacency.nnz()
        );
        Ok(adjacency)
    }
}

impl NormalisedAdjacency {
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    /// Entry `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nnodes && j < self.nnodes,
            "Index out of bounds: ({}, {}) for {}x{} matrix",
            i,
            j,
            self.nnodes,
            self.nnodes
        );
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Raw node degrees (interaction counts), users first.
    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    pub fn isolated_nodes(&self) -> Vec<usize> {
        self.degrees
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Fraction of zero entries.
    pub fn sparsity(&self) -> f64 {
        let total = (self.nnodes * self.nnodes) as f64;
        (total - self.nnz() as f64) / total
    }

    pub fn row_sum(&self, i: usize) -> f64 {
        self.matrix
            .outer_view(i)
            .map(|r| r.iter().map(|(_, &v)| v).sum())
            .unwrap_or(0.0)
    }

    /// Dense copy, as fed to the eigendecomposition.
    pub fn to_dense(&self) -> DenseMatrix<f64> {
        trace!("Densifying {}x{} adjacency", self.nnodes, self.nnodes);
        let mut data = vec![0.0f64; self.nnodes * self.nnodes];
        for (i, r) in self.matrix.outer_iterator().enumerate() {
            for (j, &v) in r.iter() {
                data[i * self.nnodes + j] = v;
            }
        }
        from_row_major(data, self.nnodes, self.nnodes)
    }

    fn is_user(&self, node: usize) -> bool {
        node < self.n_users
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        trace!("Checking adjacency symmetry with tolerance {:.2e}", tolerance);
        let max_asymmetry = self.max_asymmetry();
        let symmetric = max_asymmetry <= tolerance;
        debug!(
            "Symmetry check: max asymmetry {:.2e}, symmetric: {}",
            max_asymmetry, symmetric
        );
        symmetric
    }

    fn max_asymmetry(&self) -> f64 {
        let mut max_asymmetry: f64 = 0.0;
        for (i, r) in self.matrix.outer_iterator().enumerate() {
            for (j, &v) in r.iter() {
                let back = self.matrix.get(j, i).copied().unwrap_or(0.0);
                max_asymmetry = max_asymmetry.max((v - back).abs());
            }
        }
        max_asymmetry
    }

    /// Verify symmetry, bipartite sparsity pattern and bounded row sums.
    pub fn verify_properties(&self, tolerance: f64) -> AdjacencyValidation {
        info!("Verifying adjacency properties with tolerance {:.2e}", tolerance);
        let mut validation = AdjacencyValidation::new();

        validation.max_asymmetry = self.max_asymmetry();
        validation.is_symmetric = validation.max_asymmetry <= tolerance;

        for i in 0..self.nnodes {
            let s = self.row_sum(i);
            validation.max_row_sum = validation.max_row_sum.max(s.abs());
            if s.abs() > 1.0 + tolerance {
                validation.row_sum_violations.push((i, s));
            }
        }

        for (i, r) in self.matrix.outer_iterator().enumerate() {
            for (j, _) in r.iter() {
                if self.is_user(i) == self.is_user(j) {
                    validation.same_side_edges.push((i, j));
                }
            }
        }

        validation.is_valid = validation.is_symmetric
            && validation.row_sum_violations.is_empty()
            && validation.same_side_edges.is_empty();

        debug!("Adjacency validation results:");
        debug!("  Valid: {}", validation.is_valid);
        debug!("  Max asymmetry: {:.2e}", validation.max_asymmetry);
        debug!("  Max row sum: {:.6}", validation.max_row_sum);
        debug!("  Same-side edges: {}", validation.same_side_edges.len());

        if !validation.is_valid {
            warn!("Adjacency validation failed - matrix may have numerical issues");
        }
        validation
    }

    pub fn statistics(&self) -> AdjacencyStats {
        let user_deg = &self.degrees[..self.n_users];
        let item_deg = &self.degrees[self.n_users..];
        let mean = |d: &[f64]| d.iter().sum::<f64>() / d.len().max(1) as f64;
        let max = |d: &[f64]| d.iter().fold(0.0f64, |acc, &x| acc.max(x));

        let stats = AdjacencyStats {
            nnodes: self.nnodes,
            n_users: self.n_users,
            n_items: self.n_items,
            nnz: self.nnz(),
            sparsity: self.sparsity(),
            mean_user_degree: mean(user_deg),
            max_user_degree: max(user_deg),
            mean_item_degree: mean(item_deg),
            max_item_degree: max(item_deg),
            isolated_nodes: self.isolated_nodes().len(),
        };
        debug!(
            "Adjacency statistics: {} nodes, {} non-zeros, {:.2}% sparse",
            stats.nnodes,
            stats.nnz,
            stats.sparsity * 100.0
        );
        stats
    }
}

impl PropagationOperator for NormalisedAdjacency {
    fn nnodes(&self) -> usize {
        self.nnodes
    }

    fn apply(&self, x: &DenseMatrix<f64>) -> DenseMatrix<f64> {
        sparse_dense_mul(&self.matrix, x)
    }
}

#[derive(Debug, Clone)]
pub struct AdjacencyValidation {
    pub is_valid: bool,
    pub is_symmetric: bool,
    pub max_asymmetry: f64,
    pub max_row_sum: f64,
    pub row_sum_violations: Vec<(usize, f64)>,
    /// Stored user–user or item–item entries.
    pub same_side_edges: Vec<(usize, usize)>,
}

impl AdjacencyValidation {
    fn new() -> Self {
        Self {
            is_valid: false,
            is_symmetric: false,
            max_asymmetry: 0.0,
            max_row_sum: 0.0,
            row_sum_violations: Vec::new(),
            same_side_edges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdjacencyStats {
    pub nnodes: usize,
    pub n_users: usize,
    pub n_items: usize,
    pub nnz: usize,
    pub sparsity: f64,
    pub mean_user_degree: f64,
    pub max_user_degree: f64,
    pub mean_item_degree: f64,
    pub max_item_degree: f64,
    pub isolated_nodes: usize,
}

impl fmt::Display for NormalisedAdjacency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NormalisedAdjacency ({}×{}, {} users, {} items):",
            self.nnodes, self.nnodes, self.n_users, self.n_items
        )?;
        if self.nnodes <= 10 {
            for i in 0..self.nnodes {
                write!(f, "Row {}: [", i)?;
                for j in 0..self.nnodes {
                    write!(f, "{:8.4} ", self.get(i, j))?;
                }
                writeln!(f, "]")?;
            }
        } else {
            write!(f, "{}", self.statistics())?;
        }
        Ok(())
    }
}

impl fmt::Display for AdjacencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Adjacency Statistics:")?;
        writeln!(f, "  Nodes: {} ({} users, {} items)", self.nnodes, self.n_users, self.n_items)?;
        writeln!(
            f,
            "  Non-zero entries: {} ({:.2}% dense)",
            self.nnz,
            (1.0 - self.sparsity) * 100.0
        )?;
        writeln!(
            f,
            "  User degree: mean {:.4}, max {:.0}",
            self.mean_user_degree, self.max_user_degree
        )?;
        writeln!(
            f,
            "  Item degree: mean {:.4}, max {:.0}",
            self.mean_item_degree, self.max_item_degree
        )?;
        writeln!(f, "  Isolated nodes: {}", self.isolated_nodes)?;
        Ok(())
    }
}
