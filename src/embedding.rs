//! Trainable user/item embedding tables.
//!
//! Each branch owns one user table (`n_users × d`) and one item table
//! (`n_items × d`). Tables are Xavier-uniform initialised from a seeded
//! `ChaCha8Rng` so a given seed always produces the same model.

use log::{debug, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{QgcnError, QgcnResult};
use crate::operators::{from_row_major, row, split_rows, vstack};

/// Xavier/Glorot uniform table of shape `rows × cols`.
///
/// Bound is `sqrt(6 / (fan_in + fan_out))` with `fan_in = cols`,
/// `fan_out = rows`, matching an embedding lookup weight.
pub fn xavier_uniform(rows: usize, cols: usize, rng: &mut ChaCha8Rng) -> QgcnResult<DenseMatrix<f64>> {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    let dist = Uniform::new_inclusive(-bound, bound)
        .map_err(|e| QgcnError::invalid("xavier_bound", bound, &e.to_string()))?;
    trace!("Xavier uniform {}x{} with bound {:.6}", rows, cols, bound);
    let data: Vec<f64> = (0..rows * cols).map(|_| dist.sample(rng)).collect();
    Ok(from_row_major(data, rows, cols))
}

/// One branch's user and item tables.
#[derive(Debug, Clone)]
pub struct BranchEmbeddings {
    pub users: DenseMatrix<f64>,
    pub items: DenseMatrix<f64>,
}

impl BranchEmbeddings {
    pub fn new(users: DenseMatrix<f64>, items: DenseMatrix<f64>) -> Self {
        assert_eq!(
            users.shape().1,
            items.shape().1,
            "user and item tables must share the embedding size"
        );
        Self { users, items }
    }

    pub fn xavier(
        n_users: usize,
        n_items: usize,
        embedding_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> QgcnResult<Self> {
        let users = xavier_uniform(n_users, embedding_size, rng)?;
        let items = xavier_uniform(n_items, embedding_size, rng)?;
        Ok(Self { users, items })
    }

    pub fn n_users(&self) -> usize {
        self.users.shape().0
    }

    pub fn n_items(&self) -> usize {
        self.items.shape().0
    }

    pub fn embedding_size(&self) -> usize {
        self.users.shape().1
    }

    /// Node-indexed table: users first, then items.
    pub fn concat(&self) -> DenseMatrix<f64> {
        vstack(&self.users, &self.items)
    }

    /// Inverse of `concat`.
    pub fn split(nodes: &DenseMatrix<f64>, n_users: usize) -> Self {
        let (users, items) = split_rows(nodes, n_users);
        Self { users, items }
    }

    pub fn user(&self, u: usize) -> Vec<f64> {
        row(&self.users, u)
    }

    pub fn item(&self, i: usize) -> Vec<f64> {
        row(&self.items, i)
    }

    /// Elementwise mean of two branches.
    pub fn average(a: &Self, b: &Self) -> Self {
        let mean = |x: &DenseMatrix<f64>, y: &DenseMatrix<f64>| {
            let (r, c) = x.shape();
            let data: Vec<f64> = (0..r)
                .flat_map(|i| (0..c).map(move |j| (i, j)))
                .map(|(i, j)| 0.5 * (x.get((i, j)) + y.get((i, j))))
                .collect();
            from_row_major(data, r, c)
        };
        Self { users: mean(&a.users, &b.users), items: mean(&a.items, &b.items) }
    }
}

/// The four raw tables of the dual-branch model.
#[derive(Debug, Clone)]
pub struct DualEmbeddings {
    /// Propagated through the normalised adjacency.
    pub local: BranchEmbeddings,
    /// Propagated through Q0.
    pub spectral: BranchEmbeddings,
}

impl DualEmbeddings {
    pub fn xavier(
        n_users: usize,
        n_items: usize,
        embedding_size: usize,
        seed: u64,
    ) -> QgcnResult<Self> {
        debug!(
            "Initialising dual embeddings: {} users, {} items, d = {}, seed {}",
            n_users, n_items, embedding_size, seed
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let local = BranchEmbeddings::xavier(n_users, n_items, embedding_size, &mut rng)?;
        let spectral = BranchEmbeddings::xavier(n_users, n_items, embedding_size, &mut rng)?;
        Ok(Self { local, spectral })
    }

    /// Branch-averaged raw (unpropagated) tables.
    pub fn averaged(&self) -> BranchEmbeddings {
        BranchEmbeddings::average(&self.local, &self.spectral)
    }
}
