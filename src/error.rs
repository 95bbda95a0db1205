//! Error taxonomy for model construction, scoring and training.
//!
//! Configuration errors are raised once, at construction; index and batch
//! errors are raised per call. Numerical degradation of the eigendecomposition
//! is never an error: it is logged and left to the caller to inspect through
//! [`crate::spectral::SpectralOperator`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QgcnError {
    /// `alpha_list` must carry one weight per layer plus one for layer 0.
    #[error("alpha_list has {actual} weights but n_layers + 1 = {expected}")]
    AlphaLengthMismatch { expected: usize, actual: usize },

    /// No bipartite graph can be built without users and items.
    #[error("cannot build a graph with {users} users and {items} items")]
    EmptyGraph { users: usize, items: usize },

    #[error("invalid parameter `{name}` = {value}: {constraint}")]
    InvalidParameter {
        name: String,
        value: String,
        constraint: String,
    },

    #[error("user index {index} out of bounds for {count} users")]
    UserIndexOutOfBounds { index: usize, count: usize },

    #[error("item index {index} out of bounds for {count} items")]
    ItemIndexOutOfBounds { index: usize, count: usize },

    #[error("batch is missing field `{0}`")]
    MissingBatchField(String),

    #[error("batch field `{field}` has {actual} entries, expected {expected}")]
    BatchLengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("at least one example is required")]
    EmptyBatch,

    #[error("eigendecomposition failed: {0}")]
    Decomposition(String),

    #[error("could not create execution context: {0}")]
    ThreadPool(String),
}

impl QgcnError {
    pub(crate) fn invalid(
        name: &str,
        value: impl ToString,
        constraint: &str,
    ) -> Self {
        QgcnError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// True for errors raised while validating configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            QgcnError::AlphaLengthMismatch { .. }
                | QgcnError::EmptyGraph { .. }
                | QgcnError::InvalidParameter { .. }
        )
    }

    /// True for out-of-range user or item indices.
    pub fn is_index(&self) -> bool {
        matches!(
            self,
            QgcnError::UserIndexOutOfBounds { .. } | QgcnError::ItemIndexOutOfBounds { .. }
        )
    }
}

pub type QgcnResult<T> = Result<T, QgcnError>;
