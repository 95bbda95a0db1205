//! Model configuration and execution context.
//!
//! `QgcnParams` carries every tunable the model and its training loop read.
//! It is plain data (serde-friendly) so it can be loaded by whatever config
//! layer drives the crate; `validate` is the single place constraints live.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{QgcnError, QgcnResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QgcnParams {
    pub embedding_size: usize,
    pub n_layers: usize,
    /// Raw layer weights, normalised to sum 1 at construction.
    pub alpha_list: Vec<f64>,
    pub learning_rate: f64,
    pub reg_weight: f64,

    // batch field names
    pub user_idx_name: String,
    pub item_idx_name: String,
    pub neg_item_idx_name: String,

    // training loop
    pub epochs: usize,
    pub train_batch_size: usize,
    pub early_stop_num: usize,
    pub topk: usize,
    pub seed: u64,
}

impl Default for QgcnParams {
    fn default() -> Self {
        Self {
            embedding_size: 64,
            n_layers: 2,
            alpha_list: vec![1.0, 1.0, 1.0],
            learning_rate: 1e-3,
            reg_weight: 1e-4,
            user_idx_name: "user_idx".to_string(),
            item_idx_name: "item_idx".to_string(),
            neg_item_idx_name: "neg_item_idx".to_string(),
            epochs: 100,
            train_batch_size: 2048,
            early_stop_num: 10,
            topk: 10,
            seed: 123,
        }
    }
}

// Floats compared with relative tolerance, everything else exactly
impl PartialEq for QgcnParams {
    fn eq(&self, other: &Self) -> bool {
        self.embedding_size == other.embedding_size
            && self.n_layers == other.n_layers
            && self.alpha_list.len() == other.alpha_list.len()
            && self
                .alpha_list
                .iter()
                .zip(other.alpha_list.iter())
                .all(|(a, b)| approx::relative_eq!(a, b))
            && approx::relative_eq!(self.learning_rate, other.learning_rate)
            && approx::relative_eq!(self.reg_weight, other.reg_weight)
            && self.user_idx_name == other.user_idx_name
            && self.item_idx_name == other.item_idx_name
            && self.neg_item_idx_name == other.neg_item_idx_name
            && self.epochs == other.epochs
            && self.train_batch_size == other.train_batch_size
            && self.early_stop_num == other.early_stop_num
            && self.topk == other.topk
            && self.seed == other.seed
    }
}

impl QgcnParams {
    /// Check every constraint and return the normalised layer weights.
    ///
    /// Fails with `AlphaLengthMismatch` when `alpha_list.len() != n_layers + 1`
    /// and with `InvalidParameter` for any other violated constraint.
    pub fn validate(&self) -> QgcnResult<Vec<f64>> {
        debug!("Validating params: {:?}", self);

        if self.embedding_size == 0 {
            return Err(QgcnError::invalid("embedding_size", 0, "must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(QgcnError::invalid(
                "learning_rate",
                self.learning_rate,
                "must be finite and positive",
            ));
        }
        if !(self.reg_weight.is_finite() && self.reg_weight >= 0.0) {
            return Err(QgcnError::invalid(
                "reg_weight",
                self.reg_weight,
                "must be finite and non-negative",
            ));
        }
        if self.train_batch_size == 0 {
            return Err(QgcnError::invalid("train_batch_size", 0, "must be positive"));
        }
        for (name, value) in [
            ("user_idx_name", &self.user_idx_name),
            ("item_idx_name", &self.item_idx_name),
            ("neg_item_idx_name", &self.neg_item_idx_name),
        ] {
            if value.is_empty() {
                return Err(QgcnError::invalid(name, "\"\"", "must not be empty"));
            }
        }

        normalise_alpha(&self.alpha_list, self.n_layers)
    }
}

/// Normalise layer weights to sum 1, enforcing `len == n_layers + 1`.
pub fn normalise_alpha(alpha_list: &[f64], n_layers: usize) -> QgcnResult<Vec<f64>> {
    if alpha_list.len() != n_layers + 1 {
        return Err(QgcnError::AlphaLengthMismatch {
            expected: n_layers + 1,
            actual: alpha_list.len(),
        });
    }
    if let Some(bad) = alpha_list.iter().find(|a| !a.is_finite() || **a < 0.0) {
        return Err(QgcnError::invalid(
            "alpha_list",
            bad,
            "weights must be finite and non-negative",
        ));
    }
    let total: f64 = alpha_list.iter().sum();
    if total <= 0.0 {
        return Err(QgcnError::invalid(
            "alpha_list",
            format!("{:?}", alpha_list),
            "weights must not all be zero",
        ));
    }
    Ok(alpha_list.iter().map(|a| a / total).collect())
}

/// Where heavy numeric work runs.
///
/// Only CPU execution exists; the thread count is the one knob. The context
/// owns its own rayon pool so that constructing a model never touches the
/// global pool.
#[derive(Clone)]
pub struct ExecutionContext {
    num_threads: Option<usize>,
    pool: Arc<ThreadPool>,
}

impl ExecutionContext {
    /// CPU context; `None` lets rayon pick the thread count.
    pub fn cpu(num_threads: Option<usize>) -> QgcnResult<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("qgcn-{}", i));
        if let Some(n) = num_threads {
            if n == 0 {
                return Err(QgcnError::invalid("num_threads", 0, "must be positive"));
            }
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| QgcnError::ThreadPool(e.to_string()))?;
        info!(
            "Execution context: cpu with {} threads",
            pool.current_num_threads()
        );
        Ok(Self { num_threads, pool: Arc::new(pool) })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside this context's thread pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("device", &"cpu")
            .field("requested_threads", &self.num_threads)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}
