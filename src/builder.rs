use crate::dataset::InteractionSet;
use crate::embedding::DualEmbeddings;
use crate::error::QgcnResult;
use crate::graph::GraphNormaliser;
use crate::model::{log_ready, Qgcn};
use crate::optim::Adam;
use crate::params::{ExecutionContext, QgcnParams};
use crate::spectral::SpectralOperator;

use log::{debug, info};

/// Configures and constructs a [`Qgcn`].
///
/// `build` is the construction barrier: adjacency normalisation,
/// eigendecomposition, Q0 accumulation and embedding initialisation all
/// complete before a model exists, so every scoring and loss call sees a
/// fully initialised operator pair.
#[derive(Debug, Clone, Default)]
pub struct QgcnBuilder {
    params: QgcnParams,
    context: Option<ExecutionContext>,
}

impl QgcnBuilder {
    pub fn new() -> Self {
        info!("Initializing new QgcnBuilder");
        Self::default()
    }

    /// Replace every parameter at once (e.g. loaded from a config file).
    pub fn with_params(mut self, params: QgcnParams) -> Self {
        debug!("Using supplied params: {:?}", params);
        self.params = params;
        self
    }

    pub fn with_embedding_size(mut self, embedding_size: usize) -> Self {
        info!("Setting embedding size: {}", embedding_size);
        self.params.embedding_size = embedding_size;
        self
    }

    /// Layer count and raw layer weights; `alpha_list` needs `n_layers + 1`
    /// entries and is normalised at build time.
    pub fn with_layers(mut self, n_layers: usize, alpha_list: Vec<f64>) -> Self {
        info!("Configuring {} layers with alpha {:?}", n_layers, alpha_list);
        self.params.n_layers = n_layers;
        self.params.alpha_list = alpha_list;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        info!("Setting learning rate: {}", learning_rate);
        self.params.learning_rate = learning_rate;
        self
    }

    pub fn with_reg_weight(mut self, reg_weight: f64) -> Self {
        info!("Setting reg weight: {}", reg_weight);
        self.params.reg_weight = reg_weight;
        self
    }

    /// Batch field names for user, positive item and negative item columns.
    pub fn with_field_names(
        mut self,
        user_idx_name: &str,
        item_idx_name: &str,
        neg_item_idx_name: &str,
    ) -> Self {
        debug!(
            "Batch fields: user={}, item={}, neg_item={}",
            user_idx_name, item_idx_name, neg_item_idx_name
        );
        self.params.user_idx_name = user_idx_name.to_string();
        self.params.item_idx_name = item_idx_name.to_string();
        self.params.neg_item_idx_name = neg_item_idx_name.to_string();
        self
    }

    pub fn with_training(mut self, epochs: usize, train_batch_size: usize, early_stop_num: usize) -> Self {
        info!(
            "Training: {} epochs, batch size {}, early stop after {}",
            epochs, train_batch_size, early_stop_num
        );
        self.params.epochs = epochs;
        self.params.train_batch_size = train_batch_size;
        self.params.early_stop_num = early_stop_num;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        info!("Setting seed: {}", seed);
        self.params.seed = seed;
        self
    }

    pub fn with_execution_context(mut self, context: ExecutionContext) -> Self {
        info!("Using execution context: {:?}", context);
        self.context = Some(context);
        self
    }

    pub fn params(&self) -> &QgcnParams {
        &self.params
    }

    /// Validate, build both propagation operators and initialise embeddings.
    pub fn build(self, interactions: &InteractionSet) -> QgcnResult<Qgcn> {
        let alpha = self.params.validate()?;
        let context = match self.context {
            Some(ctx) => ctx,
            None => ExecutionContext::cpu(None)?,
        };
        let n_users = interactions.user_count();
        let n_items = interactions.item_count();
        info!(
            "Building model for {} users, {} items, {} interactions",
            n_users,
            n_items,
            interactions.nnz()
        );

        // Phase 1: operators
        let (adjacency, spectral) = context.install(|| -> QgcnResult<_> {
            let adjacency = GraphNormaliser::build(interactions)?;
            let spectral = SpectralOperator::build(&adjacency)?;
            Ok((adjacency, spectral))
        })?;

        // Phase 2: parameters
        let embeddings = DualEmbeddings::xavier(
            n_users,
            n_items,
            self.params.embedding_size,
            self.params.seed,
        )?;
        let lr = self.params.learning_rate;
        let optimisers = [Adam::new(lr), Adam::new(lr), Adam::new(lr), Adam::new(lr)];

        let model = Qgcn {
            params: self.params,
            alpha,
            n_users,
            n_items,
            adjacency,
            spectral,
            embeddings,
            optimisers,
            context,
        };
        log_ready(&model);
        Ok(model)
    }
}
