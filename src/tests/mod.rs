mod test_dataset;
mod test_graph;
mod test_loss;

use crate::builder::QgcnBuilder;
use crate::dataset::InteractionSet;
use crate::model::Qgcn;
use crate::params::ExecutionContext;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 5 users × 3 items with every item observed at least once.
pub fn small_interactions() -> InteractionSet {
    InteractionSet::new(
        5,
        3,
        vec![(0, 0), (0, 1), (1, 1), (2, 2), (3, 0), (3, 2), (4, 1)],
    )
    .unwrap()
}

/// Two disjoint user–item edges: 0–0 and 1–1.
pub fn disjoint_pairs() -> InteractionSet {
    InteractionSet::new(2, 2, vec![(0, 0), (1, 1)]).unwrap()
}

pub fn build_model(
    interactions: &InteractionSet,
    embedding_size: usize,
    n_layers: usize,
    alpha_list: Vec<f64>,
) -> Qgcn {
    QgcnBuilder::new()
        .with_embedding_size(embedding_size)
        .with_layers(n_layers, alpha_list)
        .with_seed(42)
        .with_execution_context(ExecutionContext::cpu(Some(2)).unwrap())
        .build(interactions)
        .unwrap()
}
