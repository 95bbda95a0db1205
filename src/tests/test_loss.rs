use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::{Array, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::builder::QgcnBuilder;
use crate::dataset::InteractionBatch;
use crate::embedding::DualEmbeddings;
use crate::loss::{bpr_loss, emb_loss, sigmoid, softplus};
use crate::model::Qgcn;
use crate::operators::to_row_major;
use crate::params::ExecutionContext;
use crate::tests::{build_model, init, small_interactions};
use crate::QgcnError;

use log::debug;

fn toy_batch(model: &Qgcn) -> InteractionBatch {
    InteractionBatch::triples(
        model.params(),
        vec![0, 1, 2, 3, 4],
        vec![0, 1, 2, 0, 1],
        vec![2, 0, 0, 1, 2],
    )
}

fn model_with(learning_rate: f64, reg_weight: f64) -> Qgcn {
    QgcnBuilder::new()
        .with_embedding_size(4)
        .with_layers(2, vec![1.0, 1.0, 1.0])
        .with_learning_rate(learning_rate)
        .with_reg_weight(reg_weight)
        .with_seed(42)
        .with_execution_context(ExecutionContext::cpu(Some(2)).unwrap())
        .build(&small_interactions())
        .unwrap()
}

fn table_mut(emb: &mut DualEmbeddings, which: usize) -> &mut DenseMatrix<f64> {
    match which {
        0 => &mut emb.local.users,
        1 => &mut emb.local.items,
        2 => &mut emb.spectral.users,
        _ => &mut emb.spectral.items,
    }
}

#[test]
fn test_softplus_stable() {
    assert_abs_diff_eq!(softplus(0.0), 2.0f64.ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(softplus(800.0), 800.0, epsilon = 1e-9);
    assert!(softplus(-800.0) >= 0.0 && softplus(-800.0) < 1e-300);
    assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-12);
    assert!(sigmoid(-800.0).is_finite());
}

#[test]
fn test_bpr_loss_values() {
    // equal scores: -ln σ(0) = ln 2
    assert_abs_diff_eq!(bpr_loss(&[1.0, 3.0], &[1.0, 3.0]), 2.0f64.ln(), epsilon = 1e-12);
    // huge margins in either direction stay finite
    assert_abs_diff_eq!(bpr_loss(&[1e6], &[0.0]), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bpr_loss(&[0.0], &[1e6]), 1e6, epsilon = 1e-6);
    assert!(bpr_loss(&[2.0], &[0.0]) < bpr_loss(&[0.0], &[2.0]));
}

#[test]
fn test_emb_loss_divides_by_batch() {
    let u = vec![vec![1.0, 2.0]];
    let p = vec![vec![0.0, 3.0]];
    let n = vec![vec![1.0, 1.0]];
    // (5 + 9 + 2) / 2
    assert_abs_diff_eq!(emb_loss(2, &[u.as_slice(), p.as_slice(), n.as_slice()]), 8.0, epsilon = 1e-12);
    assert_eq!(emb_loss(0, &[u.as_slice()]), 0.0);
}

#[test]
fn test_loss_breakdown_consistent() {
    init();
    let model = model_with(1e-3, 0.5);
    let batch = toy_batch(&model);
    let loss = model.loss_breakdown(&batch).unwrap();
    debug!("{}", loss);
    assert!(loss.ranking > 0.0);
    assert!(loss.reg > 0.0);
    assert_abs_diff_eq!(loss.total, loss.ranking + 0.5 * loss.reg, epsilon = 1e-12);
    assert_abs_diff_eq!(model.calculate_loss(&batch).unwrap(), loss.total, epsilon = 1e-12);
}

#[test]
fn test_loss_rejects_malformed_batches() {
    let model = build_model(&small_interactions(), 4, 2, vec![1.0, 1.0, 1.0]);
    let params = model.params().clone();

    let missing = InteractionBatch::new()
        .with(params.user_idx_name.clone(), vec![0])
        .with(params.item_idx_name.clone(), vec![1]);
    assert!(matches!(model.calculate_loss(&missing), Err(QgcnError::MissingBatchField(_))));

    let ragged = InteractionBatch::triples(&params, vec![0, 1], vec![1], vec![2, 2]);
    assert!(matches!(
        model.calculate_loss(&ragged),
        Err(QgcnError::BatchLengthMismatch { .. })
    ));

    let bad_user = InteractionBatch::triples(&params, vec![5], vec![0], vec![1]);
    assert!(matches!(
        model.calculate_loss(&bad_user),
        Err(QgcnError::UserIndexOutOfBounds { index: 5, count: 5 })
    ));

    let bad_item = InteractionBatch::triples(&params, vec![0], vec![0], vec![3]);
    assert!(model.calculate_loss(&bad_item).unwrap_err().is_index());

    let empty = InteractionBatch::triples(&params, vec![], vec![], vec![]);
    assert!(matches!(model.calculate_loss(&empty), Err(QgcnError::EmptyBatch)));
}

#[test]
fn test_gradients_match_finite_differences() {
    init();
    let model = model_with(1e-3, 0.05);
    let batch = toy_batch(&model);
    let (_, mut grads) = model.loss_and_gradients(&batch).unwrap();
    let base = model.embeddings().clone();

    let eps = 1e-6;
    let mut probe = model_with(1e-3, 0.05);
    for which in 0..4 {
        let (rows, cols) = table_mut(&mut grads, which).shape();
        for i in 0..rows {
            for c in 0..cols {
                let mut plus = base.clone();
                let v = *table_mut(&mut plus, which).get((i, c));
                table_mut(&mut plus, which).set((i, c), v + eps);
                probe.set_embeddings(plus).unwrap();
                let up = probe.calculate_loss(&batch).unwrap();

                let mut minus = base.clone();
                table_mut(&mut minus, which).set((i, c), v - eps);
                probe.set_embeddings(minus).unwrap();
                let down = probe.calculate_loss(&batch).unwrap();

                let numeric = (up - down) / (2.0 * eps);
                let analytic = *table_mut(&mut grads, which).get((i, c));
                assert_abs_diff_eq!(analytic, numeric, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_train_step_decreases_ranking_loss() {
    init();
    let mut model = model_with(2e-3, 0.0);
    let batch = toy_batch(&model);

    let mut previous = model.loss_breakdown(&batch).unwrap().ranking;
    for step in 0..10 {
        let before = model.train_step(&batch).unwrap();
        assert_abs_diff_eq!(before.ranking, previous, epsilon = 1e-12);
        let after = model.loss_breakdown(&batch).unwrap().ranking;
        debug!("step {}: {:.8} -> {:.8}", step, previous, after);
        assert!(after < previous, "step {} did not decrease the loss", step);
        previous = after;
    }
}

#[test]
fn test_train_step_moves_every_branch() {
    let mut model = model_with(1e-2, 1e-4);
    let before = model.embeddings().clone();
    let batch = toy_batch(&model);
    model.train_step(&batch).unwrap();
    let after = model.embeddings();

    assert_ne!(to_row_major(&before.local.users), to_row_major(&after.local.users));
    assert_ne!(to_row_major(&before.spectral.users), to_row_major(&after.spectral.users));
    assert_ne!(to_row_major(&before.local.items), to_row_major(&after.local.items));
    assert_ne!(to_row_major(&before.spectral.items), to_row_major(&after.spectral.items));
}
