use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::Array;

use crate::dataset::InteractionSet;
use crate::graph::GraphNormaliser;
use crate::operators::{from_row_major, row, PropagationOperator};
use crate::tests::{disjoint_pairs, init, small_interactions};
use crate::QgcnError;

use log::debug;

#[test]
fn test_adjacency_shape_and_entries() {
    init();
    let adj = GraphNormaliser::build(&small_interactions()).unwrap();
    debug!("{}", adj);

    assert_eq!(adj.shape(), (8, 8));
    assert_eq!(adj.nnodes, 8);
    // 7 interactions, stored in both triangles
    assert_eq!(adj.nnz(), 14);

    // user 0 has degree 2, item 1 (node 6) has degree 3
    assert_abs_diff_eq!(adj.get(0, 6), 1.0 / 6.0f64.sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(adj.get(6, 0), 1.0 / 6.0f64.sqrt(), epsilon = 1e-12);
    // user 2 (degree 1) with item 2 (node 7, degree 2)
    assert_abs_diff_eq!(adj.get(2, 7), 1.0 / 2.0f64.sqrt(), epsilon = 1e-12);
    // no interaction between user 1 and item 0
    assert_eq!(adj.get(1, 5), 0.0);
}

#[test]
fn test_adjacency_symmetric_and_bipartite() {
    init();
    let adj = GraphNormaliser::build(&small_interactions()).unwrap();
    assert!(adj.is_symmetric(1e-12));

    let validation = adj.verify_properties(1e-12);
    assert!(validation.is_valid);
    assert!(validation.same_side_edges.is_empty());
    assert!(validation.row_sum_violations.is_empty());
    assert!(validation.max_row_sum <= 1.0 + 1e-12);

    for u in 0..5 {
        for v in 0..5 {
            assert_eq!(adj.get(u, v), 0.0);
        }
    }
    for i in 5..8 {
        for j in 5..8 {
            assert_eq!(adj.get(i, j), 0.0);
        }
    }
}

#[test]
fn test_row_sums_bounded() {
    let adj = GraphNormaliser::build(&small_interactions()).unwrap();
    for i in 0..adj.nnodes {
        let s = adj.row_sum(i);
        assert!(s >= 0.0 && s <= 1.0 + 1e-12, "row {} sums to {}", i, s);
    }
    // user 0: 1/sqrt(2·2) + 1/sqrt(2·3)
    assert_abs_diff_eq!(adj.row_sum(0), 0.5 + 1.0 / 6.0f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_isolated_nodes_have_empty_rows() {
    init();
    // item 2 and user 2 never interact
    let set = InteractionSet::new(3, 3, vec![(0, 0), (1, 1)]).unwrap();
    let adj = GraphNormaliser::build(&set).unwrap();

    assert_eq!(adj.isolated_nodes(), vec![2, 5]);
    for j in 0..adj.nnodes {
        assert_eq!(adj.get(2, j), 0.0);
        assert_eq!(adj.get(5, j), 0.0);
    }
    assert!(adj.verify_properties(1e-12).is_valid);
    assert_eq!(adj.statistics().isolated_nodes, 2);
}

#[test]
fn test_disjoint_edges_normalise_to_one() {
    let adj = GraphNormaliser::build(&disjoint_pairs()).unwrap();
    assert_abs_diff_eq!(adj.get(0, 2), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(adj.get(1, 3), 1.0, epsilon = 1e-12);
    assert_eq!(adj.get(0, 3), 0.0);
    assert_eq!(adj.degrees(), &[1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn test_from_pairs_rejects_bad_input() {
    assert!(matches!(
        GraphNormaliser::from_pairs(0, 2, &[]),
        Err(QgcnError::EmptyGraph { users: 0, items: 2 })
    ));
    assert!(GraphNormaliser::from_pairs(2, 2, &[(0, 2)]).unwrap_err().is_index());
}

#[test]
fn test_statistics() {
    let adj = GraphNormaliser::build(&small_interactions()).unwrap();
    let stats = adj.statistics();
    assert_eq!(stats.n_users, 5);
    assert_eq!(stats.n_items, 3);
    assert_eq!(stats.nnz, 14);
    assert_abs_diff_eq!(stats.mean_user_degree, 7.0 / 5.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.max_item_degree, 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.sparsity, 1.0 - 14.0 / 64.0, epsilon = 1e-12);
    assert_eq!(stats.isolated_nodes, 0);
}

#[test]
fn test_apply_matches_dense_product() {
    let adj = GraphNormaliser::build(&small_interactions()).unwrap();
    let n = adj.nnodes;
    let x = from_row_major((0..n * 2).map(|v| v as f64 * 0.1 - 0.3).collect(), n, 2);

    let y = adj.apply(&x);
    assert_eq!(y.shape(), (n, 2));

    let dense = adj.to_dense();
    for i in 0..n {
        let a_row = row(&dense, i);
        for c in 0..2 {
            let expected: f64 = (0..n).map(|j| a_row[j] * x.get((j, c))).sum();
            assert_abs_diff_eq!(*y.get((i, c)), expected, epsilon = 1e-12);
        }
    }
}
