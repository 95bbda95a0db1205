use crate::dataset::{InteractionBatch, InteractionSet, NegativeSampler};
use crate::params::QgcnParams;
use crate::QgcnError;

#[test]
fn test_duplicates_dropped_and_sorted() {
    let set = InteractionSet::new(3, 3, vec![(2, 1), (0, 2), (2, 1), (0, 0), (0, 2)]).unwrap();
    assert_eq!(set.nnz(), 3);
    assert_eq!(set.pairs(), &[(0, 0), (0, 2), (2, 1)]);
    assert!(set.contains(0, 2));
    assert!(!set.contains(1, 0));
    assert!(set.positives(1).unwrap().is_empty());
}

#[test]
fn test_zero_counts_rejected() {
    let err = InteractionSet::new(0, 3, vec![]).unwrap_err();
    assert!(matches!(err, QgcnError::EmptyGraph { users: 0, items: 3 }));
    assert!(InteractionSet::new(3, 0, vec![]).unwrap_err().is_configuration());
}

#[test]
fn test_out_of_range_pairs_rejected() {
    let err = InteractionSet::new(2, 2, vec![(0, 0), (2, 1)]).unwrap_err();
    assert!(err.is_index());
    let err = InteractionSet::new(2, 2, vec![(0, 5)]).unwrap_err();
    assert!(matches!(err, QgcnError::ItemIndexOutOfBounds { index: 5, count: 2 }));
}

#[test]
fn test_raw_ids_are_indexed_in_first_seen_order() {
    let records = vec![
        ("alice", "book"),
        ("bob", "film"),
        ("alice", "film"),
        ("carol", "book"),
        ("bob", "film"),
    ];
    let (set, mapping) = InteractionSet::from_raw_ids(records).unwrap();
    assert_eq!(set.user_count(), 3);
    assert_eq!(set.item_count(), 2);
    assert_eq!(set.nnz(), 4);
    assert_eq!(mapping.user_idx(&"bob"), Some(1));
    assert_eq!(mapping.item_idx(&"film"), Some(1));
    assert_eq!(mapping.user_id(2), Some(&"carol"));
    assert_eq!(mapping.item_idx(&"album"), None);
}

#[test]
fn test_negative_sampler_never_returns_positives() {
    let set = InteractionSet::new(2, 6, vec![(0, 0), (0, 1), (0, 2), (0, 3), (1, 5)]).unwrap();
    let mut sampler = NegativeSampler::new(7);
    for _ in 0..200 {
        let n0 = sampler.sample(&set, 0).unwrap();
        assert!(!set.contains(0, n0));
        let n1 = sampler.sample(&set, 1).unwrap();
        assert!(!set.contains(1, n1));
    }
}

#[test]
fn test_negative_sampler_skips_saturated_users() {
    let set = InteractionSet::new(2, 2, vec![(0, 0), (0, 1), (1, 0)]).unwrap();
    let mut sampler = NegativeSampler::new(1);
    assert_eq!(sampler.sample(&set, 0), None);
    assert_eq!(sampler.sample(&set, 1), Some(1));

    let (users, pos, neg) = sampler.sample_triples(&set, set.pairs());
    assert_eq!(users, vec![1]);
    assert_eq!(pos, vec![0]);
    assert_eq!(neg, vec![1]);
}

#[test]
fn test_batch_field_lookup() {
    let params = QgcnParams::default();
    let batch = InteractionBatch::triples(&params, vec![0, 1], vec![2, 3], vec![4, 5]);
    assert_eq!(batch.get("user_idx").unwrap(), &[0, 1]);
    assert_eq!(batch.len_of("neg_item_idx"), 2);
    assert!(matches!(
        batch.get("rating"),
        Err(QgcnError::MissingBatchField(ref f)) if f == "rating"
    ));
}

#[test]
fn test_batch_alignment_errors() {
    let batch = InteractionBatch::new()
        .with("u", vec![0, 1])
        .with("i", vec![0]);
    assert!(matches!(
        batch.aligned(["u", "i"]),
        Err(QgcnError::BatchLengthMismatch { expected: 2, actual: 1, .. })
    ));

    let empty = InteractionBatch::new().with("u", vec![]).with("i", vec![]);
    assert!(matches!(empty.aligned(["u", "i"]), Err(QgcnError::EmptyBatch)));
}

#[test]
fn test_density_and_iteration() {
    let set = InteractionSet::new(2, 4, vec![(1, 3), (0, 1)]).unwrap();
    assert_eq!(set.density(), 0.25);
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 1), (1, 3)]);
    assert_eq!(set.positives(1).unwrap().iter().copied().collect::<Vec<_>>(), vec![3]);
    assert!(set.positives(2).unwrap_err().is_index());
}
