use super::*;

fn unit(dimension: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; dimension];
    v[hot] = 1.0;
    v
}

#[test]
fn build_rejects_wrong_dimension() {
    let entries = vec![
        (Uuid::new_v4(), unit(8, 0)),
        (Uuid::new_v4(), vec![1.0_f32; 4]),
    ];

    let result = AnnIndex::build(DistanceMetric::Cosine, 8, entries);
    assert!(matches!(
        result,
        Err(WebvecError::DimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));
}

#[test]
fn build_rejects_non_finite_values() {
    let entries = vec![(Uuid::new_v4(), vec![f32::NAN, 0.0, 0.0, 0.0])];

    let result = AnnIndex::build(DistanceMetric::Cosine, 4, entries);
    assert!(matches!(result, Err(WebvecError::InvalidArgument(_))));
}

#[test]
fn empty_index_returns_no_hits() {
    let index =
        AnnIndex::build(DistanceMetric::Cosine, 8, Vec::new()).expect("Failed to build index");

    assert!(index.is_empty());
    let hits = index.search(&unit(8, 0), 5, 50).expect("Search failed");
    assert!(hits.is_empty());
}

#[test]
fn search_finds_exact_match_first() {
    let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
    let entries: Vec<(Uuid, Vec<f32>)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, unit(8, i)))
        .collect();

    let index =
        AnnIndex::build(DistanceMetric::Cosine, 8, entries).expect("Failed to build index");
    assert_eq!(index.len(), 8);

    let hits = index.search(&unit(8, 3), 1, 50).expect("Search failed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, ids[3]);
    assert!(hits[0].distance.abs() < 1e-5);
}

#[test]
fn l2_search_prefers_nearest() {
    let near = Uuid::new_v4();
    let far = Uuid::new_v4();
    let entries = vec![
        (near, vec![1.0_f32, 0.0, 0.0, 0.0]),
        (far, vec![10.0_f32, 10.0, 10.0, 10.0]),
    ];

    let index = AnnIndex::build(DistanceMetric::L2, 4, entries).expect("Failed to build index");
    let hits = index
        .search(&[1.1_f32, 0.0, 0.0, 0.0], 2, 50)
        .expect("Search failed");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, near);
}

#[test]
fn search_rejects_mismatched_query() {
    let index = AnnIndex::build(
        DistanceMetric::Cosine,
        8,
        vec![(Uuid::new_v4(), unit(8, 0))],
    )
    .expect("Failed to build index");

    let result = index.search(&[1.0_f32; 3], 1, 50);
    assert!(matches!(
        result,
        Err(WebvecError::DimensionMismatch {
            expected: 8,
            actual: 3
        })
    ));
}
