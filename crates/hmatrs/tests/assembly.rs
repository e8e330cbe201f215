//! Assembly accuracy and post-passes against dense references.

use std::sync::Arc;

use hmatrs::{
    assemble, build_block_tree, HMatrix, HmatError, HmatSettings, MatrixGenerator, Node,
    SequentialExecutor,
};
use hmatrs_cluster::{
    ClusterTree, ClusterTreeBuilder, ClusteringStrategy, DofPoint, StandardAdmissibility,
    TallSkinnyAdmissibility,
};
use hmatrs_compress::CompressionMethod;
use hmatrs_core::{NativeKernel, ScalarArray};

// ============================================================================
// Helpers
// ============================================================================

fn line_tree(n: usize, max_leaf: usize) -> Arc<ClusterTree> {
    let points: Vec<DofPoint> = (0..n)
        .map(|i| DofPoint::new([i as f64, 0.0, 0.0], i))
        .collect();
    Arc::new(
        ClusterTreeBuilder::new(ClusteringStrategy::Median)
            .with_max_leaf_size(max_leaf)
            .build(points),
    )
}

/// 1 / (|x_i - x_j| + 1) on the integer line.
struct InverseDistance;

impl MatrixGenerator<f64> for InverseDistance {
    fn entry(&self, i: usize, j: usize) -> f64 {
        1.0 / ((i as f64 - j as f64).abs() + 1.0)
    }
}

struct Identity;

impl MatrixGenerator<f64> for Identity {
    fn entry(&self, i: usize, j: usize) -> f64 {
        if i == j {
            1.0
        } else {
            0.0
        }
    }
}

fn dense_reference<G: MatrixGenerator<f64>>(gen: &G, n: usize) -> ScalarArray<f64> {
    ScalarArray::from_fn(n, n, |i, j| gen.entry(i, j))
}

/// Relative Frobenius distance between the h-matrix (in original ordering)
/// and the generator's dense matrix.
fn relative_error(h: &HMatrix<f64>, reference: &ScalarArray<f64>) -> f64 {
    let k = NativeKernel;
    let dense = h.to_dense(&k);
    let tree = h.rows().tree();
    let n = reference.rows();
    // h is in permuted coordinates: compare entry-wise through the permutation
    let mut diff = 0.0;
    for pj in 0..n {
        for pi in 0..n {
            let d = dense.get(pi, pj)
                - reference.get(tree.original_index(pi), tree.original_index(pj));
            diff += d * d;
        }
    }
    diff.sqrt() / reference.norm()
}

fn settings_for_tests() -> HmatSettings {
    HmatSettings::default()
        .with_compression_min_leaf_size(1)
        .with_recompress(false)
}

// ============================================================================
// Accuracy
// ============================================================================

#[test]
fn test_svd_assembly_matches_dense() {
    // 16 points on a line, svd compression at 1e-6: agreement below 1e-5
    let tree = line_tree(16, 4);
    let settings = settings_for_tests()
        .with_assembly_epsilon(1e-6)
        .with_compression_method(CompressionMethod::Svd);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    let reference = dense_reference(&InverseDistance, 16);
    assert!(relative_error(&h, &reference) <= 1e-5);
}

#[test]
fn test_aca_variants_match_dense() {
    let tree = line_tree(64, 8);
    let reference = dense_reference(&InverseDistance, 64);
    for method in [
        CompressionMethod::AcaFull,
        CompressionMethod::AcaPartial,
        CompressionMethod::AcaPlus,
    ] {
        let settings = settings_for_tests()
            .with_assembly_epsilon(1e-8)
            .with_compression_method(method);
        let adm = StandardAdmissibility::new(2.0);
        let mut h =
            build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
        assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor)
            .unwrap();
        let err = relative_error(&h, &reference);
        assert!(err <= 1e-6, "{method:?} relative error {err}");
    }
}

#[test]
fn test_compression_actually_compresses() {
    let tree = line_tree(128, 8);
    let settings = settings_for_tests()
        .with_assembly_epsilon(1e-6)
        .with_compression_method(CompressionMethod::AcaPartial);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    assert!(h.compressed_size() < 128 * 128 / 2, "no storage gain");
    assert!(h.max_rank() > 0);
    assert!(h.check_nan().is_ok());
}

#[test]
fn test_identity_assembles_to_identity() {
    let tree = line_tree(32, 4);
    let settings = settings_for_tests().with_assembly_epsilon(1e-10);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &Identity, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    let reference = dense_reference(&Identity, 32);
    assert!(relative_error(&h, &reference) <= 1e-12);
}

#[test]
fn test_rknull_zeroes_admissible_blocks() {
    let tree = line_tree(16, 4);
    let settings = settings_for_tests().with_compression_method(CompressionMethod::RkNull);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    assert_eq!(h.max_rank(), 0);
    // near field is still exact
    let k = NativeKernel;
    let dense = h.to_dense(&k);
    let tree_ref = h.rows().tree();
    for p in 0..16 {
        let orig = tree_ref.original_index(p);
        assert_eq!(dense.get(p, p), InverseDistance.entry(orig, orig));
    }
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn test_single_dof() {
    let tree = line_tree(1, 4);
    let settings = settings_for_tests();
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    let k = NativeKernel;
    let dense = h.to_dense(&k);
    assert_eq!(dense.rows(), 1);
    assert_eq!(dense.get(0, 0), 1.0);
}

#[test]
fn test_coincident_points_stay_dense() {
    let points: Vec<DofPoint> = (0..8).map(|i| DofPoint::new([0.0; 3], i)).collect();
    let tree = Arc::new(
        ClusterTreeBuilder::new(ClusteringStrategy::Median)
            .with_max_leaf_size(2)
            .build(points),
    );
    let settings = settings_for_tests();
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    // a single cluster leaf: the whole matrix is one dense block
    assert!(matches!(h.node(), Node::Dense(_)));
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    assert_eq!(h.rows_count(), 8);
}

// ============================================================================
// Post-passes
// ============================================================================

#[test]
fn test_coarsening_keeps_accuracy() {
    let tree = line_tree(128, 8);
    let reference = dense_reference(&InverseDistance, 128);
    let base = settings_for_tests()
        .with_assembly_epsilon(1e-7)
        .with_compression_method(CompressionMethod::Svd);
    let adm = StandardAdmissibility::new(2.0);

    let mut plain =
        build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &base);
    assemble(&mut plain, &InverseDistance, &base, &NativeKernel, &SequentialExecutor).unwrap();

    let coarse_settings = base.clone().with_coarsening(true);
    let mut coarse =
        build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &coarse_settings);
    assemble(
        &mut coarse,
        &InverseDistance,
        &coarse_settings,
        &NativeKernel,
        &SequentialExecutor,
    )
    .unwrap();

    assert!(relative_error(&coarse, &reference) <= 1e-5);
    assert!(coarse.compressed_size() <= plain.compressed_size());
}

#[test]
fn test_validation_detects_bad_compression() {
    // rank-0 "compression" of a nonzero kernel must trip validation
    let tree = line_tree(16, 4);
    let settings = settings_for_tests()
        .with_compression_method(CompressionMethod::RkNull)
        .with_validation(1e-3, false, false);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    let res = assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor);
    match res {
        Err(HmatError::RankExceeded { path, achieved, .. }) => {
            assert!(
                !path.0.is_empty(),
                "validation failure should name the offending block"
            );
            assert!(achieved > 1e-3);
        }
        other => panic!("expected a rank-exceeded error, got {other:?}"),
    }
}

#[test]
fn test_validation_rerun_repairs_blocks() {
    let tree = line_tree(16, 4);
    let settings = settings_for_tests()
        .with_assembly_epsilon(1e-8)
        .with_compression_method(CompressionMethod::RkNull)
        .with_validation(1e-3, true, false);
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    let reference = dense_reference(&InverseDistance, 16);
    assert!(relative_error(&h, &reference) <= 1e-5);
}

// ============================================================================
// Asymmetric subdivision
// ============================================================================

#[test]
fn test_tall_skinny_blocks_assemble() {
    let rows = line_tree(64, 4);
    let cols = line_tree(16, 4);
    let settings = settings_for_tests().with_assembly_epsilon(1e-8);
    let adm = TallSkinnyAdmissibility::new(StandardAdmissibility::new(2.0), 4);
    let mut h = build_block_tree::<f64>(Arc::clone(&rows), Arc::clone(&cols), &adm, &settings);
    assert_eq!(h.rows_count(), 64);
    assert_eq!(h.cols_count(), 16);
    assemble(&mut h, &InverseDistance, &settings, &NativeKernel, &SequentialExecutor).unwrap();
    // compare against the rectangular dense reference through both
    // permutations
    let k = NativeKernel;
    let dense = h.to_dense(&k);
    let (rt, ct) = (h.rows().tree(), h.cols().tree());
    let mut err = 0.0;
    let mut norm = 0.0;
    for pj in 0..16 {
        for pi in 0..64 {
            let exact =
                InverseDistance.entry(rt.original_index(pi), ct.original_index(pj));
            let d = dense.get(pi, pj) - exact;
            err += d * d;
            norm += exact * exact;
        }
    }
    assert!(err.sqrt() <= 1e-6 * norm.sqrt());
}
