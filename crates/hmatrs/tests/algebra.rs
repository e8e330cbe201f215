//! Block GEMM, matrix-panel products, and complex-scalar factorizations.

use std::sync::Arc;

use num_complex::Complex64;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use hmatrs::{
    assemble, build_block_tree, Context, HMatrix, HmatSettings, MatrixGenerator,
    SequentialExecutor,
};
use hmatrs_cluster::{ClusterTree, ClusterTreeBuilder, ClusteringStrategy, DofPoint,
    StandardAdmissibility};
use hmatrs_core::{NativeKernel, ScalarArray, Trans};

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

struct Smooth {
    shift: f64,
}

impl MatrixGenerator<f64> for Smooth {
    fn entry(&self, i: usize, j: usize) -> f64 {
        1.0 / (1.0 + (i as f64 - j as f64 + self.shift).abs())
    }
}

fn build_smooth(tree: &Arc<ClusterTree>, shift: f64, settings: &HmatSettings) -> HMatrix<f64> {
    let adm = StandardAdmissibility::new(2.0);
    let mut h = build_block_tree::<f64>(Arc::clone(tree), Arc::clone(tree), &adm, settings);
    assemble(
        &mut h,
        &Smooth { shift },
        settings,
        &NativeKernel,
        &SequentialExecutor,
    )
    .unwrap();
    h
}

#[test]
fn test_block_gemm_matches_dense() {
    let n = 64;
    let tree = line_tree(n, 8);
    let settings = HmatSettings::default()
        .with_compression_min_leaf_size(1)
        .with_assembly_epsilon(1e-10)
        .with_recompression_epsilon(1e-10);
    let kernel = NativeKernel;
    let ctx = Context::new(&kernel, &settings);

    let a = build_smooth(&tree, 0.0, &settings);
    let b = build_smooth(&tree, 3.0, &settings);
    let mut c = build_smooth(&tree, -2.0, &settings);

    let ad = a.to_dense(&kernel);
    let bd = b.to_dense(&kernel);
    let mut expect = c.to_dense(&kernel);
    // expect = 0.5 * expect + 2 * ad * bd
    expect.scale(0.5);
    expect.gemm(Trans::No, Trans::No, 2.0, ad.view(), bd.view(), 1.0, &kernel);

    c.gemm(Trans::No, Trans::No, 2.0, &a, &b, 0.5, &ctx).unwrap();
    let got = c.to_dense(&kernel);
    let mut diff = got;
    diff.axpy(-1.0, &expect);
    assert!(
        diff.norm() <= 1e-7 * expect.norm(),
        "gemm error {}",
        diff.norm() / expect.norm()
    );
}

#[test]
fn test_block_gemm_transposed_operands() {
    let n = 32;
    let tree = line_tree(n, 4);
    let settings = HmatSettings::default()
        .with_compression_min_leaf_size(1)
        .with_assembly_epsilon(1e-10)
        .with_recompression_epsilon(1e-10);
    let kernel = NativeKernel;
    let ctx = Context::new(&kernel, &settings);

    let a = build_smooth(&tree, 1.0, &settings);
    let b = build_smooth(&tree, -4.0, &settings);
    let mut c = build_smooth(&tree, 2.0, &settings);

    let ad = a.to_dense(&kernel);
    let bd = b.to_dense(&kernel);
    let mut expect = c.to_dense(&kernel);
    expect.gemm(Trans::Trans, Trans::Trans, -1.0, ad.view(), bd.view(), 1.0, &kernel);

    c.gemm(Trans::Trans, Trans::Trans, -1.0, &a, &b, 1.0, &ctx)
        .unwrap();
    let mut diff = c.to_dense(&kernel);
    diff.axpy(-1.0, &expect);
    assert!(diff.norm() <= 1e-7 * expect.norm());
}

#[test]
fn test_apply_panel_product() {
    let n = 48;
    let tree = line_tree(n, 8);
    let settings = HmatSettings::default()
        .with_compression_min_leaf_size(1)
        .with_assembly_epsilon(1e-9);
    let kernel = NativeKernel;
    let h = build_smooth(&tree, 0.0, &settings);
    let dense = h.to_dense(&kernel);

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let x = ScalarArray::from_fn(n, 3, |_, _| rng.gen_range(-1.0..1.0));
    let mut y = ScalarArray::from_fn(n, 3, |_, _| rng.gen_range(-1.0..1.0));
    let mut expect = y.clone();
    expect.gemm(Trans::No, Trans::No, 1.5, dense.view(), x.view(), -0.5, &kernel);
    h.apply(Trans::No, 1.5, x.view(), -0.5, &mut y.view_mut(), &kernel);
    let mut diff = y.clone();
    diff.axpy(-1.0, &expect);
    assert!(diff.norm() <= 1e-8 * expect.norm().max(1.0));

    // transposed application
    let mut yt = ScalarArray::zeros(n, 3);
    h.apply(Trans::Trans, 1.0, x.view(), 0.0, &mut yt.view_mut(), &kernel);
    let mut expect_t = ScalarArray::zeros(n, 3);
    expect_t.gemm(Trans::Trans, Trans::No, 1.0, dense.view(), x.view(), 0.0, &kernel);
    let mut diff = yt;
    diff.axpy(-1.0, &expect_t);
    assert!(diff.norm() <= 1e-8 * expect_t.norm().max(1.0));
}

// ============================================================================
// Complex scalars
// ============================================================================

struct FromDenseComplex(ScalarArray<Complex64>);

impl MatrixGenerator<Complex64> for FromDenseComplex {
    fn entry(&self, i: usize, j: usize) -> Complex64 {
        self.0.get(i, j)
    }
}

fn hermitian_pd(n: usize, seed: u64) -> ScalarArray<Complex64> {
    let kernel = NativeKernel;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let a = ScalarArray::from_fn(n, n, |_, _| {
        Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let mut m = ScalarArray::zeros(n, n);
    m.gemm(
        Trans::No,
        Trans::ConjTrans,
        Complex64::new(1.0, 0.0),
        a.view(),
        a.view(),
        Complex64::new(0.0, 0.0),
        &kernel,
    );
    for i in 0..n {
        let v = m.get(i, i) + Complex64::new(2.0 * n as f64, 0.0);
        m.set(i, i, v);
    }
    m
}

#[test]
fn test_complex_llt_solve() {
    let n = 24;
    let tree = line_tree(n, 4);
    let settings = HmatSettings::default().with_compression_min_leaf_size(usize::MAX);
    let kernel = NativeKernel;
    let ctx = Context::new(&kernel, &settings);
    let m = hermitian_pd(n, 77);

    let adm = StandardAdmissibility::new(2.0);
    let mut h =
        build_block_tree::<Complex64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(
        &mut h,
        &FromDenseComplex(m.clone()),
        &settings,
        &kernel,
        &SequentialExecutor,
    )
    .unwrap();
    h.llt(&ctx).unwrap();

    let x_true = ScalarArray::from_fn(n, 1, |i, _| Complex64::new(i as f64, -1.0));
    let mut b = ScalarArray::zeros(n, 1);
    b.gemm(
        Trans::No,
        Trans::No,
        Complex64::new(1.0, 0.0),
        m.view(),
        x_true.view(),
        Complex64::new(0.0, 0.0),
        &kernel,
    );
    // permute to tree order
    let bp = ScalarArray::from_fn(n, 1, |p, _| b.get(tree.original_index(p), 0));
    let xp_true = ScalarArray::from_fn(n, 1, |p, _| x_true.get(tree.original_index(p), 0));
    let mut x = bp;
    h.solve_llt(&mut x, &ctx).unwrap();
    let mut worst = 0.0f64;
    for i in 0..n {
        worst = worst.max((x.get(i, 0) - xp_true.get(i, 0)).norm());
    }
    assert!(worst < 1e-9, "complex llt solve error {worst}");
}

#[test]
fn test_complex_symmetric_ldlt_solve() {
    let n = 20;
    let tree = line_tree(n, 4);
    let settings = HmatSettings::default().with_compression_min_leaf_size(usize::MAX);
    let kernel = NativeKernel;
    let ctx = Context::new(&kernel, &settings);

    // complex symmetric (not hermitian), strongly diagonal
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let mut m = ScalarArray::zeros(n, n);
    for j in 0..n {
        for i in 0..j {
            let v = Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            m.set(i, j, v);
            m.set(j, i, v);
        }
    }
    for i in 0..n {
        m.set(i, i, Complex64::new(n as f64, 0.5 * n as f64));
    }

    let adm = StandardAdmissibility::new(2.0);
    let mut h =
        build_block_tree::<Complex64>(Arc::clone(&tree), Arc::clone(&tree), &adm, &settings);
    assemble(
        &mut h,
        &FromDenseComplex(m.clone()),
        &settings,
        &kernel,
        &SequentialExecutor,
    )
    .unwrap();
    h.ldlt(&ctx).unwrap();

    let x_true = ScalarArray::from_fn(n, 1, |i, _| Complex64::new(1.0, i as f64));
    let mut b = ScalarArray::zeros(n, 1);
    b.gemm(
        Trans::No,
        Trans::No,
        Complex64::new(1.0, 0.0),
        m.view(),
        x_true.view(),
        Complex64::new(0.0, 0.0),
        &kernel,
    );
    let mut x = ScalarArray::from_fn(n, 1, |p, _| b.get(tree.original_index(p), 0));
    h.solve_ldlt(&mut x, &ctx).unwrap();
    let xp_true = ScalarArray::from_fn(n, 1, |p, _| x_true.get(tree.original_index(p), 0));
    let mut worst = 0.0f64;
    for i in 0..n {
        worst = worst.max((x.get(i, 0) - xp_true.get(i, 0)).norm());
    }
    assert!(worst < 1e-9, "complex ldlt solve error {worst}");
}
