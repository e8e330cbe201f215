//! Hierarchical-matrix engine.
//!
//! Builds a block tree over a pair of spatial cluster trees, assembles the
//! blocks from a matrix-element generator (dense near-field tiles, low-rank
//! far-field blocks), and runs recursive block algebra on the result: GEMM,
//! triangular solves, LU / LDL^T / LL^H factorizations and the block
//! inverse, reaching a pluggable dense kernel provider only at leaves.
//!
//! ```
//! use std::sync::Arc;
//! use hmatrs::{assemble, build_block_tree, Context, HmatSettings, MatrixGenerator,
//!     SequentialExecutor};
//! use hmatrs_cluster::{ClusterTreeBuilder, ClusteringStrategy, DofPoint,
//!     StandardAdmissibility};
//! use hmatrs_core::{NativeKernel, ScalarArray};
//!
//! struct Kernel1d;
//!
//! impl MatrixGenerator<f64> for Kernel1d {
//!     fn entry(&self, i: usize, j: usize) -> f64 {
//!         1.0 / (1.0 + (i as f64 - j as f64).abs())
//!     }
//! }
//!
//! let points: Vec<DofPoint> = (0..32)
//!     .map(|i| DofPoint::new([i as f64, 0.0, 0.0], i))
//!     .collect();
//! let tree = Arc::new(
//!     ClusterTreeBuilder::new(ClusteringStrategy::Median)
//!         .with_max_leaf_size(4)
//!         .build(points),
//! );
//! let settings = HmatSettings::default()
//!     .with_assembly_epsilon(1e-8)
//!     .with_compression_min_leaf_size(1);
//! let admissibility = StandardAdmissibility::new(2.0);
//! let mut h = build_block_tree::<f64>(Arc::clone(&tree), tree, &admissibility, &settings);
//!
//! let kernel = NativeKernel;
//! assemble(&mut h, &Kernel1d, &settings, &kernel, &SequentialExecutor).unwrap();
//!
//! let ctx = Context::new(&kernel, &settings);
//! h.lu(&ctx).unwrap();
//! let mut rhs = ScalarArray::from_fn(32, 1, |i, _| i as f64);
//! h.solve_lu(&mut rhs, &ctx).unwrap();
//! ```

pub mod algebra;
pub mod assembly;
pub mod build;
pub mod error;
pub mod executor;
pub mod node;
pub mod settings;

pub use algebra::Context;
pub use assembly::{assemble, MatrixGenerator};
pub use build::{build_block_tree, build_cluster_tree};
pub use error::{BlockPath, HmatError, Result};
pub use executor::{SequentialExecutor, Task, TaskExecutor};
#[cfg(feature = "rayon")]
pub use executor::RayonExecutor;
pub use node::{ClusterRef, DenseLeaf, Grid, HMatrix, Node};
pub use settings::{Factorization, HmatSettings};
