//! Dense tiles and kernel provider for the hmatrs hierarchical-matrix engine.
//!
//! This crate holds the scalar abstraction, the column-major
//! [`ScalarArray`] tile type with borrowed views, the
//! [`DenseKernel`] provider trait with its portable [`NativeKernel`]
//! implementation, and raw tile persistence.

pub mod array;
pub mod error;
pub mod io;
pub mod kernel;
pub mod scalar;

pub use array::{ArrayView, ArrayViewMut, MgsDecomposition, ScalarArray};
pub use error::{CoreError, Result};
pub use kernel::{DenseKernel, Diag, NativeKernel, Side, Trans, Uplo};
pub use scalar::Scalar;
