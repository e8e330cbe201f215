//! Compression method selection.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use hmatrs_core::{DenseKernel, Scalar};

use crate::aca::{aca_full, aca_partial, aca_plus, AcaResult, MatrixOracle};
use crate::error::Result;
use crate::rk::RkMatrix;

/// How admissible blocks are compressed during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// Truncated SVD of the materialized block (optimal, O(mn min(m,n))).
    Svd,
    /// ACA with full pivoting on the materialized block.
    AcaFull,
    /// ACA with partial pivoting, element-oracle driven.
    #[default]
    AcaPartial,
    /// ACA seeded with a reference residual row and column.
    AcaPlus,
    /// No compression: every admissible block becomes the rank-0 zero block.
    RkNull,
}

/// A compressed block plus whether the accuracy target was met before any
/// rank cap.
#[derive(Debug, Clone)]
pub struct Compressed<T> {
    pub rk: RkMatrix<T>,
    pub converged: bool,
}

/// Compress one block at relative accuracy `eps`.
///
/// `seed` makes the reference-cross choice of [`CompressionMethod::AcaPlus`]
/// deterministic per block (callers derive it from the block position).
pub fn compress_block<T, O, K>(
    method: CompressionMethod,
    oracle: &O,
    eps: f64,
    kernel: &K,
    seed: u64,
) -> Result<Compressed<T>>
where
    T: Scalar,
    O: MatrixOracle<T>,
    K: DenseKernel<T>,
{
    let cap = oracle.nrows().min(oracle.ncols());
    let done = |r: AcaResult<T>| Compressed {
        rk: r.rk,
        converged: r.converged,
    };
    match method {
        CompressionMethod::Svd => {
            let tile = oracle.to_dense();
            let rk = RkMatrix::compress_dense(tile.view(), eps, kernel)?;
            Ok(Compressed {
                rk,
                converged: true,
            })
        }
        CompressionMethod::AcaFull => {
            let tile = oracle.to_dense();
            Ok(done(aca_full(&tile, eps, cap)))
        }
        CompressionMethod::AcaPartial => Ok(done(aca_partial(oracle, eps, cap))),
        CompressionMethod::AcaPlus => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Ok(done(aca_plus(oracle, eps, cap, &mut rng)))
        }
        CompressionMethod::RkNull => Ok(Compressed {
            rk: RkMatrix::zero(oracle.nrows(), oracle.ncols()),
            converged: true,
        }),
    }
}
