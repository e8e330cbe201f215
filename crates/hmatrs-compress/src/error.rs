//! Error types for compression kernels.

use hmatrs_core::CoreError;
use thiserror::Error;

/// Result type alias using the compression error.
pub type Result<T> = std::result::Result<T, CompressError>;

/// Errors raised while building or recompressing low-rank blocks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompressError {
    /// A dense kernel routine failed underneath a compression step.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Compression hit its rank cap before reaching the target accuracy.
    #[error("rank cap reached at relative error {achieved:.3e} (target {target:.3e})")]
    RankExceeded {
        /// Relative error actually reached
        achieved: f64,
        /// Requested relative accuracy
        target: f64,
    },
}
