//! Error types for dense tile operations and kernel calls.

use thiserror::Error;

/// Result type alias using the core error.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by dense kernel routines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A factorization met a zero (or non-positive, for Cholesky) pivot.
    #[error("singular pivot at index {index} in {routine}")]
    Singular {
        /// Routine that detected the pivot
        routine: &'static str,
        /// Zero-based pivot index
        index: usize,
    },

    /// A kernel routine returned a nonzero info code.
    #[error("kernel routine {routine} failed with info={info}")]
    Kernel {
        /// Routine name
        routine: &'static str,
        /// Raw info code, surfaced verbatim
        info: i32,
    },

    /// An iterative kernel (SVD) did not converge within its sweep budget.
    #[error("{routine} did not converge after {sweeps} sweeps")]
    NoConvergence {
        /// Routine name
        routine: &'static str,
        /// Number of sweeps performed
        sweeps: usize,
    },

    /// An I/O error while reading or writing a tile.
    #[error("tile i/o failed: {0}")]
    Io(String),

    /// A serialized tile header describes an invalid shape.
    #[error("invalid tile header: rows={rows}, cols={cols}")]
    InvalidHeader {
        /// Rows field of the header
        rows: i64,
        /// Cols field of the header
        cols: i64,
    },
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}
