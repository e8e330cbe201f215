//! Low-rank blocks and compression kernels.
//!
//! [`RkMatrix`] is the `a * b^H` factor pair used for admissible blocks;
//! [`aca`] holds the adaptive cross approximation family driven by a
//! [`MatrixOracle`]; [`compress_block`] dispatches on the configured
//! [`CompressionMethod`].

pub mod aca;
pub mod error;
pub mod method;
pub mod rk;

pub use aca::{aca_full, aca_partial, aca_plus, AcaResult, MatrixOracle};
pub use error::{CompressError, Result};
pub use method::{compress_block, Compressed, CompressionMethod};
pub use rk::RkMatrix;
