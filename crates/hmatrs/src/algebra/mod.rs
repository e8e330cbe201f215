//! Recursive block algebra over [`crate::HMatrix`] nodes.
//!
//! Every operation dispatches on the variants of its operands and descends
//! the block tree, reaching the dense kernel provider only at leaves. The
//! [`Context`] value carries the kernel and the recompression accuracy; it
//! is threaded explicitly, never global.

mod factor;
mod gemm;
mod inverse;
mod triangular;

use crate::settings::HmatSettings;

/// Kernel provider plus the accuracies the algebra needs.
pub struct Context<'k, K> {
    /// Dense kernel provider used at leaves.
    pub kernel: &'k K,
    /// Relative accuracy of low-rank recompression after updates.
    pub recompression_epsilon: f64,
}

impl<'k, K> Context<'k, K> {
    /// Context drawing its accuracies from settings.
    pub fn new(kernel: &'k K, settings: &HmatSettings) -> Self {
        Self {
            kernel,
            recompression_epsilon: settings.recompression_epsilon,
        }
    }

    /// Context with an explicit recompression accuracy.
    pub fn with_epsilon(kernel: &'k K, recompression_epsilon: f64) -> Self {
        Self {
            kernel,
            recompression_epsilon,
        }
    }
}

impl<'k, K> Clone for Context<'k, K> {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel,
            recompression_epsilon: self.recompression_epsilon,
        }
    }
}

impl<'k, K> Copy for Context<'k, K> {}
