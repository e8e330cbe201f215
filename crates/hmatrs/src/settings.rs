//! Engine configuration.
//!
//! A [`HmatSettings`] value is threaded explicitly through construction,
//! assembly and the algebra context; there is no process-wide state.

use hmatrs_cluster::{ClusteringStrategy, StandardAdmissibility};
use hmatrs_compress::CompressionMethod;

/// Preferred factorization for [`crate::HMatrix::factorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Factorization {
    /// Non-symmetric pivoted block LU.
    #[default]
    Lu,
    /// Symmetric indefinite block LDL^T.
    Ldlt,
    /// Hermitian positive-definite block Cholesky.
    Llt,
}

/// All recognized engine options.
#[derive(Debug, Clone)]
pub struct HmatSettings {
    /// Target relative accuracy of assembly-time compression.
    pub assembly_epsilon: f64,
    /// Target relative accuracy of algebraic recompression.
    pub recompression_epsilon: f64,
    /// How admissible blocks are compressed.
    pub compression_method: CompressionMethod,
    /// Cluster-tree splitting strategy.
    pub clustering: ClusteringStrategy,
    /// Largest cluster kept as a tree leaf.
    pub max_leaf_size: usize,
    /// Blocks with both sides below this stay dense even when admissible.
    pub compression_min_leaf_size: usize,
    /// Upper bound on `rows * cols` of an admissible block.
    pub max_elements_per_block: usize,
    /// Merge all-low-rank sibling sets after assembly when it saves storage.
    pub coarsening: bool,
    /// Recompress low-rank leaves right after assembly-time compression.
    pub recompress: bool,
    /// Check every compressed block against its dense reference.
    pub validate_compression: bool,
    /// Relative error above which a validated block fails.
    pub validation_error_threshold: f64,
    /// Replace failing blocks with an SVD recompression instead of erroring.
    pub validation_rerun: bool,
    /// Write failing blocks (reference and approximation) to disk.
    pub validation_dump: bool,
    /// Prefer LU for [`HmatSettings::preferred_factorization`].
    pub use_lu: bool,
    /// Prefer LDL^T (wins over `use_lu`).
    pub use_ldlt: bool,
    /// Bound on concurrently assembled leaves (0 = executor default).
    pub max_parallel_leaves: usize,
}

impl Default for HmatSettings {
    fn default() -> Self {
        Self {
            assembly_epsilon: 1e-4,
            recompression_epsilon: 1e-4,
            compression_method: CompressionMethod::default(),
            clustering: ClusteringStrategy::default(),
            max_leaf_size: 100,
            compression_min_leaf_size: 100,
            max_elements_per_block: 5_000_000,
            coarsening: false,
            recompress: true,
            validate_compression: false,
            validation_error_threshold: 0.0,
            validation_rerun: false,
            validation_dump: false,
            use_lu: true,
            use_ldlt: false,
            max_parallel_leaves: 0,
        }
    }
}

impl HmatSettings {
    #[must_use]
    pub fn with_assembly_epsilon(mut self, eps: f64) -> Self {
        self.assembly_epsilon = eps;
        self
    }

    #[must_use]
    pub fn with_recompression_epsilon(mut self, eps: f64) -> Self {
        self.recompression_epsilon = eps;
        self
    }

    #[must_use]
    pub fn with_compression_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    #[must_use]
    pub fn with_clustering(mut self, clustering: ClusteringStrategy) -> Self {
        self.clustering = clustering;
        self
    }

    #[must_use]
    pub fn with_max_leaf_size(mut self, n: usize) -> Self {
        self.max_leaf_size = n;
        self
    }

    #[must_use]
    pub fn with_compression_min_leaf_size(mut self, n: usize) -> Self {
        self.compression_min_leaf_size = n;
        self
    }

    #[must_use]
    pub fn with_coarsening(mut self, on: bool) -> Self {
        self.coarsening = on;
        self
    }

    #[must_use]
    pub fn with_recompress(mut self, on: bool) -> Self {
        self.recompress = on;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, threshold: f64, rerun: bool, dump: bool) -> Self {
        self.validate_compression = true;
        self.validation_error_threshold = threshold;
        self.validation_rerun = rerun;
        self.validation_dump = dump;
        self
    }

    /// The Hackbusch predicate with this configuration's element cap.
    pub fn standard_admissibility(&self, eta: f64) -> StandardAdmissibility {
        StandardAdmissibility::new(eta).with_max_elements_per_block(self.max_elements_per_block)
    }

    /// The factorization selected by the `use_lu` / `use_ldlt` flags.
    pub fn preferred_factorization(&self) -> Factorization {
        if self.use_ldlt {
            Factorization::Ldlt
        } else if self.use_lu {
            Factorization::Lu
        } else {
            Factorization::Llt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = HmatSettings::default();
        assert_eq!(s.assembly_epsilon, 1e-4);
        assert_eq!(s.preferred_factorization(), Factorization::Lu);
    }

    #[test]
    fn test_factorization_preference() {
        let s = HmatSettings {
            use_ldlt: true,
            ..Default::default()
        };
        assert_eq!(s.preferred_factorization(), Factorization::Ldlt);
        let s = HmatSettings {
            use_lu: false,
            use_ldlt: false,
            ..Default::default()
        };
        assert_eq!(s.preferred_factorization(), Factorization::Llt);
    }
}
