//! Engine errors, with the path to the offending block.

use hmatrs_core::CoreError;
use hmatrs_compress::CompressError;
use thiserror::Error;

/// Result type alias using the engine error.
pub type Result<T> = std::result::Result<T, HmatError>;

/// Path from the root of the block tree to a node, as `(child_row,
/// child_col)` coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockPath(pub Vec<(usize, usize)>);

impl BlockPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    fn prepend(&mut self, i: usize, j: usize) {
        self.0.insert(0, (i, j));
    }
}

impl std::fmt::Display for BlockPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(root)");
        }
        for (idx, (i, j)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "/")?;
            }
            write!(f, "({i},{j})")?;
        }
        Ok(())
    }
}

/// Errors raised by assembly and block algebra.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmatError {
    /// Operand dimensions incompatible at the public API boundary.
    #[error("invalid shape: expected {expected:?}, got {got:?}")]
    InvalidShape {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A diagonal block was singular during a factorization.
    #[error("singular pivot {index} in block {path}")]
    Singular { path: BlockPath, index: usize },

    /// Compression failed to reach the requested accuracy (fatal only when
    /// compression validation is enabled).
    #[error("block {path}: rank cap reached at relative error {achieved:.3e} (target {target:.3e})")]
    RankExceeded {
        path: BlockPath,
        achieved: f64,
        target: f64,
    },

    /// A factorization or inverse was requested on a node with no degrees of
    /// freedom.
    #[error("operation on an empty cluster")]
    EmptyCluster,

    /// A dense kernel failed; the info code is surfaced verbatim.
    #[error("kernel failure in block {path}: {source}")]
    Kernel {
        path: BlockPath,
        #[source]
        source: CoreError,
    },

    /// The opt-in NaN audit found a NaN.
    #[error("NaN detected in block {path}")]
    NanDetected { path: BlockPath },
}

impl HmatError {
    /// Record that the error happened inside child `(i, j)` of the current
    /// node.
    #[must_use]
    pub fn at_child(mut self, i: usize, j: usize) -> Self {
        match &mut self {
            HmatError::Singular { path, .. }
            | HmatError::RankExceeded { path, .. }
            | HmatError::Kernel { path, .. }
            | HmatError::NanDetected { path } => path.prepend(i, j),
            _ => {}
        }
        self
    }

    /// Record that the error happened underneath `prefix` (root-to-node
    /// order), prepending it to whatever path the error already carries.
    #[must_use]
    pub fn at_path(mut self, prefix: &BlockPath) -> Self {
        match &mut self {
            HmatError::Singular { path, .. }
            | HmatError::RankExceeded { path, .. }
            | HmatError::Kernel { path, .. }
            | HmatError::NanDetected { path } => {
                let mut joined = prefix.0.clone();
                joined.extend(path.0.iter().copied());
                path.0 = joined;
            }
            _ => {}
        }
        self
    }

    /// Path accessor for errors that carry one.
    pub fn path(&self) -> Option<&BlockPath> {
        match self {
            HmatError::Singular { path, .. }
            | HmatError::RankExceeded { path, .. }
            | HmatError::Kernel { path, .. }
            | HmatError::NanDetected { path } => Some(path),
            _ => None,
        }
    }
}

impl From<CoreError> for HmatError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Singular { index, .. } => HmatError::Singular {
                path: BlockPath::root(),
                index,
            },
            other => HmatError::Kernel {
                path: BlockPath::root(),
                source: other,
            },
        }
    }
}

impl From<CompressError> for HmatError {
    fn from(e: CompressError) -> Self {
        match e {
            CompressError::Core(c) => c.into(),
            CompressError::RankExceeded { achieved, target } => HmatError::RankExceeded {
                path: BlockPath::root(),
                achieved,
                target,
            },
        }
    }
}
