//! Spatial cluster tree and admissibility predicates.
//!
//! Points are partitioned by a recursive binary split into a
//! [`ClusterTree`]; every node is a contiguous interval of the permuted
//! point order with an axis-aligned bounding box. [`Admissibility`]
//! implementations decide which (row, column) cluster pairs give
//! compressible matrix blocks.

pub mod admissibility;
pub mod bbox;
pub mod point;
pub mod tree;

pub use admissibility::{
    Admissibility, AlwaysAdmissible, InfluenceRadiusAdmissibility, StandardAdmissibility,
    TallSkinnyAdmissibility,
};
pub use bbox::BoundingBox;
pub use point::{DofPoint, Points};
pub use tree::{ClusterNode, ClusterTree, ClusterTreeBuilder, ClusterView, ClusteringStrategy, NodeId};
