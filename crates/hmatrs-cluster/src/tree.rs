//! Binary spatial cluster tree over a point cloud.
//!
//! The tree is an arena of nodes indexed by [`NodeId`]; every node covers a
//! contiguous range of the *permuted* point order, so a cluster is always an
//! index interval. `permutation[p]` gives the original index of the point at
//! permuted position `p`.

use std::ops::Range;

use crate::bbox::BoundingBox;
use crate::point::DofPoint;

/// Index of a node inside a [`ClusterTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// One cluster: an index interval with geometric metadata.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    range: Range<usize>,
    bbox: BoundingBox,
    children: Option<(NodeId, NodeId)>,
}

impl ClusterNode {
    /// Covered interval in permuted order.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// First covered permuted index.
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Number of degrees of freedom.
    pub fn size(&self) -> usize {
        self.range.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        self.children
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Diagonal of the bounding box.
    pub fn diameter(&self) -> f64 {
        self.bbox.diameter()
    }
}

/// Splitting strategy for tree construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringStrategy {
    /// Longest axis, geometric midpoint.
    Geometric,
    /// Longest axis, median coordinate (balanced child sizes).
    #[default]
    Median,
    /// Geometric while the box is anisotropic, median otherwise.
    Hybrid,
}

/// Immutable spatial partition of a point cloud.
#[derive(Debug)]
pub struct ClusterTree {
    nodes: Vec<ClusterNode>,
    permutation: Vec<usize>,
    points: Vec<DofPoint>,
}

impl ClusterTree {
    /// Root node (always present, possibly empty).
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ClusterNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of points the tree was built over.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Original index of the point at permuted position `p`.
    pub fn original_index(&self, p: usize) -> usize {
        self.permutation[p]
    }

    /// Permuted-to-original index map.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn points(&self) -> &[DofPoint] {
        &self.points
    }

    /// Point at permuted position `p`.
    pub fn point(&self, p: usize) -> &DofPoint {
        &self.points[self.permutation[p]]
    }

    /// Largest influence radius inside a cluster.
    pub fn max_radius(&self, id: NodeId) -> f64 {
        self.node(id)
            .range()
            .map(|p| self.point(p).radius)
            .fold(0.0, f64::max)
    }

    /// Number of levels (a lone root counts as one).
    pub fn depth(&self) -> usize {
        self.depth_below(self.root())
    }

    fn depth_below(&self, id: NodeId) -> usize {
        match self.node(id).children {
            None => 1,
            Some((l, r)) => 1 + self.depth_below(l).max(self.depth_below(r)),
        }
    }

    /// Sizes of the leaves, left to right.
    pub fn leaf_sizes(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(self.root(), &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<usize>) {
        match self.node(id).children {
            None => out.push(self.node(id).size()),
            Some((l, r)) => {
                self.collect_leaves(l, out);
                self.collect_leaves(r, out);
            }
        }
    }
}

/// A borrowed (tree, node) pair: what predicates and block-tree walks see.
#[derive(Debug, Clone, Copy)]
pub struct ClusterView<'a> {
    tree: &'a ClusterTree,
    id: NodeId,
}

impl<'a> ClusterView<'a> {
    pub fn new(tree: &'a ClusterTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn tree(&self) -> &'a ClusterTree {
        self.tree
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &'a ClusterNode {
        self.tree.node(self.id)
    }

    pub fn size(&self) -> usize {
        self.node().size()
    }

    pub fn is_leaf(&self) -> bool {
        self.node().is_leaf()
    }

    pub fn diameter(&self) -> f64 {
        self.node().diameter()
    }

    pub fn distance_to(&self, other: &ClusterView<'_>) -> f64 {
        self.node().bbox().distance_to(other.node().bbox())
    }

    /// Largest influence radius among the covered points.
    pub fn max_radius(&self) -> f64 {
        self.tree.max_radius(self.id)
    }
}

/// Builds a [`ClusterTree`] from points.
#[derive(Debug, Clone)]
pub struct ClusterTreeBuilder {
    strategy: ClusteringStrategy,
    max_leaf_size: usize,
}

/// Boxes whose longest/shortest edge ratio exceeds this are split
/// geometrically under the hybrid strategy.
const HYBRID_ANISOTROPY: f64 = 4.0;

impl Default for ClusterTreeBuilder {
    fn default() -> Self {
        Self {
            strategy: ClusteringStrategy::default(),
            max_leaf_size: 100,
        }
    }
}

impl ClusterTreeBuilder {
    pub fn new(strategy: ClusteringStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_leaf_size(mut self, max_leaf_size: usize) -> Self {
        assert!(max_leaf_size > 0);
        self.max_leaf_size = max_leaf_size;
        self
    }

    /// Build the tree; the input order defines the original indices used by
    /// the permutation.
    pub fn build(&self, points: Vec<DofPoint>) -> ClusterTree {
        let n = points.len();
        let mut tree = ClusterTree {
            nodes: Vec::new(),
            permutation: (0..n).collect(),
            points,
        };
        self.split(&mut tree, 0..n);
        tree
    }

    /// Create the node for `range`, splitting recursively. Returns its id.
    fn split(&self, tree: &mut ClusterTree, range: Range<usize>) -> NodeId {
        let mut bbox = BoundingBox::empty();
        for p in range.clone() {
            bbox.extend(tree.point(p).coordinate);
        }
        let id = NodeId(tree.nodes.len());
        tree.nodes.push(ClusterNode {
            range: range.clone(),
            bbox,
            children: None,
        });
        if range.len() <= self.max_leaf_size {
            return id;
        }
        let Some(mid) = self.split_position(tree, &range, &bbox) else {
            // not splittable (coincident along every axis): stay a leaf
            return id;
        };
        let left = self.split(tree, range.start..mid);
        let right = self.split(tree, mid..range.end);
        tree.nodes[id.0].children = Some((left, right));
        id
    }

    /// Sort the permuted range along the chosen axis and return the split
    /// point, or `None` when the points cannot be separated.
    fn split_position(
        &self,
        tree: &mut ClusterTree,
        range: &Range<usize>,
        bbox: &BoundingBox,
    ) -> Option<usize> {
        let (axis, extent) = bbox.longest_axis();
        if extent == 0.0 {
            return None;
        }
        {
            let points = &tree.points;
            tree.permutation[range.clone()].sort_unstable_by(|&a, &b| {
                points[a].coordinate[axis]
                    .partial_cmp(&points[b].coordinate[axis])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        let geometric = match self.strategy {
            ClusteringStrategy::Geometric => true,
            ClusteringStrategy::Median => false,
            ClusteringStrategy::Hybrid => {
                let shortest = bbox.shortest_extent();
                shortest == 0.0 || extent / shortest > HYBRID_ANISOTROPY
            }
        };
        let mid = if geometric {
            let cut = bbox.center(axis);
            let first_above = range
                .clone()
                .find(|&p| tree.point(p).coordinate[axis] > cut)
                .unwrap_or(range.end);
            first_above
        } else {
            range.start + range.len() / 2
        };
        let mid = self.separate(tree, range, axis, mid)?;
        Some(mid)
    }

    /// Nudge `mid` so both sides are non-empty, keeping equal coordinates on
    /// one side so children get disjoint boxes along the axis.
    fn separate(
        &self,
        tree: &ClusterTree,
        range: &Range<usize>,
        axis: usize,
        mut mid: usize,
    ) -> Option<usize> {
        mid = mid.clamp(range.start + 1, range.end - 1);
        let coord = |p: usize| tree.point(p).coordinate[axis];
        // move mid forward past points equal to the last left coordinate
        let boundary = coord(mid - 1);
        let mut m = mid;
        while m < range.end && coord(m) == boundary {
            m += 1;
        }
        if m < range.end {
            return Some(m);
        }
        // everything right of mid matched; try backing off instead
        let mut m = mid;
        while m > range.start && coord(m - 1) == boundary {
            m -= 1;
        }
        if m > range.start {
            Some(m)
        } else {
            None
        }
    }
}
