//! Admissibility predicates deciding which blocks are compressible.

use crate::tree::ClusterView;

/// Decides whether a (row cluster, column cluster) pair is admissible, i.e.
/// compressible as a low-rank block, or must be subdivided.
pub trait Admissibility: Send + Sync {
    /// True if the pair is admissible.
    fn is_admissible(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool;

    /// Which axes to subdivide when the pair is not admissible, as
    /// `(subdivide_rows, subdivide_cols)`. The default subdivides both.
    fn split_axes(&self, _rows: ClusterView<'_>, _cols: ClusterView<'_>) -> (bool, bool) {
        (true, true)
    }

    /// Short description for diagnostics.
    fn description(&self) -> String;
}

/// Hackbusch criterion: `min(diam(r), diam(c)) <= eta * dist(r, c)`, with a
/// cap on the block element count.
#[derive(Debug, Clone)]
pub struct StandardAdmissibility {
    eta: f64,
    max_elements_per_block: usize,
}

impl StandardAdmissibility {
    pub fn new(eta: f64) -> Self {
        assert!(eta > 0.0, "eta must be positive");
        Self {
            eta,
            max_elements_per_block: 5_000_000,
        }
    }

    #[must_use]
    pub fn with_max_elements_per_block(mut self, max: usize) -> Self {
        self.max_elements_per_block = max;
        self
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }
}

impl Default for StandardAdmissibility {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl Admissibility for StandardAdmissibility {
    fn is_admissible(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        if rows.size() == 0 || cols.size() == 0 {
            return false;
        }
        if rows.size() * cols.size() > self.max_elements_per_block {
            return false;
        }
        // overlapping boxes (distance 0) are never admissible, so diagonal
        // blocks stay dense or subdivide even for zero-diameter clusters
        let dist = rows.distance_to(&cols);
        if dist <= 0.0 {
            return false;
        }
        let diam = rows.diameter().min(cols.diameter());
        diam <= self.eta * dist
    }

    fn description(&self) -> String {
        format!(
            "standard admissibility, eta = {}, max elements = {}",
            self.eta, self.max_elements_per_block
        )
    }
}

/// Forces admissibility of every block below the element cap. Useful for
/// testing compression on globally smooth kernels.
#[derive(Debug, Clone)]
pub struct AlwaysAdmissible {
    max_elements_per_block: usize,
}

impl AlwaysAdmissible {
    pub fn new(max_elements_per_block: usize) -> Self {
        Self {
            max_elements_per_block,
        }
    }
}

impl Admissibility for AlwaysAdmissible {
    fn is_admissible(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        rows.size() > 0
            && cols.size() > 0
            && rows.size() * cols.size() <= self.max_elements_per_block
    }

    fn description(&self) -> String {
        format!(
            "always admissible below {} elements",
            self.max_elements_per_block
        )
    }
}

/// Admissible when the clusters are separated by more than the sum of their
/// largest influence radii.
#[derive(Debug, Clone, Default)]
pub struct InfluenceRadiusAdmissibility;

impl Admissibility for InfluenceRadiusAdmissibility {
    fn is_admissible(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        if rows.size() == 0 || cols.size() == 0 {
            return false;
        }
        rows.distance_to(&cols) > rows.max_radius() + cols.max_radius()
    }

    fn description(&self) -> String {
        "influence-radius admissibility".to_string()
    }
}

/// Wraps a base criterion with a size-ratio rule producing per-axis
/// subdivision decisions: an axis whose cluster is already small relative to
/// the other (within `ratio`) is not subdivided further, yielding tall or
/// skinny blocks.
#[derive(Debug, Clone)]
pub struct TallSkinnyAdmissibility<A> {
    base: A,
    ratio: usize,
}

impl<A: Admissibility> TallSkinnyAdmissibility<A> {
    pub fn new(base: A, ratio: usize) -> Self {
        assert!(ratio > 0);
        Self { base, ratio }
    }

    fn row_small(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        rows.size() <= self.ratio * cols.size()
    }

    fn col_small(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        cols.size() <= self.ratio * rows.size()
    }
}

impl<A: Admissibility> Admissibility for TallSkinnyAdmissibility<A> {
    fn is_admissible(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> bool {
        self.base.is_admissible(rows, cols)
            && self.row_small(rows, cols)
            && self.col_small(rows, cols)
    }

    fn split_axes(&self, rows: ClusterView<'_>, cols: ClusterView<'_>) -> (bool, bool) {
        let row_small = self.row_small(rows, cols);
        let col_small = self.col_small(rows, cols);
        match (row_small, col_small) {
            // one side is disproportionately large: subdivide only that side
            (true, false) => (false, true),
            (false, true) => (true, false),
            _ => (true, true),
        }
    }

    fn description(&self) -> String {
        format!("{}, size ratio {}", self.base.description(), self.ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::DofPoint;
    use crate::tree::{ClusterTreeBuilder, ClusteringStrategy, ClusterView, NodeId};

    fn line_tree(n: usize, max_leaf: usize) -> crate::tree::ClusterTree {
        let pts: Vec<DofPoint> = (0..n)
            .map(|i| DofPoint::new([i as f64, 0.0, 0.0], i))
            .collect();
        ClusterTreeBuilder::new(ClusteringStrategy::Median)
            .with_max_leaf_size(max_leaf)
            .build(pts)
    }

    /// Find the leaf covering permuted range [begin, end).
    fn find_node(tree: &crate::tree::ClusterTree, begin: usize, end: usize) -> NodeId {
        for idx in 0..tree.node_count() {
            let r = tree.node(NodeId(idx)).range();
            if r.start == begin && r.end == end {
                return NodeId(idx);
            }
        }
        panic!("no node covering {begin}..{end}");
    }

    #[test]
    fn test_standard_far_blocks_admissible() {
        let tree = line_tree(16, 4);
        let a = find_node(&tree, 0, 4);
        let b = find_node(&tree, 12, 16);
        let adm = StandardAdmissibility::new(2.0);
        assert!(adm.is_admissible(
            ClusterView::new(&tree, a),
            ClusterView::new(&tree, b)
        ));
    }

    #[test]
    fn test_standard_diagonal_not_admissible() {
        let tree = line_tree(16, 4);
        let a = find_node(&tree, 0, 4);
        let adm = StandardAdmissibility::new(2.0);
        assert!(!adm.is_admissible(
            ClusterView::new(&tree, a),
            ClusterView::new(&tree, a)
        ));
    }

    #[test]
    fn test_adjacent_blocks_not_admissible() {
        let tree = line_tree(16, 4);
        let a = find_node(&tree, 0, 4);
        let b = find_node(&tree, 4, 8);
        let adm = StandardAdmissibility::new(2.0);
        // distance 1, diameter 3: 3 > 2 * 1
        assert!(!adm.is_admissible(
            ClusterView::new(&tree, a),
            ClusterView::new(&tree, b)
        ));
    }

    #[test]
    fn test_element_cap() {
        let tree = line_tree(16, 4);
        let a = find_node(&tree, 0, 4);
        let b = find_node(&tree, 12, 16);
        let adm = StandardAdmissibility::new(2.0).with_max_elements_per_block(8);
        assert!(!adm.is_admissible(
            ClusterView::new(&tree, a),
            ClusterView::new(&tree, b)
        ));
    }

    #[test]
    fn test_tall_skinny_split_axes() {
        let tree = line_tree(64, 4);
        let big = find_node(&tree, 0, 32);
        let small = find_node(&tree, 32, 36);
        let adm = TallSkinnyAdmissibility::new(StandardAdmissibility::new(2.0), 2);
        // rows much larger than cols: only the row axis is subdivided
        let (sr, sc) = adm.split_axes(
            ClusterView::new(&tree, big),
            ClusterView::new(&tree, small),
        );
        assert!(sr);
        assert!(!sc);
        let (sr, sc) = adm.split_axes(
            ClusterView::new(&tree, small),
            ClusterView::new(&tree, big),
        );
        assert!(!sr);
        assert!(sc);
    }

    #[test]
    fn test_influence_radius() {
        let mk = |x: f64, idx: usize, r: f64| DofPoint::with_radius([x, 0.0, 0.0], idx, r);
        let pts = vec![mk(0.0, 0, 1.0), mk(1.0, 1, 1.0), mk(10.0, 2, 2.0), mk(11.0, 3, 2.0)];
        let tree = ClusterTreeBuilder::new(ClusteringStrategy::Median)
            .with_max_leaf_size(2)
            .build(pts);
        let near = find_node(&tree, 0, 2);
        let far = find_node(&tree, 2, 4);
        let adm = InfluenceRadiusAdmissibility;
        // gap 9 > 1 + 2
        assert!(adm.is_admissible(
            ClusterView::new(&tree, near),
            ClusterView::new(&tree, far)
        ));
        assert!(!adm.is_admissible(
            ClusterView::new(&tree, near),
            ClusterView::new(&tree, near)
        ));
    }
}
