//! The hierarchical-matrix block tree.
//!
//! An [`HMatrix`] node is one of three variants: an internal node holding a
//! grid of children over subdivided cluster pairs, a dense leaf, or a
//! low-rank leaf. Every node's shape is exactly `(row cluster size, column
//! cluster size)`. Cluster nodes are shared immutably between many block
//! nodes through [`ClusterRef`].

use std::sync::Arc;

use hmatrs_cluster::{ClusterTree, ClusterView, NodeId};
use hmatrs_core::{ArrayView, ArrayViewMut, DenseKernel, ScalarArray, Scalar, Trans};
use hmatrs_compress::RkMatrix;

use crate::algebra::Context;
use crate::error::{BlockPath, HmatError, Result};

/// Shared reference to one cluster-tree node.
#[derive(Debug, Clone)]
pub struct ClusterRef {
    tree: Arc<ClusterTree>,
    node: NodeId,
}

impl ClusterRef {
    pub fn new(tree: Arc<ClusterTree>, node: NodeId) -> Self {
        Self { tree, node }
    }

    /// The tree's root cluster.
    pub fn root(tree: Arc<ClusterTree>) -> Self {
        let node = tree.root();
        Self { tree, node }
    }

    pub fn tree(&self) -> &Arc<ClusterTree> {
        &self.tree
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn view(&self) -> ClusterView<'_> {
        ClusterView::new(&self.tree, self.node)
    }

    /// Number of degrees of freedom.
    pub fn size(&self) -> usize {
        self.tree.node(self.node).size()
    }

    /// First covered permuted index.
    pub fn offset(&self) -> usize {
        self.tree.node(self.node).offset()
    }

    pub fn is_leaf(&self) -> bool {
        self.tree.node(self.node).is_leaf()
    }

    pub fn children(&self) -> Option<(ClusterRef, ClusterRef)> {
        self.tree.node(self.node).children().map(|(l, r)| {
            (
                ClusterRef::new(Arc::clone(&self.tree), l),
                ClusterRef::new(Arc::clone(&self.tree), r),
            )
        })
    }

    /// True when both refer to the same node of the same tree.
    pub fn same_node(&self, other: &ClusterRef) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.node == other.node
    }

    /// This cluster subdivided (when requested and possible), else itself.
    pub fn parts(&self, subdivide: bool) -> Vec<ClusterRef> {
        if subdivide {
            if let Some((l, r)) = self.children() {
                return vec![l, r];
            }
        }
        vec![self.clone()]
    }
}

/// Dense leaf: a tile plus the LU pivots once factored.
#[derive(Debug, Clone)]
pub struct DenseLeaf<T> {
    pub tile: ScalarArray<T>,
    pub pivots: Option<Vec<usize>>,
}

impl<T: Scalar> DenseLeaf<T> {
    pub fn new(tile: ScalarArray<T>) -> Self {
        Self { tile, pivots: None }
    }
}

/// Child grid of an internal node. Cells are absent only when the paired
/// clusters are empty.
#[derive(Debug, Clone)]
pub struct Grid<T> {
    row_parts: Vec<ClusterRef>,
    col_parts: Vec<ClusterRef>,
    cells: Vec<Option<Box<HMatrix<T>>>>,
}

impl<T: Scalar> Grid<T> {
    pub fn new(
        row_parts: Vec<ClusterRef>,
        col_parts: Vec<ClusterRef>,
        cells: Vec<Option<Box<HMatrix<T>>>>,
    ) -> Self {
        assert_eq!(cells.len(), row_parts.len() * col_parts.len());
        Self {
            row_parts,
            col_parts,
            cells,
        }
    }

    pub fn nrow_parts(&self) -> usize {
        self.row_parts.len()
    }

    pub fn ncol_parts(&self) -> usize {
        self.col_parts.len()
    }

    pub fn row_part(&self, i: usize) -> &ClusterRef {
        &self.row_parts[i]
    }

    pub fn col_part(&self, j: usize) -> &ClusterRef {
        &self.col_parts[j]
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.row_parts.len() && j < self.col_parts.len());
        i * self.col_parts.len() + j
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&HMatrix<T>> {
        self.cells[self.idx(i, j)].as_deref()
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> Option<&mut HMatrix<T>> {
        let idx = self.idx(i, j);
        self.cells[idx].as_deref_mut()
    }

    /// Remove a child for exclusive use; put it back with [`Grid::put`].
    pub fn take(&mut self, i: usize, j: usize) -> Option<Box<HMatrix<T>>> {
        let idx = self.idx(i, j);
        self.cells[idx].take()
    }

    pub fn put(&mut self, i: usize, j: usize, child: Box<HMatrix<T>>) {
        let idx = self.idx(i, j);
        debug_assert!(self.cells[idx].is_none());
        self.cells[idx] = Some(child);
    }

    /// Present children with their grid coordinates.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &HMatrix<T>)> {
        let nc = self.col_parts.len();
        self.cells
            .iter()
            .enumerate()
            .filter_map(move |(idx, c)| c.as_deref().map(|h| (idx / nc, idx % nc, h)))
    }

    /// Mutable variant of [`Grid::cells`].
    pub fn cells_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut HMatrix<T>)> {
        let nc = self.col_parts.len();
        self.cells
            .iter_mut()
            .enumerate()
            .filter_map(move |(idx, c)| c.as_deref_mut().map(|h| (idx / nc, idx % nc, h)))
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum Node<T> {
    Internal(Grid<T>),
    Dense(DenseLeaf<T>),
    Rk(RkMatrix<T>),
}

/// A hierarchical matrix (or any node of one).
#[derive(Debug, Clone)]
pub struct HMatrix<T> {
    rows: ClusterRef,
    cols: ClusterRef,
    node: Node<T>,
}

impl<T: Scalar> HMatrix<T> {
    pub fn new(rows: ClusterRef, cols: ClusterRef, node: Node<T>) -> Self {
        let h = Self { rows, cols, node };
        h.debug_check_shape();
        h
    }

    fn debug_check_shape(&self) {
        #[cfg(debug_assertions)]
        match &self.node {
            Node::Dense(leaf) => {
                debug_assert_eq!(leaf.tile.rows(), self.rows.size());
                debug_assert_eq!(leaf.tile.cols(), self.cols.size());
            }
            Node::Rk(rk) => {
                debug_assert_eq!(rk.rows(), self.rows.size());
                debug_assert_eq!(rk.cols(), self.cols.size());
            }
            Node::Internal(_) => {}
        }
    }

    pub fn rows(&self) -> &ClusterRef {
        &self.rows
    }

    pub fn cols(&self) -> &ClusterRef {
        &self.cols
    }

    pub fn rows_count(&self) -> usize {
        self.rows.size()
    }

    pub fn cols_count(&self) -> usize {
        self.cols.size()
    }

    pub fn row_offset(&self) -> usize {
        self.rows.offset()
    }

    pub fn col_offset(&self) -> usize {
        self.cols.offset()
    }

    pub fn node(&self) -> &Node<T> {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Node<T> {
        &mut self.node
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.node, Node::Internal(_))
    }

    /// Storage cost in scalars.
    pub fn compressed_size(&self) -> usize {
        match &self.node {
            Node::Dense(leaf) => leaf.tile.rows() * leaf.tile.cols(),
            Node::Rk(rk) => rk.compressed_size(),
            Node::Internal(grid) => grid.cells().map(|(_, _, c)| c.compressed_size()).sum(),
        }
    }

    /// Largest low-rank rank anywhere in the tree.
    pub fn max_rank(&self) -> usize {
        match &self.node {
            Node::Dense(_) => 0,
            Node::Rk(rk) => rk.rank(),
            Node::Internal(grid) => grid.cells().map(|(_, _, c)| c.max_rank()).max().unwrap_or(0),
        }
    }

    /// Overwrite with zero, keeping the block structure.
    pub fn clear(&mut self) {
        match &mut self.node {
            Node::Dense(leaf) => {
                leaf.tile.clear();
                leaf.pivots = None;
            }
            Node::Rk(rk) => rk.clear(),
            Node::Internal(grid) => {
                for (_, _, c) in grid.cells_mut() {
                    c.clear();
                }
            }
        }
    }

    pub fn scale(&mut self, alpha: T) {
        match &mut self.node {
            Node::Dense(leaf) => {
                leaf.tile.scale(alpha);
                leaf.pivots = None;
            }
            Node::Rk(rk) => rk.scale(alpha),
            Node::Internal(grid) => {
                for (_, _, c) in grid.cells_mut() {
                    c.scale(alpha);
                }
            }
        }
    }

    /// Materialize the full dense matrix of this node.
    pub fn to_dense<K: DenseKernel<T>>(&self, kernel: &K) -> ScalarArray<T> {
        let mut out = ScalarArray::zeros(self.rows_count(), self.cols_count());
        self.fill_dense_into(&mut out.view_mut(), kernel);
        out
    }

    /// Write this node's matrix into `out` (shape must match).
    pub fn fill_dense_into<K: DenseKernel<T>>(&self, out: &mut ArrayViewMut<'_, T>, kernel: &K) {
        assert_eq!(out.rows(), self.rows_count());
        assert_eq!(out.cols(), self.cols_count());
        match &self.node {
            Node::Dense(leaf) => out.copy_from(leaf.tile.view()),
            Node::Rk(rk) => {
                out.clear();
                rk.axpy_into(T::one(), out, kernel);
            }
            Node::Internal(grid) => {
                let (ro, co) = (self.row_offset(), self.col_offset());
                for i in 0..grid.nrow_parts() {
                    for j in 0..grid.ncol_parts() {
                        let rp = grid.row_part(i);
                        let cp = grid.col_part(j);
                        let mut chunk = out.sub_mut(
                            rp.offset() - ro,
                            rp.size(),
                            cp.offset() - co,
                            cp.size(),
                        );
                        match grid.get(i, j) {
                            Some(c) => c.fill_dense_into(&mut chunk, kernel),
                            None => chunk.clear(),
                        }
                    }
                }
            }
        }
    }

    /// Squared Frobenius norm.
    pub fn norm_sqr<K: DenseKernel<T>>(&self, kernel: &K) -> f64 {
        match &self.node {
            Node::Dense(leaf) => leaf.tile.norm_sqr(),
            Node::Rk(rk) => rk.norm_sqr(kernel),
            Node::Internal(grid) => grid.cells().map(|(_, _, c)| c.norm_sqr(kernel)).sum(),
        }
    }

    /// Frobenius norm.
    pub fn norm<K: DenseKernel<T>>(&self, kernel: &K) -> f64 {
        self.norm_sqr(kernel).sqrt()
    }

    /// Opt-in NaN audit; fails on the first block containing a NaN.
    pub fn check_nan(&self) -> Result<()> {
        match &self.node {
            Node::Dense(leaf) => {
                if leaf.tile.has_nan() {
                    Err(HmatError::NanDetected {
                        path: BlockPath::root(),
                    })
                } else {
                    Ok(())
                }
            }
            Node::Rk(rk) => {
                if rk.a().has_nan() || rk.b().has_nan() {
                    Err(HmatError::NanDetected {
                        path: BlockPath::root(),
                    })
                } else {
                    Ok(())
                }
            }
            Node::Internal(grid) => {
                for (i, j, c) in grid.cells() {
                    c.check_nan().map_err(|e| e.at_child(i, j))?;
                }
                Ok(())
            }
        }
    }

    /// Diagonal entries, in permuted order. The node must be square and
    /// free of low-rank diagonal blocks (guaranteed after a factorization).
    pub fn extract_diagonal(&self, out: &mut Vec<T>) {
        match &self.node {
            Node::Dense(leaf) => {
                for i in 0..leaf.tile.rows().min(leaf.tile.cols()) {
                    out.push(leaf.tile.get(i, i));
                }
            }
            Node::Rk(_) => unreachable!("low-rank block on the diagonal"),
            Node::Internal(grid) => {
                for k in 0..grid.nrow_parts() {
                    grid.get(k, k)
                        .expect("missing diagonal block")
                        .extract_diagonal(out);
                }
            }
        }
    }

    /// Right-multiply by `diag(d)` (or its inverse): column `j` is scaled by
    /// `d[j]`.
    pub fn multiply_with_diag(&mut self, d: &[T], inverse: bool) {
        assert_eq!(d.len(), self.cols_count());
        match &mut self.node {
            Node::Dense(leaf) => {
                for j in 0..leaf.tile.cols() {
                    let f = if inverse { d[j].inv() } else { d[j] };
                    for v in leaf.tile.column_mut(j).iter_mut() {
                        *v *= f;
                    }
                }
                leaf.pivots = None;
            }
            Node::Rk(rk) => {
                // (a b^H) diag(d): row j of b picks up conj(d_j)
                let b = rk.b_mut();
                for l in 0..b.cols() {
                    for j in 0..d.len() {
                        let f = if inverse { d[j].inv() } else { d[j] };
                        let v = b.get(j, l) * f.conj();
                        b.set(j, l, v);
                    }
                }
            }
            Node::Internal(grid) => {
                let col0 = grid.col_part(0).offset();
                for j in 0..grid.ncol_parts() {
                    let off = grid.col_part(j).offset() - col0;
                    let len = grid.col_part(j).size();
                    for i in 0..grid.nrow_parts() {
                        if let Some(c) = grid.get_mut(i, j) {
                            c.multiply_with_diag(&d[off..off + len], inverse);
                        }
                    }
                }
            }
        }
    }

    /// `y = beta * y + alpha * op(self) * x` for dense panels.
    pub fn apply<K: DenseKernel<T>>(
        &self,
        trans: Trans,
        alpha: T,
        x: ArrayView<'_, T>,
        beta: T,
        y: &mut ArrayViewMut<'_, T>,
        kernel: &K,
    ) {
        let (m, n) = self.op_shape(trans);
        assert_eq!(x.rows(), n);
        assert_eq!(y.rows(), m);
        assert_eq!(x.cols(), y.cols());
        match &self.node {
            Node::Dense(leaf) => y.gemm(trans, Trans::No, alpha, leaf.tile.view(), x, beta, kernel),
            Node::Rk(rk) => {
                let o = rk.transposed(trans);
                if o.rank() == 0 {
                    y.scale(beta);
                    return;
                }
                let mut t = ScalarArray::zeros(o.rank(), x.cols());
                t.gemm(
                    Trans::ConjTrans,
                    Trans::No,
                    T::one(),
                    o.b().view(),
                    x,
                    T::zero(),
                    kernel,
                );
                y.gemm(Trans::No, Trans::No, alpha, o.a().view(), t.view(), beta, kernel);
            }
            Node::Internal(grid) => {
                let no = trans == Trans::No;
                let nr = if no { grid.nrow_parts() } else { grid.ncol_parts() };
                let nc = if no { grid.ncol_parts() } else { grid.nrow_parts() };
                let rpart = |i: usize| if no { grid.row_part(i) } else { grid.col_part(i) };
                let cpart = |j: usize| if no { grid.col_part(j) } else { grid.row_part(j) };
                let row0 = rpart(0).offset();
                let col0 = cpart(0).offset();
                for i in 0..nr {
                    let mut ychunk =
                        y.sub_mut(rpart(i).offset() - row0, rpart(i).size(), 0, x.cols());
                    let mut scaled = false;
                    for j in 0..nc {
                        let child = if no { grid.get(i, j) } else { grid.get(j, i) };
                        if let Some(c) = child {
                            let xchunk =
                                x.sub(cpart(j).offset() - col0, cpart(j).size(), 0, x.cols());
                            let b = if scaled { T::one() } else { beta };
                            c.apply(trans, alpha, xchunk, b, &mut ychunk, kernel);
                            scaled = true;
                        }
                    }
                    if !scaled {
                        ychunk.scale(beta);
                    }
                }
            }
        }
    }

    /// `y = beta * y + alpha * x * op(self)` for dense panels.
    pub fn apply_right<K: DenseKernel<T>>(
        &self,
        trans: Trans,
        alpha: T,
        x: ArrayView<'_, T>,
        beta: T,
        y: &mut ArrayViewMut<'_, T>,
        kernel: &K,
    ) {
        let (m, n) = self.op_shape(trans);
        assert_eq!(x.cols(), m);
        assert_eq!(y.cols(), n);
        assert_eq!(x.rows(), y.rows());
        match &self.node {
            Node::Dense(leaf) => y.gemm(Trans::No, trans, alpha, x, leaf.tile.view(), beta, kernel),
            Node::Rk(rk) => {
                let o = rk.transposed(trans);
                if o.rank() == 0 {
                    y.scale(beta);
                    return;
                }
                let mut t = ScalarArray::zeros(x.rows(), o.rank());
                t.gemm(
                    Trans::No,
                    Trans::No,
                    T::one(),
                    x,
                    o.a().view(),
                    T::zero(),
                    kernel,
                );
                y.gemm(
                    Trans::No,
                    Trans::ConjTrans,
                    alpha,
                    t.view(),
                    o.b().view(),
                    beta,
                    kernel,
                );
            }
            Node::Internal(grid) => {
                let no = trans == Trans::No;
                let nr = if no { grid.nrow_parts() } else { grid.ncol_parts() };
                let nc = if no { grid.ncol_parts() } else { grid.nrow_parts() };
                let rpart = |i: usize| if no { grid.row_part(i) } else { grid.col_part(i) };
                let cpart = |j: usize| if no { grid.col_part(j) } else { grid.row_part(j) };
                let row0 = rpart(0).offset();
                let col0 = cpart(0).offset();
                for j in 0..nc {
                    let mut ychunk =
                        y.sub_mut(0, x.rows(), cpart(j).offset() - col0, cpart(j).size());
                    let mut scaled = false;
                    for i in 0..nr {
                        let child = if no { grid.get(i, j) } else { grid.get(j, i) };
                        if let Some(c) = child {
                            let xchunk =
                                x.sub(0, x.rows(), rpart(i).offset() - row0, rpart(i).size());
                            let b = if scaled { T::one() } else { beta };
                            c.apply_right(trans, alpha, xchunk, b, &mut ychunk, kernel);
                            scaled = true;
                        }
                    }
                    if !scaled {
                        ychunk.scale(beta);
                    }
                }
            }
        }
    }

    /// `y = beta * y + alpha * op(self)^H * x`.
    pub fn apply_adjoint<K: DenseKernel<T>>(
        &self,
        trans: Trans,
        alpha: T,
        x: ArrayView<'_, T>,
        beta: T,
        y: &mut ArrayViewMut<'_, T>,
        kernel: &K,
    ) {
        match trans {
            Trans::No => self.apply(Trans::ConjTrans, alpha, x, beta, y, kernel),
            Trans::ConjTrans => self.apply(Trans::No, alpha, x, beta, y, kernel),
            Trans::Trans => {
                // (h^T)^H = conj(h): conj(h) x = conj(h conj(x))
                let mut xc = x.to_owned();
                xc.conjugate();
                let mut t = ScalarArray::zeros(y.rows(), y.cols());
                self.apply(
                    Trans::No,
                    T::one(),
                    xc.view(),
                    T::zero(),
                    &mut t.view_mut(),
                    kernel,
                );
                t.conjugate();
                y.scale(beta);
                y.axpy(alpha, t.view());
            }
        }
    }

    fn op_shape(&self, trans: Trans) -> (usize, usize) {
        if trans.is_transposed() {
            (self.cols_count(), self.rows_count())
        } else {
            (self.rows_count(), self.cols_count())
        }
    }

    /// `self += alpha * rk`, distributing the low-rank update over the block
    /// structure and recompressing low-rank leaves.
    pub fn axpy_rk<K: DenseKernel<T>>(
        &mut self,
        alpha: T,
        rk: &RkMatrix<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(rk.rows(), self.rows_count());
        assert_eq!(rk.cols(), self.cols_count());
        if rk.rank() == 0 || alpha.is_zero() {
            return Ok(());
        }
        let (ro, co) = (self.row_offset(), self.col_offset());
        match &mut self.node {
            Node::Dense(leaf) => {
                rk.axpy_into(alpha, &mut leaf.tile.view_mut(), ctx.kernel);
                leaf.pivots = None;
                Ok(())
            }
            Node::Rk(mine) => {
                mine.append_scaled(alpha, rk);
                mine.truncate(ctx.recompression_epsilon, ctx.kernel)?;
                Ok(())
            }
            Node::Internal(grid) => {
                for (i, j, c) in grid.cells_mut() {
                    let sub = rk.sub_block(
                        c.row_offset() - ro,
                        c.rows_count(),
                        c.col_offset() - co,
                        c.cols_count(),
                    );
                    c.axpy_rk(alpha, &sub, ctx).map_err(|e| e.at_child(i, j))?;
                }
                Ok(())
            }
        }
    }

    /// `self += alpha * other` for another block matrix over the same
    /// cluster pair. Matching internal structures recurse; everything else
    /// reduces to the low-rank or dense update paths.
    pub fn axpy_h<K: DenseKernel<T>>(
        &mut self,
        alpha: T,
        other: &HMatrix<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.rows_count(), other.rows_count());
        assert_eq!(self.cols_count(), other.cols_count());
        match other.node() {
            Node::Rk(rk) => self.axpy_rk(alpha, rk, ctx),
            Node::Dense(leaf) => self.axpy_dense(alpha, leaf.tile.view(), ctx),
            Node::Internal(og) => {
                let structures_match = match &self.node {
                    Node::Internal(grid) => {
                        grid.nrow_parts() == og.nrow_parts()
                            && grid.ncol_parts() == og.ncol_parts()
                            && (0..grid.nrow_parts())
                                .all(|i| grid.row_part(i).same_node(og.row_part(i)))
                            && (0..grid.ncol_parts())
                                .all(|j| grid.col_part(j).same_node(og.col_part(j)))
                    }
                    _ => false,
                };
                if structures_match {
                    let Node::Internal(grid) = &mut self.node else {
                        unreachable!()
                    };
                    for (i, j, oc) in og.cells() {
                        let mine = grid.get_mut(i, j).expect("skeletons disagree");
                        mine.axpy_h(alpha, oc, ctx).map_err(|e| e.at_child(i, j))?;
                    }
                    Ok(())
                } else {
                    let dense = other.to_dense(ctx.kernel);
                    self.axpy_dense(alpha, dense.view(), ctx)
                }
            }
        }
    }

    /// `self += alpha * x` for a dense update, distributing over the block
    /// structure (low-rank leaves absorb the update through compression).
    pub fn axpy_dense<K: DenseKernel<T>>(
        &mut self,
        alpha: T,
        x: ArrayView<'_, T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(x.rows(), self.rows_count());
        assert_eq!(x.cols(), self.cols_count());
        if alpha.is_zero() {
            return Ok(());
        }
        let (ro, co) = (self.row_offset(), self.col_offset());
        match &mut self.node {
            Node::Dense(leaf) => {
                leaf.tile.view_mut().axpy(alpha, x);
                leaf.pivots = None;
                Ok(())
            }
            Node::Rk(mine) => {
                let update =
                    RkMatrix::compress_dense(x, ctx.recompression_epsilon, ctx.kernel)?;
                mine.append_scaled(alpha, &update);
                mine.truncate(ctx.recompression_epsilon, ctx.kernel)?;
                Ok(())
            }
            Node::Internal(grid) => {
                for (i, j, c) in grid.cells_mut() {
                    let chunk = x.sub(
                        c.row_offset() - ro,
                        c.rows_count(),
                        c.col_offset() - co,
                        c.cols_count(),
                    );
                    c.axpy_dense(alpha, chunk, ctx)
                        .map_err(|e| e.at_child(i, j))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmatrs_cluster::{ClusterTreeBuilder, ClusteringStrategy, DofPoint};
    use hmatrs_core::NativeKernel;

    fn small_tree(n: usize, leaf: usize) -> Arc<ClusterTree> {
        let pts: Vec<DofPoint> = (0..n)
            .map(|i| DofPoint::new([i as f64, 0.0, 0.0], i))
            .collect();
        Arc::new(
            ClusterTreeBuilder::new(ClusteringStrategy::Median)
                .with_max_leaf_size(leaf)
                .build(pts),
        )
    }

    #[test]
    fn test_dense_leaf_roundtrip() {
        let k = NativeKernel;
        let tree = small_tree(4, 4);
        let c = ClusterRef::root(Arc::clone(&tree));
        let tile = ScalarArray::from_fn(4, 4, |i, j| (i * 4 + j) as f64);
        let h = HMatrix::new(c.clone(), c, Node::Dense(DenseLeaf::new(tile.clone())));
        assert_eq!(h.rows_count(), 4);
        assert!(h.is_leaf());
        let dense = h.to_dense(&k);
        assert_eq!(dense, tile);
        assert!((h.norm(&k) - tile.norm()).abs() < 1e-12);
    }

    #[test]
    fn test_apply_matches_dense() {
        let k = NativeKernel;
        let tree = small_tree(6, 6);
        let c = ClusterRef::root(Arc::clone(&tree));
        let tile = ScalarArray::from_fn(6, 6, |i, j| 1.0 / (1.0 + i as f64 + 2.0 * j as f64));
        let h = HMatrix::new(c.clone(), c, Node::Dense(DenseLeaf::new(tile.clone())));
        let x = ScalarArray::from_fn(6, 2, |i, j| (i + j) as f64);
        let mut y = ScalarArray::zeros(6, 2);
        h.apply(Trans::No, 1.0, x.view(), 0.0, &mut y.view_mut(), &k);
        let mut expect = ScalarArray::zeros(6, 2);
        expect.gemm(Trans::No, Trans::No, 1.0, tile.view(), x.view(), 0.0, &k);
        for j in 0..2 {
            for i in 0..6 {
                assert!((y.get(i, j) - expect.get(i, j)).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn test_check_nan() {
        let tree = small_tree(2, 2);
        let c = ClusterRef::root(Arc::clone(&tree));
        let mut tile = ScalarArray::from_fn(2, 2, |_, _| 1.0);
        tile.set(1, 0, f64::NAN);
        let h = HMatrix::new(c.clone(), c, Node::Dense(DenseLeaf::new(tile)));
        assert!(matches!(
            h.check_nan(),
            Err(HmatError::NanDetected { .. })
        ));
    }
}
