//! Block-tree skeleton construction.
//!
//! A recursive pair-walk over (row cluster, column cluster): admissible
//! pairs become low-rank shells, pairs that cannot be subdivided become
//! dense shells, everything else subdivides into a child grid. The
//! admissibility predicate may request subdividing only one axis, which
//! yields 2x1 / 1x2 grids (tall or skinny blocks).

use std::sync::Arc;

use hmatrs_cluster::{Admissibility, ClusterTree, ClusterTreeBuilder, DofPoint};
use hmatrs_core::{ScalarArray, Scalar};
use hmatrs_compress::RkMatrix;

use crate::node::{ClusterRef, DenseLeaf, Grid, HMatrix, Node};
use crate::settings::HmatSettings;

/// Build a cluster tree with the configured strategy and leaf size.
pub fn build_cluster_tree(points: Vec<DofPoint>, settings: &HmatSettings) -> ClusterTree {
    ClusterTreeBuilder::new(settings.clustering)
        .with_max_leaf_size(settings.max_leaf_size)
        .build(points)
}

/// Build the (unassembled) block tree for a cluster-tree pair.
pub fn build_block_tree<T: Scalar>(
    rows: Arc<ClusterTree>,
    cols: Arc<ClusterTree>,
    admissibility: &dyn Admissibility,
    settings: &HmatSettings,
) -> HMatrix<T> {
    build_node(
        ClusterRef::root(rows),
        ClusterRef::root(cols),
        admissibility,
        settings,
    )
}

fn build_node<T: Scalar>(
    rows: ClusterRef,
    cols: ClusterRef,
    admissibility: &dyn Admissibility,
    settings: &HmatSettings,
) -> HMatrix<T> {
    let (m, n) = (rows.size(), cols.size());
    if m == 0 || n == 0 {
        return dense_shell(rows, cols);
    }
    if admissibility.is_admissible(rows.view(), cols.view()) {
        // too small to compress profitably: keep it dense
        if m.max(n) < settings.compression_min_leaf_size {
            return dense_shell(rows, cols);
        }
        return HMatrix::new(rows, cols, Node::Rk(RkMatrix::zero(m, n)));
    }
    let (want_rows, want_cols) = admissibility.split_axes(rows.view(), cols.view());
    let (sub_rows, sub_cols) = if want_rows && want_cols {
        // symmetric subdivision needs both clusters splittable
        if rows.is_leaf() || cols.is_leaf() {
            (false, false)
        } else {
            (true, true)
        }
    } else {
        (want_rows && !rows.is_leaf(), want_cols && !cols.is_leaf())
    };
    if !sub_rows && !sub_cols {
        return dense_shell(rows, cols);
    }
    let row_parts = rows.parts(sub_rows);
    let col_parts = cols.parts(sub_cols);
    let mut cells = Vec::with_capacity(row_parts.len() * col_parts.len());
    for rp in &row_parts {
        for cp in &col_parts {
            if rp.size() == 0 || cp.size() == 0 {
                cells.push(None);
            } else {
                cells.push(Some(Box::new(build_node(
                    rp.clone(),
                    cp.clone(),
                    admissibility,
                    settings,
                ))));
            }
        }
    }
    HMatrix::new(rows, cols, Node::Internal(Grid::new(row_parts, col_parts, cells)))
}

fn dense_shell<T: Scalar>(rows: ClusterRef, cols: ClusterRef) -> HMatrix<T> {
    let tile = ScalarArray::zeros(rows.size(), cols.size());
    HMatrix::new(rows, cols, Node::Dense(DenseLeaf::new(tile)))
}
