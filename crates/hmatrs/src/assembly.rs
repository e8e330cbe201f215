//! Assembly: populating a block-tree skeleton from a matrix-element
//! generator.
//!
//! The generator is called with *original* (pre-permutation) indices; the
//! assembly layer translates through the cluster-tree permutations. Leaves
//! are filled independently, so the whole pass is submitted to the task
//! executor as one batch. Optional post-passes: per-block validation against
//! the dense reference, and coarsening of all-low-rank sibling sets.

use std::marker::PhantomData;

use hmatrs_core::{DenseKernel, ScalarArray, Scalar};
use hmatrs_compress::{compress_block, MatrixOracle, RkMatrix};

use crate::algebra::Context;
use crate::error::{BlockPath, HmatError, Result};
use crate::executor::{Task, TaskExecutor};
use crate::node::{ClusterRef, HMatrix, Node};
use crate::settings::HmatSettings;

/// User-supplied matrix-element generator over original DoF indices.
pub trait MatrixGenerator<T: Scalar>: Sync {
    /// Single element, original indices.
    fn entry(&self, row: usize, col: usize) -> T;

    /// Fill a tile for the given original index sets. `out` has shape
    /// `(rows.len(), cols.len())`. Override when a blocked evaluation is
    /// cheaper than per-element calls.
    fn fill_block(&self, rows: &[usize], cols: &[usize], out: &mut ScalarArray<T>) {
        for (jj, &c) in cols.iter().enumerate() {
            for (ii, &r) in rows.iter().enumerate() {
                out.set(ii, jj, self.entry(r, c));
            }
        }
    }
}

/// Oracle over one block: translates block-local to original indices.
pub(crate) struct BlockOracle<'a, T, G> {
    generator: &'a G,
    row_indices: Vec<usize>,
    col_indices: Vec<usize>,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, G: MatrixGenerator<T>> BlockOracle<'a, T, G> {
    pub fn new(generator: &'a G, rows: &ClusterRef, cols: &ClusterRef) -> Self {
        let row_indices = rows
            .view()
            .node()
            .range()
            .map(|p| rows.tree().original_index(p))
            .collect();
        let col_indices = cols
            .view()
            .node()
            .range()
            .map(|p| cols.tree().original_index(p))
            .collect();
        Self {
            generator,
            row_indices,
            col_indices,
            _scalar: PhantomData,
        }
    }
}

impl<'a, T: Scalar, G: MatrixGenerator<T>> MatrixOracle<T> for BlockOracle<'a, T, G> {
    fn nrows(&self) -> usize {
        self.row_indices.len()
    }

    fn ncols(&self) -> usize {
        self.col_indices.len()
    }

    fn entry(&self, i: usize, j: usize) -> T {
        self.generator.entry(self.row_indices[i], self.col_indices[j])
    }

    fn to_dense(&self) -> ScalarArray<T> {
        let mut tile = ScalarArray::zeros(self.nrows(), self.ncols());
        self.generator
            .fill_block(&self.row_indices, &self.col_indices, &mut tile);
        tile
    }
}

/// Populate every leaf of the skeleton from the generator.
pub fn assemble<T, G, K, E>(
    h: &mut HMatrix<T>,
    generator: &G,
    settings: &HmatSettings,
    kernel: &K,
    executor: &E,
) -> Result<()>
where
    T: Scalar,
    G: MatrixGenerator<T>,
    K: DenseKernel<T>,
    E: TaskExecutor,
{
    let mut leaves = Vec::new();
    collect_leaves(h, &mut BlockPath::root(), &mut leaves);
    let tasks: Vec<Task<'_>> = leaves
        .into_iter()
        .map(|(path, leaf)| {
            Box::new(move || assemble_leaf(leaf, &path, generator, settings, kernel)) as Task<'_>
        })
        .collect();
    executor.execute(tasks, settings.max_parallel_leaves)?;
    if settings.coarsening {
        let ctx = Context::with_epsilon(kernel, settings.assembly_epsilon);
        coarsen(h, &ctx)?;
    }
    Ok(())
}

/// Gather the leaf shells together with their root-to-leaf block paths, so
/// assembly errors can report where they happened.
fn collect_leaves<'a, T: Scalar>(
    h: &'a mut HMatrix<T>,
    prefix: &mut BlockPath,
    out: &mut Vec<(BlockPath, &'a mut HMatrix<T>)>,
) {
    if h.is_leaf() {
        out.push((prefix.clone(), h));
        return;
    }
    if let Node::Internal(grid) = h.node_mut() {
        for (i, j, c) in grid.cells_mut() {
            prefix.0.push((i, j));
            collect_leaves(c, prefix, out);
            prefix.0.pop();
        }
    }
}

fn assemble_leaf<T, G, K>(
    leaf: &mut HMatrix<T>,
    path: &BlockPath,
    generator: &G,
    settings: &HmatSettings,
    kernel: &K,
) -> Result<()>
where
    T: Scalar,
    G: MatrixGenerator<T>,
    K: DenseKernel<T>,
{
    let oracle = BlockOracle::new(generator, leaf.rows(), leaf.cols());
    let (row_off, col_off) = (leaf.row_offset(), leaf.col_offset());
    match leaf.node_mut() {
        Node::Dense(dl) => {
            dl.tile = oracle.to_dense();
            dl.pivots = None;
            Ok(())
        }
        Node::Rk(rk) => {
            // block-position seed keeps the reference-cross choice
            // deterministic under any execution order
            let seed = ((row_off as u64) << 32) ^ col_off as u64;
            let mut compressed = compress_block(
                settings.compression_method,
                &oracle,
                settings.assembly_epsilon,
                kernel,
                seed,
            )
            .map_err(|e| HmatError::from(e).at_path(path))?;
            if settings.recompress {
                compressed
                    .rk
                    .truncate_mgs(settings.recompression_epsilon, kernel)
                    .map_err(|e| HmatError::from(e).at_path(path))?;
            }
            if settings.validate_compression {
                validate_block(
                    &oracle,
                    &mut compressed.rk,
                    path,
                    row_off,
                    col_off,
                    settings,
                    kernel,
                )?;
            }
            *rk = compressed.rk;
            Ok(())
        }
        Node::Internal(_) => unreachable!("assembly tasks are leaves"),
    }
}

/// Compare a compressed block against its dense reference, applying the
/// configured dump / re-run / fail policy. Failures carry the block's path
/// from the root.
#[allow(clippy::too_many_arguments)]
fn validate_block<T, O, K>(
    oracle: &O,
    rk: &mut RkMatrix<T>,
    path: &BlockPath,
    row_off: usize,
    col_off: usize,
    settings: &HmatSettings,
    kernel: &K,
) -> Result<()>
where
    T: Scalar,
    O: MatrixOracle<T>,
    K: DenseKernel<T>,
{
    let reference = oracle.to_dense();
    let ref_norm = reference.norm();
    let rel_error = |rk: &RkMatrix<T>| {
        let mut diff = rk.to_dense(kernel);
        diff.axpy(-T::one(), &reference);
        if ref_norm > 0.0 {
            diff.norm() / ref_norm
        } else {
            diff.norm()
        }
    };
    let mut err = rel_error(rk);
    if err <= settings.validation_error_threshold {
        return Ok(());
    }
    if settings.validation_dump {
        dump_block(&reference, rk, row_off, col_off, kernel).map_err(|e| e.at_path(path))?;
    }
    if settings.validation_rerun {
        *rk = RkMatrix::compress_dense(reference.view(), settings.assembly_epsilon, kernel)
            .map_err(|e| HmatError::from(e).at_path(path))?;
        err = rel_error(rk);
        if err <= settings.validation_error_threshold {
            return Ok(());
        }
    }
    Err(HmatError::RankExceeded {
        path: path.clone(),
        achieved: err,
        target: settings.assembly_epsilon,
    })
}

fn dump_block<T: Scalar, K: DenseKernel<T>>(
    reference: &ScalarArray<T>,
    rk: &RkMatrix<T>,
    row_off: usize,
    col_off: usize,
    kernel: &K,
) -> Result<()> {
    let mut f = std::fs::File::create(format!("hmat-block-{row_off}x{col_off}-ref.bin"))
        .map_err(hmatrs_core::CoreError::from)?;
    hmatrs_core::io::write_tile(&mut f, reference)?;
    let approx = rk.to_dense(kernel);
    let mut f = std::fs::File::create(format!("hmat-block-{row_off}x{col_off}-rk.bin"))
        .map_err(hmatrs_core::CoreError::from)?;
    hmatrs_core::io::write_tile(&mut f, &approx)?;
    Ok(())
}

/// Merge sibling sets that all became low-rank into a single low-rank leaf
/// when that shrinks storage. Runs bottom-up.
fn coarsen<T: Scalar, K: DenseKernel<T>>(h: &mut HMatrix<T>, ctx: &Context<'_, K>) -> Result<()> {
    let (m, n) = (h.rows_count(), h.cols_count());
    let (ro, co) = (h.row_offset(), h.col_offset());
    let merged = {
        let Node::Internal(grid) = h.node_mut() else {
            return Ok(());
        };
        for (i, j, c) in grid.cells_mut() {
            coarsen(c, ctx).map_err(|e| e.at_child(i, j))?;
        }
        if grid.cells().any(|(_, _, c)| !matches!(c.node(), Node::Rk(_))) {
            None
        } else {
            let children_size: usize = grid.cells().map(|(_, _, c)| c.compressed_size()).sum();
            let mut merged = RkMatrix::zero(m, n);
            for (_, _, c) in grid.cells() {
                let Node::Rk(rk) = c.node() else { unreachable!() };
                let embedded = rk.embedded(m, n, c.row_offset() - ro, c.col_offset() - co);
                merged.append_scaled(T::one(), &embedded);
            }
            merged.truncate(ctx.recompression_epsilon, ctx.kernel)?;
            (merged.compressed_size() < children_size).then_some(merged)
        }
    };
    if let Some(rk) = merged {
        *h.node_mut() = Node::Rk(rk);
    }
    Ok(())
}
