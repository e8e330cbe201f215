//! Block inverse by Gauss-Jordan elimination over block columns.
//!
//! Equivalent to eliminating the extended matrix `[m | id]`: at the end of
//! step `k` the first `k` block columns hold the growing inverse. Products
//! whose destination aliases an operand go through a scoped temporary,
//! released at the end of the step.

use hmatrs_core::{DenseKernel, Scalar, Trans};

use crate::algebra::Context;
use crate::error::{HmatError, Result};
use crate::node::{HMatrix, Node};

impl<T: Scalar> HMatrix<T> {
    /// In-place inverse of a square non-symmetric node.
    pub fn inverse<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        if self.rows_count() == 0 {
            return Err(HmatError::EmptyCluster);
        }
        assert_eq!(
            self.rows_count(),
            self.cols_count(),
            "inverse needs a square node"
        );
        match self.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                leaf.tile.invert_in_place(ctx.kernel)?;
                Ok(())
            }
            Node::Rk(_) => unreachable!("cannot invert a low-rank diagonal block"),
            Node::Internal(_) => self.inverse_internal(ctx),
        }
    }

    fn inverse_internal<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        let Node::Internal(grid) = self.node_mut() else {
            unreachable!()
        };
        let n = grid.nrow_parts();
        assert_eq!(n, grid.ncol_parts());
        for k in 0..n {
            let mut diag = grid.take(k, k).expect("missing diagonal block");
            diag.inverse(ctx).map_err(|e| e.at_child(k, k))?;
            grid.put(k, k, diag);
            // row k: m_kj <- m_kk^-1 m_kj (temporary: the product would
            // otherwise read its own destination)
            for j in 0..n {
                if j == k {
                    continue;
                }
                if let Some(mut mkj) = grid.take(k, j) {
                    let x = mkj.clone();
                    let res = mkj.gemm(
                        Trans::No,
                        Trans::No,
                        T::one(),
                        grid.get(k, k).unwrap(),
                        &x,
                        T::zero(),
                        ctx,
                    );
                    grid.put(k, j, mkj);
                    res.map_err(|e| e.at_child(k, j))?;
                }
            }
            // trailing update: m_ij -= m_ik m_kj
            for i in 0..n {
                if i == k {
                    continue;
                }
                for j in 0..n {
                    if j == k {
                        continue;
                    }
                    if grid.get(i, k).is_none() || grid.get(k, j).is_none() {
                        continue;
                    }
                    if let Some(mut mij) = grid.take(i, j) {
                        let res = mij.gemm(
                            Trans::No,
                            Trans::No,
                            -T::one(),
                            grid.get(i, k).unwrap(),
                            grid.get(k, j).unwrap(),
                            T::one(),
                            ctx,
                        );
                        grid.put(i, j, mij);
                        res.map_err(|e| e.at_child(i, j))?;
                    }
                }
            }
            // column k: m_ik <- -m_ik m_kk^-1
            for i in 0..n {
                if i == k {
                    continue;
                }
                if let Some(mut mik) = grid.take(i, k) {
                    let x = mik.clone();
                    let res = mik.gemm(
                        Trans::No,
                        Trans::No,
                        -T::one(),
                        &x,
                        grid.get(k, k).unwrap(),
                        T::zero(),
                        ctx,
                    );
                    grid.put(i, k, mik);
                    res.map_err(|e| e.at_child(i, k))?;
                }
            }
        }
        Ok(())
    }
}
