//! Block GEMM: `self = beta * self + alpha * op(a) * op(b)`.
//!
//! Dispatch follows the operand variants. A low-rank operand turns the
//! whole product into a low-rank update; matching internal structures
//! recurse block-wise; everything else is formed as a dense panel product
//! over the target's span and distributed.

use hmatrs_core::{DenseKernel, ScalarArray, Scalar, Trans};
use hmatrs_compress::RkMatrix;

use crate::algebra::Context;
use crate::error::Result;
use crate::node::{ClusterRef, Grid, HMatrix, Node};

fn op_counts<T: Scalar>(h: &HMatrix<T>, trans: Trans) -> (usize, usize) {
    if trans.is_transposed() {
        (h.cols_count(), h.rows_count())
    } else {
        (h.rows_count(), h.cols_count())
    }
}

fn parts_match(a: &[&ClusterRef], b: &[&ClusterRef]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_node(y))
}

fn grid_parts<T: Scalar>(grid: &Grid<T>, trans: Trans) -> (Vec<&ClusterRef>, Vec<&ClusterRef>) {
    let rows: Vec<&ClusterRef> = (0..grid.nrow_parts()).map(|i| grid.row_part(i)).collect();
    let cols: Vec<&ClusterRef> = (0..grid.ncol_parts()).map(|j| grid.col_part(j)).collect();
    if trans.is_transposed() {
        (cols, rows)
    } else {
        (rows, cols)
    }
}

impl<T: Scalar> HMatrix<T> {
    /// `self = beta * self + alpha * op(a) * op(b)`.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm<K: DenseKernel<T>>(
        &mut self,
        transa: Trans,
        transb: Trans,
        alpha: T,
        a: &HMatrix<T>,
        b: &HMatrix<T>,
        beta: T,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        let (m, ka) = op_counts(a, transa);
        let (kb, n) = op_counts(b, transb);
        assert_eq!(ka, kb, "gemm inner dimensions differ");
        assert_eq!(self.rows_count(), m, "gemm row count differs");
        assert_eq!(self.cols_count(), n, "gemm column count differs");
        if beta.is_zero() {
            self.clear();
        } else if !beta.is_one() {
            self.scale(beta);
        }
        if alpha.is_zero() || m == 0 || n == 0 || ka == 0 {
            return Ok(());
        }
        self.gemm_add(transa, transb, alpha, a, b, ctx)
    }

    fn gemm_add<K: DenseKernel<T>>(
        &mut self,
        transa: Trans,
        transb: Trans,
        alpha: T,
        a: &HMatrix<T>,
        b: &HMatrix<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        let kernel = ctx.kernel;
        match (a.node(), b.node()) {
            (Node::Rk(x), Node::Rk(y)) => {
                let p = RkMatrix::multiply_rk_rk(alpha, x, transa, y, transb, kernel);
                self.axpy_rk(T::one(), &p, ctx)
            }
            (Node::Rk(x), Node::Dense(d)) => {
                let p = RkMatrix::multiply_rk_dense(alpha, x, transa, d.tile.view(), transb, kernel);
                self.axpy_rk(T::one(), &p, ctx)
            }
            (Node::Dense(d), Node::Rk(y)) => {
                let p = RkMatrix::multiply_dense_rk(alpha, d.tile.view(), transa, y, transb, kernel);
                self.axpy_rk(T::one(), &p, ctx)
            }
            (Node::Rk(x), Node::Internal(_)) => {
                // op(x) op(b) = a' (op(b)^H b')^H keeps the rank of x
                let ox = x.transposed(transa);
                if ox.rank() == 0 {
                    return Ok(());
                }
                let (_, n) = op_counts(b, transb);
                let mut bnew = ScalarArray::zeros(n, ox.rank());
                b.apply_adjoint(
                    transb,
                    T::one(),
                    ox.b().view(),
                    T::zero(),
                    &mut bnew.view_mut(),
                    kernel,
                );
                let mut anew = ox.a().clone();
                anew.scale(alpha);
                let p = RkMatrix::new(anew, bnew);
                self.axpy_rk(T::one(), &p, ctx)
            }
            (Node::Internal(_), Node::Rk(y)) => {
                let oy = y.transposed(transb);
                if oy.rank() == 0 {
                    return Ok(());
                }
                let (m, _) = op_counts(a, transa);
                let mut anew = ScalarArray::zeros(m, oy.rank());
                a.apply(
                    transa,
                    alpha,
                    oy.a().view(),
                    T::zero(),
                    &mut anew.view_mut(),
                    kernel,
                );
                let p = RkMatrix::new(anew, oy.b().clone());
                self.axpy_rk(T::one(), &p, ctx)
            }
            (Node::Dense(da), Node::Dense(db)) => {
                if let Node::Dense(mine) = self.node_mut() {
                    mine.tile.gemm(
                        transa,
                        transb,
                        alpha,
                        da.tile.view(),
                        db.tile.view(),
                        T::one(),
                        kernel,
                    );
                    mine.pivots = None;
                    Ok(())
                } else {
                    let mut t = ScalarArray::zeros(self.rows_count(), self.cols_count());
                    t.gemm(
                        transa,
                        transb,
                        alpha,
                        da.tile.view(),
                        db.tile.view(),
                        T::zero(),
                        kernel,
                    );
                    self.axpy_dense(T::one(), t.view(), ctx)
                }
            }
            (Node::Dense(da), Node::Internal(_)) => {
                // form op(da) once, stream it through the internal operand
                let opa = da.tile.transposed(transa);
                let mut t = ScalarArray::zeros(self.rows_count(), self.cols_count());
                b.apply_right(transb, alpha, opa.view(), T::zero(), &mut t.view_mut(), kernel);
                self.axpy_dense(T::one(), t.view(), ctx)
            }
            (Node::Internal(_), Node::Dense(db)) => {
                let opb = db.tile.transposed(transb);
                let mut t = ScalarArray::zeros(self.rows_count(), self.cols_count());
                a.apply(transa, alpha, opb.view(), T::zero(), &mut t.view_mut(), kernel);
                self.axpy_dense(T::one(), t.view(), ctx)
            }
            (Node::Internal(ag), Node::Internal(bg)) => {
                if self.compatible_recursion(transa, ag, transb, bg) {
                    self.gemm_recurse(transa, transb, alpha, a, b, ctx)
                } else {
                    // structure mismatch: fall back to a dense panel product
                    // over this node's span
                    let ad = a.to_dense(kernel);
                    let bd = b.to_dense(kernel);
                    let mut t = ScalarArray::zeros(self.rows_count(), self.cols_count());
                    t.gemm(transa, transb, alpha, ad.view(), bd.view(), T::zero(), kernel);
                    self.axpy_dense(T::one(), t.view(), ctx)
                }
            }
        }
    }

    fn compatible_recursion(
        &self,
        transa: Trans,
        ag: &Grid<T>,
        transb: Trans,
        bg: &Grid<T>,
    ) -> bool {
        let Node::Internal(cg) = self.node() else {
            return false;
        };
        let (a_rows, a_cols) = grid_parts(ag, transa);
        let (b_rows, b_cols) = grid_parts(bg, transb);
        let (c_rows, c_cols) = grid_parts(cg, Trans::No);
        parts_match(&a_cols, &b_rows) && parts_match(&c_rows, &a_rows) && parts_match(&c_cols, &b_cols)
    }

    fn gemm_recurse<K: DenseKernel<T>>(
        &mut self,
        transa: Trans,
        transb: Trans,
        alpha: T,
        a: &HMatrix<T>,
        b: &HMatrix<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        let (Node::Internal(ag), Node::Internal(bg)) = (a.node(), b.node()) else {
            unreachable!()
        };
        let Node::Internal(cg) = self.node_mut() else {
            unreachable!()
        };
        let na = transa.is_transposed();
        let nb = transb.is_transposed();
        let nk = if na { ag.nrow_parts() } else { ag.ncol_parts() };
        for i in 0..cg.nrow_parts() {
            for j in 0..cg.ncol_parts() {
                if cg.get(i, j).is_none() {
                    continue;
                }
                for k in 0..nk {
                    let achild = if na { ag.get(k, i) } else { ag.get(i, k) };
                    let bchild = if nb { bg.get(j, k) } else { bg.get(k, j) };
                    if let (Some(ac), Some(bc)) = (achild, bchild) {
                        let mut cij = cg.take(i, j).unwrap();
                        let res = cij.gemm(transa, transb, alpha, ac, bc, T::one(), ctx);
                        cg.put(i, j, cij);
                        res.map_err(|e| e.at_child(i, j))?;
                    }
                }
            }
        }
        Ok(())
    }
}
