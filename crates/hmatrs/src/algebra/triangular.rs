//! Triangular solves.
//!
//! Two layers: solves against a dense right-hand side (an
//! [`ArrayViewMut`] partitioned along child cluster boundaries) and solves
//! where the right-hand side is itself a block-tree node. The H-RHS loops
//! reduce to the dense-RHS layer at leaves; low-rank right-hand sides are
//! solved on a single factor panel without expansion.

use hmatrs_core::{ArrayViewMut, DenseKernel, Diag, Scalar, Side, Trans, Uplo};

use crate::algebra::Context;
use crate::error::Result;
use crate::node::{HMatrix, Node};

impl<T: Scalar> HMatrix<T> {
    /// Solve `op(f) * x = b` where `f` is the stored triangle of this
    /// (factored) node; `b` is overwritten. LU row pivots at dense leaves
    /// are applied on non-transposed lower solves.
    pub(crate) fn solve_triangular_left_dense<K: DenseKernel<T>>(
        &self,
        uplo: Uplo,
        trans: Trans,
        unit: bool,
        b: &mut ArrayViewMut<'_, T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.rows_count(), self.cols_count());
        assert_eq!(b.rows(), self.rows_count());
        match self.node() {
            Node::Dense(leaf) => {
                if uplo == Uplo::Lower && trans == Trans::No {
                    if let Some(pivots) = &leaf.pivots {
                        b.laswp(pivots, true, ctx.kernel);
                    }
                }
                let diag = if unit { Diag::Unit } else { Diag::NonUnit };
                b.trsm(Side::Left, uplo, trans, diag, leaf.tile.view(), ctx.kernel);
                Ok(())
            }
            Node::Rk(_) => unreachable!("triangular factor cannot be low-rank"),
            Node::Internal(grid) => {
                let n = grid.nrow_parts();
                assert_eq!(n, grid.ncol_parts());
                let base = self.row_offset();
                let chunk = |part: usize| {
                    let p = grid.row_part(part);
                    (p.offset() - base, p.size())
                };
                let effective_lower = (uplo == Uplo::Lower) == (trans == Trans::No);
                if effective_lower {
                    // forward: update from already-solved chunks, then the
                    // diagonal system
                    for i in 0..n {
                        for j in 0..i {
                            let child = if trans == Trans::No {
                                grid.get(i, j)
                            } else {
                                grid.get(j, i)
                            };
                            if let Some(c) = child {
                                let (jo, js) = chunk(j);
                                let solved = b.sub_mut(jo, js, 0, b.cols()).as_view().to_owned();
                                let (io, is) = chunk(i);
                                let mut target = b.sub_mut(io, is, 0, b.cols());
                                c.apply(
                                    trans,
                                    -T::one(),
                                    solved.view(),
                                    T::one(),
                                    &mut target,
                                    ctx.kernel,
                                );
                            }
                        }
                        let (io, is) = chunk(i);
                        let mut target = b.sub_mut(io, is, 0, b.cols());
                        grid.get(i, i)
                            .expect("missing diagonal block")
                            .solve_triangular_left_dense(uplo, trans, unit, &mut target, ctx)
                            .map_err(|e| e.at_child(i, i))?;
                    }
                } else {
                    // backward: solve the diagonal system, then push the
                    // solution into the rows above
                    for i in (0..n).rev() {
                        let (io, is) = chunk(i);
                        {
                            let mut target = b.sub_mut(io, is, 0, b.cols());
                            grid.get(i, i)
                                .expect("missing diagonal block")
                                .solve_triangular_left_dense(uplo, trans, unit, &mut target, ctx)
                                .map_err(|e| e.at_child(i, i))?;
                        }
                        for j in 0..i {
                            let child = if trans == Trans::No {
                                grid.get(j, i)
                            } else {
                                grid.get(i, j)
                            };
                            if let Some(c) = child {
                                let solved = b.sub_mut(io, is, 0, b.cols()).as_view().to_owned();
                                let (jo, js) = chunk(j);
                                let mut target = b.sub_mut(jo, js, 0, b.cols());
                                c.apply(
                                    trans,
                                    -T::one(),
                                    solved.view(),
                                    T::one(),
                                    &mut target,
                                    ctx.kernel,
                                );
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Solve `x * op(f) = b` for a dense right-hand side (columns of `b`
    /// partitioned along the factor's boundaries).
    pub(crate) fn solve_triangular_right_dense<K: DenseKernel<T>>(
        &self,
        uplo: Uplo,
        trans: Trans,
        unit: bool,
        b: &mut ArrayViewMut<'_, T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.rows_count(), self.cols_count());
        assert_eq!(b.cols(), self.rows_count());
        match self.node() {
            Node::Dense(leaf) => {
                let diag = if unit { Diag::Unit } else { Diag::NonUnit };
                b.trsm(Side::Right, uplo, trans, diag, leaf.tile.view(), ctx.kernel);
                Ok(())
            }
            Node::Rk(_) => unreachable!("triangular factor cannot be low-rank"),
            Node::Internal(grid) => {
                let n = grid.nrow_parts();
                assert_eq!(n, grid.ncol_parts());
                let base = self.row_offset();
                let chunk = |part: usize| {
                    let p = grid.row_part(part);
                    (p.offset() - base, p.size())
                };
                let effective_lower = (uplo == Uplo::Lower) == (trans == Trans::No);
                if !effective_lower {
                    // x * u: columns left to right
                    for j in 0..n {
                        for l in 0..j {
                            // b_j -= b_l * op(f)[l, j]
                            let child = if trans == Trans::No {
                                grid.get(l, j)
                            } else {
                                grid.get(j, l)
                            };
                            if let Some(c) = child {
                                let (lo, ls) = chunk(l);
                                let solved = b.sub_mut(0, b.rows(), lo, ls).as_view().to_owned();
                                let (jo, js) = chunk(j);
                                let mut target = b.sub_mut(0, b.rows(), jo, js);
                                c.apply_right(
                                    trans,
                                    -T::one(),
                                    solved.view(),
                                    T::one(),
                                    &mut target,
                                    ctx.kernel,
                                );
                            }
                        }
                        let (jo, js) = chunk(j);
                        let mut target = b.sub_mut(0, b.rows(), jo, js);
                        grid.get(j, j)
                            .expect("missing diagonal block")
                            .solve_triangular_right_dense(uplo, trans, unit, &mut target, ctx)
                            .map_err(|e| e.at_child(j, j))?;
                    }
                } else {
                    // x * l: columns right to left
                    for j in (0..n).rev() {
                        for l in (j + 1)..n {
                            let child = if trans == Trans::No {
                                grid.get(l, j)
                            } else {
                                grid.get(j, l)
                            };
                            if let Some(c) = child {
                                let (lo, ls) = chunk(l);
                                let solved = b.sub_mut(0, b.rows(), lo, ls).as_view().to_owned();
                                let (jo, js) = chunk(j);
                                let mut target = b.sub_mut(0, b.rows(), jo, js);
                                c.apply_right(
                                    trans,
                                    -T::one(),
                                    solved.view(),
                                    T::one(),
                                    &mut target,
                                    ctx.kernel,
                                );
                            }
                        }
                        let (jo, js) = chunk(j);
                        let mut target = b.sub_mut(0, b.rows(), jo, js);
                        grid.get(j, j)
                            .expect("missing diagonal block")
                            .solve_triangular_right_dense(uplo, trans, unit, &mut target, ctx)
                            .map_err(|e| e.at_child(j, j))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Forward substitution `l * x = b` with a block right-hand side; `l` is
    /// this node's stored lower triangle (unit for LU factors).
    pub fn solve_lower_triangular_left<K: DenseKernel<T>>(
        &self,
        b: &mut HMatrix<T>,
        unit: bool,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.cols_count(), b.rows_count());
        match b.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                self.solve_triangular_left_dense(
                    Uplo::Lower,
                    Trans::No,
                    unit,
                    &mut leaf.tile.view_mut(),
                    ctx,
                )
            }
            Node::Rk(rk) => {
                // l^-1 (a b^H) touches only the a panel
                self.solve_triangular_left_dense(
                    Uplo::Lower,
                    Trans::No,
                    unit,
                    &mut rk.a_mut().view_mut(),
                    ctx,
                )
            }
            Node::Internal(bgrid) => {
                if let Node::Internal(grid) = self.node() {
                    if grid.nrow_parts() == bgrid.nrow_parts() {
                        let n = grid.nrow_parts();
                        for k in 0..bgrid.ncol_parts() {
                            for i in 0..n {
                                if bgrid.get(i, k).is_none() {
                                    continue;
                                }
                                for j in 0..i {
                                    if grid.get(i, j).is_some() && bgrid.get(j, k).is_some() {
                                        let mut bik = bgrid.take(i, k).unwrap();
                                        let res = bik.gemm(
                                            Trans::No,
                                            Trans::No,
                                            -T::one(),
                                            grid.get(i, j).unwrap(),
                                            bgrid.get(j, k).unwrap(),
                                            T::one(),
                                            ctx,
                                        );
                                        bgrid.put(i, k, bik);
                                        res.map_err(|e| e.at_child(i, k))?;
                                    }
                                }
                                let mut bik = bgrid.take(i, k).unwrap();
                                let res = grid
                                    .get(i, i)
                                    .expect("missing diagonal block")
                                    .solve_lower_triangular_left(&mut bik, unit, ctx);
                                bgrid.put(i, k, bik);
                                res.map_err(|e| e.at_child(i, k))?;
                            }
                        }
                        return Ok(());
                    }
                }
                assert!(
                    !matches!(self.node(), Node::Rk(_)),
                    "triangular factor cannot be low-rank"
                );
                // leaf factor, or a right-hand side whose row axis is not
                // subdivided: descend into the right-hand side's children
                assert_eq!(bgrid.nrow_parts(), 1);
                for k in 0..bgrid.ncol_parts() {
                    if let Some(child) = bgrid.get_mut(0, k) {
                        self.solve_lower_triangular_left(child, unit, ctx)
                            .map_err(|e| e.at_child(0, k))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Backward substitution `x * op(u) = b` with a block right-hand side.
    /// `lower_trans` is `None` when the factor is stored upper, or
    /// `Some(t)` when it is a lower factor used as `op_t(l)` (Cholesky /
    /// LDL^T column solves).
    pub fn solve_upper_triangular_right<K: DenseKernel<T>>(
        &self,
        b: &mut HMatrix<T>,
        unit: bool,
        lower_trans: Option<Trans>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.rows_count(), b.cols_count());
        let (uplo, trans) = match lower_trans {
            None => (Uplo::Upper, Trans::No),
            Some(t) => (Uplo::Lower, t),
        };
        match b.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                self.solve_triangular_right_dense(
                    uplo,
                    trans,
                    unit,
                    &mut leaf.tile.view_mut(),
                    ctx,
                )
            }
            Node::Rk(rk) => {
                // x * op(u) = a b^H solves op(u)^H y = b on the b panel
                match lower_trans {
                    None => self.solve_triangular_left_dense(
                        Uplo::Upper,
                        Trans::ConjTrans,
                        unit,
                        &mut rk.b_mut().view_mut(),
                        ctx,
                    ),
                    Some(Trans::ConjTrans) => self.solve_triangular_left_dense(
                        Uplo::Lower,
                        Trans::No,
                        unit,
                        &mut rk.b_mut().view_mut(),
                        ctx,
                    ),
                    Some(Trans::Trans) => {
                        // (l^T)^H = conj(l): conjugate, solve, conjugate back
                        rk.b_mut().conjugate();
                        let res = self.solve_triangular_left_dense(
                            Uplo::Lower,
                            Trans::No,
                            unit,
                            &mut rk.b_mut().view_mut(),
                            ctx,
                        );
                        rk.b_mut().conjugate();
                        res
                    }
                    Some(Trans::No) => unreachable!("lower_trans must transpose"),
                }
            }
            Node::Internal(bgrid) => {
                if let Node::Internal(grid) = self.node() {
                    if grid.ncol_parts() == bgrid.ncol_parts() {
                        let n = grid.nrow_parts();
                        for k in 0..bgrid.nrow_parts() {
                            for i in 0..n {
                                if bgrid.get(k, i).is_none() {
                                    continue;
                                }
                                for j in 0..i {
                                    let u_ji = if trans == Trans::No {
                                        grid.get(j, i)
                                    } else {
                                        grid.get(i, j)
                                    };
                                    if u_ji.is_some() && bgrid.get(k, j).is_some() {
                                        let mut bki = bgrid.take(k, i).unwrap();
                                        let res = bki.gemm(
                                            Trans::No,
                                            trans,
                                            -T::one(),
                                            bgrid.get(k, j).unwrap(),
                                            u_ji.unwrap(),
                                            T::one(),
                                            ctx,
                                        );
                                        bgrid.put(k, i, bki);
                                        res.map_err(|e| e.at_child(k, i))?;
                                    }
                                }
                                let mut bki = bgrid.take(k, i).unwrap();
                                let res = grid
                                    .get(i, i)
                                    .expect("missing diagonal block")
                                    .solve_upper_triangular_right(&mut bki, unit, lower_trans, ctx);
                                bgrid.put(k, i, bki);
                                res.map_err(|e| e.at_child(k, i))?;
                            }
                        }
                        return Ok(());
                    }
                }
                assert!(
                    !matches!(self.node(), Node::Rk(_)),
                    "triangular factor cannot be low-rank"
                );
                assert_eq!(bgrid.ncol_parts(), 1);
                for k in 0..bgrid.nrow_parts() {
                    if let Some(child) = bgrid.get_mut(k, 0) {
                        self.solve_upper_triangular_right(child, unit, lower_trans, ctx)
                            .map_err(|e| e.at_child(k, 0))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Backward substitution `op(u) * x = b` with a block right-hand side,
    /// descending from the last block row to the first.
    pub fn solve_upper_triangular_left<K: DenseKernel<T>>(
        &self,
        b: &mut HMatrix<T>,
        unit: bool,
        lower_trans: Option<Trans>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        assert_eq!(self.cols_count(), b.rows_count());
        let (uplo, trans) = match lower_trans {
            None => (Uplo::Upper, Trans::No),
            Some(t) => (Uplo::Lower, t),
        };
        match b.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                self.solve_triangular_left_dense(uplo, trans, unit, &mut leaf.tile.view_mut(), ctx)
            }
            Node::Rk(rk) => self.solve_triangular_left_dense(
                uplo,
                trans,
                unit,
                &mut rk.a_mut().view_mut(),
                ctx,
            ),
            Node::Internal(bgrid) => {
                if let Node::Internal(grid) = self.node() {
                    if grid.nrow_parts() == bgrid.nrow_parts() {
                        let n = grid.nrow_parts();
                        for k in 0..bgrid.ncol_parts() {
                            for i in (0..n).rev() {
                                if bgrid.get(i, k).is_none() {
                                    continue;
                                }
                                let mut bik = bgrid.take(i, k).unwrap();
                                let res = grid
                                    .get(i, i)
                                    .expect("missing diagonal block")
                                    .solve_upper_triangular_left(&mut bik, unit, lower_trans, ctx);
                                bgrid.put(i, k, bik);
                                res.map_err(|e| e.at_child(i, k))?;
                                for j in 0..i {
                                    let u_ji = if trans == Trans::No {
                                        grid.get(j, i)
                                    } else {
                                        grid.get(i, j)
                                    };
                                    if u_ji.is_some() && bgrid.get(j, k).is_some() {
                                        let mut bjk = bgrid.take(j, k).unwrap();
                                        let res = bjk.gemm(
                                            trans,
                                            Trans::No,
                                            -T::one(),
                                            u_ji.unwrap(),
                                            bgrid.get(i, k).unwrap(),
                                            T::one(),
                                            ctx,
                                        );
                                        bgrid.put(j, k, bjk);
                                        res.map_err(|e| e.at_child(j, k))?;
                                    }
                                }
                            }
                        }
                        return Ok(());
                    }
                }
                assert!(
                    !matches!(self.node(), Node::Rk(_)),
                    "triangular factor cannot be low-rank"
                );
                assert_eq!(bgrid.nrow_parts(), 1);
                for k in 0..bgrid.ncol_parts() {
                    if let Some(child) = bgrid.get_mut(0, k) {
                        self.solve_upper_triangular_left(child, unit, lower_trans, ctx)
                            .map_err(|e| e.at_child(0, k))?;
                    }
                }
                Ok(())
            }
        }
    }
}
