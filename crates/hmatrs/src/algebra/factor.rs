//! In-place block factorizations (LU, LDL^T, LL^H) and their solve drivers.
//!
//! All three follow the same three-phase step over the diagonal: factor the
//! pivot block, solve the coupled row/column blocks, update the trailing
//! submatrix. The loop is strictly sequential in the diagonal index; the
//! inner phases are data-parallel across blocks.

use hmatrs_core::{DenseKernel, ScalarArray, Scalar, Trans, Uplo};

use crate::algebra::Context;
use crate::error::{HmatError, Result};
use crate::node::{HMatrix, Node};
use crate::settings::Factorization;

impl<T: Scalar> HMatrix<T> {
    /// In-place non-symmetric block LU with partial pivoting inside dense
    /// leaves. After return the node holds the unit-lower and upper factors.
    pub fn lu<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        if self.rows_count() == 0 {
            return Err(HmatError::EmptyCluster);
        }
        assert_eq!(self.rows_count(), self.cols_count(), "lu needs a square node");
        match self.node_mut() {
            Node::Dense(leaf) => {
                let pivots = leaf.tile.lu_in_place(ctx.kernel)?;
                leaf.pivots = Some(pivots);
                Ok(())
            }
            Node::Rk(_) => unreachable!("cannot factor a low-rank diagonal block"),
            Node::Internal(_) => self.lu_internal(ctx),
        }
    }

    fn lu_internal<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        let Node::Internal(grid) = self.node_mut() else {
            unreachable!()
        };
        let n = grid.nrow_parts();
        assert_eq!(n, grid.ncol_parts());
        for k in 0..n {
            let mut diag = grid.take(k, k).expect("missing diagonal block");
            diag.lu(ctx).map_err(|e| e.at_child(k, k))?;
            // row k: l_kk u_ki = h_ki
            for i in (k + 1)..n {
                if let Some(mut hki) = grid.take(k, i) {
                    let res = diag.solve_lower_triangular_left(&mut hki, true, ctx);
                    grid.put(k, i, hki);
                    res.map_err(|e| e.at_child(k, i))?;
                }
            }
            // column k: l_ik u_kk = h_ik
            for i in (k + 1)..n {
                if let Some(mut hik) = grid.take(i, k) {
                    let res = diag.solve_upper_triangular_right(&mut hik, false, None, ctx);
                    grid.put(i, k, hik);
                    res.map_err(|e| e.at_child(i, k))?;
                }
            }
            grid.put(k, k, diag);
            // trailing update h_ij -= l_ik u_kj
            for i in (k + 1)..n {
                for j in (k + 1)..n {
                    if grid.get(i, k).is_none() || grid.get(k, j).is_none() {
                        continue;
                    }
                    if let Some(mut hij) = grid.take(i, j) {
                        let res = hij.gemm(
                            Trans::No,
                            Trans::No,
                            -T::one(),
                            grid.get(i, k).unwrap(),
                            grid.get(k, j).unwrap(),
                            T::one(),
                            ctx,
                        );
                        grid.put(i, j, hij);
                        res.map_err(|e| e.at_child(i, j))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// In-place symmetric-indefinite block LDL^T (plain transpose, no
    /// pivoting across blocks). Only the lower triangle and the diagonal are
    /// referenced and overwritten.
    pub fn ldlt<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        if self.rows_count() == 0 {
            return Err(HmatError::EmptyCluster);
        }
        assert_eq!(self.rows_count(), self.cols_count(), "ldlt needs a square node");
        match self.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                leaf.tile.ldlt_in_place(ctx.kernel)?;
                Ok(())
            }
            Node::Rk(_) => unreachable!("cannot factor a low-rank diagonal block"),
            Node::Internal(_) => self.ldlt_internal(ctx),
        }
    }

    fn ldlt_internal<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        let Node::Internal(grid) = self.node_mut() else {
            unreachable!()
        };
        let n = grid.nrow_parts();
        assert_eq!(n, grid.ncol_parts());
        for k in 0..n {
            let mut diag = grid.take(k, k).expect("missing diagonal block");
            diag.ldlt(ctx).map_err(|e| e.at_child(k, k))?;
            let mut dk = Vec::with_capacity(diag.rows_count());
            diag.extract_diagonal(&mut dk);
            // column k: solve l_ik d_k l_kk^T = h_ik
            for i in (k + 1)..n {
                if let Some(mut hik) = grid.take(i, k) {
                    let res = diag.solve_upper_triangular_right(
                        &mut hik,
                        true,
                        Some(Trans::Trans),
                        ctx,
                    );
                    if res.is_ok() {
                        hik.multiply_with_diag(&dk, true);
                    }
                    grid.put(i, k, hik);
                    res.map_err(|e| e.at_child(i, k))?;
                }
            }
            grid.put(k, k, diag);
            // trailing update below the diagonal: h_ij -= l_ik d_k l_jk^T
            for i in (k + 1)..n {
                for j in (k + 1)..=i {
                    if grid.get(i, k).is_none() || grid.get(j, k).is_none() {
                        continue;
                    }
                    let mut lik_dk = grid.get(i, k).unwrap().clone();
                    lik_dk.multiply_with_diag(&dk, false);
                    if let Some(mut hij) = grid.take(i, j) {
                        let res = hij.gemm(
                            Trans::No,
                            Trans::Trans,
                            -T::one(),
                            &lik_dk,
                            grid.get(j, k).unwrap(),
                            T::one(),
                            ctx,
                        );
                        grid.put(i, j, hij);
                        res.map_err(|e| e.at_child(i, j))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// In-place block Cholesky `h = l * l^H` of a Hermitian
    /// positive-definite node. Only the lower triangle is referenced and
    /// overwritten.
    pub fn llt<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        if self.rows_count() == 0 {
            return Err(HmatError::EmptyCluster);
        }
        assert_eq!(self.rows_count(), self.cols_count(), "llt needs a square node");
        match self.node_mut() {
            Node::Dense(leaf) => {
                leaf.pivots = None;
                leaf.tile.cholesky_in_place(ctx.kernel)?;
                Ok(())
            }
            Node::Rk(_) => unreachable!("cannot factor a low-rank diagonal block"),
            Node::Internal(_) => self.llt_internal(ctx),
        }
    }

    fn llt_internal<K: DenseKernel<T>>(&mut self, ctx: &Context<'_, K>) -> Result<()> {
        let Node::Internal(grid) = self.node_mut() else {
            unreachable!()
        };
        let n = grid.nrow_parts();
        assert_eq!(n, grid.ncol_parts());
        for k in 0..n {
            let mut diag = grid.take(k, k).expect("missing diagonal block");
            diag.llt(ctx).map_err(|e| e.at_child(k, k))?;
            // column k: l_ik l_kk^H = h_ik
            for i in (k + 1)..n {
                if let Some(mut hik) = grid.take(i, k) {
                    let res = diag.solve_upper_triangular_right(
                        &mut hik,
                        false,
                        Some(Trans::ConjTrans),
                        ctx,
                    );
                    grid.put(i, k, hik);
                    res.map_err(|e| e.at_child(i, k))?;
                }
            }
            grid.put(k, k, diag);
            // trailing update below the diagonal: h_ij -= l_ik l_jk^H
            for i in (k + 1)..n {
                for j in (k + 1)..=i {
                    if grid.get(i, k).is_none() || grid.get(j, k).is_none() {
                        continue;
                    }
                    if let Some(mut hij) = grid.take(i, j) {
                        let res = hij.gemm(
                            Trans::No,
                            Trans::ConjTrans,
                            -T::one(),
                            grid.get(i, k).unwrap(),
                            grid.get(j, k).unwrap(),
                            T::one(),
                            ctx,
                        );
                        grid.put(i, j, hij);
                        res.map_err(|e| e.at_child(i, j))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Factor in place with the requested decomposition.
    pub fn factorize<K: DenseKernel<T>>(
        &mut self,
        factorization: Factorization,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        match factorization {
            Factorization::Lu => self.lu(ctx),
            Factorization::Ldlt => self.ldlt(ctx),
            Factorization::Llt => self.llt(ctx),
        }
    }

    /// Solve `self * x = rhs` after [`HMatrix::lu`]; `rhs` is overwritten
    /// with the solution.
    pub fn solve_lu<K: DenseKernel<T>>(
        &self,
        rhs: &mut ScalarArray<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        self.check_rhs(rhs)?;
        let mut v = rhs.view_mut();
        self.solve_triangular_left_dense(Uplo::Lower, Trans::No, true, &mut v, ctx)?;
        self.solve_triangular_left_dense(Uplo::Upper, Trans::No, false, &mut v, ctx)
    }

    /// Solve after [`HMatrix::ldlt`].
    pub fn solve_ldlt<K: DenseKernel<T>>(
        &self,
        rhs: &mut ScalarArray<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        self.check_rhs(rhs)?;
        {
            let mut v = rhs.view_mut();
            self.solve_triangular_left_dense(Uplo::Lower, Trans::No, true, &mut v, ctx)?;
        }
        let mut d = Vec::with_capacity(self.rows_count());
        self.extract_diagonal(&mut d);
        for i in 0..rhs.rows() {
            let inv = d[i].inv();
            for j in 0..rhs.cols() {
                let v = rhs.get(i, j) * inv;
                rhs.set(i, j, v);
            }
        }
        let mut v = rhs.view_mut();
        self.solve_triangular_left_dense(Uplo::Lower, Trans::Trans, true, &mut v, ctx)
    }

    /// Solve after [`HMatrix::llt`].
    pub fn solve_llt<K: DenseKernel<T>>(
        &self,
        rhs: &mut ScalarArray<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        self.check_rhs(rhs)?;
        let mut v = rhs.view_mut();
        self.solve_triangular_left_dense(Uplo::Lower, Trans::No, false, &mut v, ctx)?;
        self.solve_triangular_left_dense(Uplo::Lower, Trans::ConjTrans, false, &mut v, ctx)
    }

    /// Solve with whichever factorization was applied.
    pub fn solve_factored<K: DenseKernel<T>>(
        &self,
        factorization: Factorization,
        rhs: &mut ScalarArray<T>,
        ctx: &Context<'_, K>,
    ) -> Result<()> {
        match factorization {
            Factorization::Lu => self.solve_lu(rhs, ctx),
            Factorization::Ldlt => self.solve_ldlt(rhs, ctx),
            Factorization::Llt => self.solve_llt(rhs, ctx),
        }
    }

    fn check_rhs(&self, rhs: &ScalarArray<T>) -> Result<()> {
        if rhs.rows() != self.rows_count() {
            return Err(HmatError::InvalidShape {
                expected: (self.rows_count(), rhs.cols()),
                got: (rhs.rows(), rhs.cols()),
            });
        }
        Ok(())
    }
}
