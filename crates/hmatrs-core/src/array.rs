//! Column-major dense tiles with an explicit leading dimension.
//!
//! [`ScalarArray`] owns its storage; [`ArrayView`] and [`ArrayViewMut`] are
//! borrowed rectangular windows into a tile, used for zero-copy sub-block
//! access when recursive algorithms partition a tile along cluster
//! boundaries. Element `(i, j)` lives at `data[i + j * lda]`.

use crate::error::Result;
use crate::kernel::{DenseKernel, Diag, Side, Trans, Uplo};
use crate::scalar::Scalar;

/// Owned column-major tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarArray<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
    lda: usize,
}

/// Borrowed read-only window into a tile.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    lda: usize,
}

/// Borrowed mutable window into a tile.
#[derive(Debug)]
pub struct ArrayViewMut<'a, T> {
    data: &'a mut [T],
    rows: usize,
    cols: usize,
    lda: usize,
}

/// Result of a pivoted modified Gram-Schmidt factorization.
///
/// The first `rank` columns of the input (overwritten in place) hold the
/// orthonormal basis `q`; `a[:, perm[j]] = q * r[:, j]` for the original
/// columns.
#[derive(Debug, Clone)]
pub struct MgsDecomposition<T> {
    /// `rank x n` triangular factor, in pivot order.
    pub r: ScalarArray<T>,
    /// Pivot order: `perm[j]` is the original index of the column reduced
    /// at step `j`.
    pub perm: Vec<usize>,
    /// Numerical rank at the requested precision.
    pub rank: usize,
}

impl<T: Scalar> ScalarArray<T> {
    /// Create a zero-filled tile with `lda == rows`.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::zero(); rows * cols],
            rows,
            cols,
            lda: rows.max(1),
        }
    }

    /// Create a tile from a generator called in column-major order.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut a = Self::zeros(rows, cols);
        for j in 0..cols {
            for i in 0..rows {
                a.data[i + j * a.lda] = f(i, j);
            }
        }
        a
    }

    /// Wrap an existing column-major buffer (`lda == rows`).
    pub fn from_column_major(data: Vec<T>, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "buffer does not match shape");
        Self {
            data,
            rows,
            cols,
            lda: rows.max(1),
        }
    }

    /// Identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut a = Self::zeros(n, n);
        for i in 0..n {
            a.data[i + i * a.lda] = T::one();
        }
        a
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn lda(&self) -> usize {
        self.lda
    }

    /// Raw storage slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Raw mutable storage slice.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.lda]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.lda] = v;
    }

    /// Contiguous storage of column `j`.
    pub fn column(&self, j: usize) -> &[T] {
        &self.data[j * self.lda..j * self.lda + self.rows]
    }

    /// Mutable storage of column `j`.
    pub fn column_mut(&mut self, j: usize) -> &mut [T] {
        let lda = self.lda;
        let rows = self.rows;
        &mut self.data[j * lda..j * lda + rows]
    }

    /// Append a column; requires `lda == rows` so storage stays contiguous.
    pub fn push_col(&mut self, col: &[T]) {
        assert_eq!(self.lda, self.rows.max(1), "push_col needs packed storage");
        assert_eq!(col.len(), self.rows);
        self.data.extend_from_slice(col);
        self.cols += 1;
    }

    /// Keep only the first `k` columns.
    pub fn truncate_cols(&mut self, k: usize) {
        assert!(k <= self.cols);
        self.cols = k;
        if self.lda == self.rows.max(1) {
            self.data.truncate(self.lda * k);
        }
    }

    pub fn view(&self) -> ArrayView<'_, T> {
        ArrayView {
            data: &self.data,
            rows: self.rows,
            cols: self.cols,
            lda: self.lda,
        }
    }

    pub fn view_mut(&mut self) -> ArrayViewMut<'_, T> {
        ArrayViewMut {
            data: &mut self.data,
            rows: self.rows,
            cols: self.cols,
            lda: self.lda,
        }
    }

    /// Read-only window of `rs x cs` elements at `(ro, co)`.
    pub fn sub_view(&self, ro: usize, rs: usize, co: usize, cs: usize) -> ArrayView<'_, T> {
        self.view().sub(ro, rs, co, cs)
    }

    /// Mutable window of `rs x cs` elements at `(ro, co)`.
    pub fn sub_view_mut(
        &mut self,
        ro: usize,
        rs: usize,
        co: usize,
        cs: usize,
    ) -> ArrayViewMut<'_, T> {
        self.view_mut().into_sub(ro, rs, co, cs)
    }

    /// Copy of the rows `range` as a packed tile.
    pub fn copy_rows(&self, ro: usize, rs: usize) -> ScalarArray<T> {
        self.sub_view(ro, rs, 0, self.cols).to_owned()
    }

    pub fn clear(&mut self) {
        for v in self.data.iter_mut() {
            *v = T::zero();
        }
    }

    pub fn scale(&mut self, alpha: T) {
        self.view_mut().scale(alpha);
    }

    /// `self += alpha * a` (same shape).
    pub fn axpy(&mut self, alpha: T, a: &ScalarArray<T>) {
        self.view_mut().axpy(alpha, a.view());
    }

    /// Squared Frobenius norm.
    pub fn norm_sqr(&self) -> f64 {
        self.view().norm_sqr()
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        self.norm_sqr().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.data[..self.storage_len()]
            .iter()
            .all(|v| v.is_zero())
    }

    /// True if any stored element is NaN.
    pub fn has_nan(&self) -> bool {
        (0..self.cols).any(|j| self.column_slice(j).iter().any(|v| v.is_nan()))
    }

    fn storage_len(&self) -> usize {
        if self.rows == 0 || self.cols == 0 {
            0
        } else {
            (self.cols - 1) * self.lda + self.rows
        }
    }

    fn column_slice(&self, j: usize) -> &[T] {
        &self.data[j * self.lda..j * self.lda + self.rows]
    }

    /// New tile holding `op(self)`.
    pub fn transposed(&self, trans: Trans) -> ScalarArray<T> {
        match trans {
            Trans::No => self.clone(),
            _ => {
                let mut out = ScalarArray::zeros(self.cols, self.rows);
                for j in 0..self.cols {
                    for i in 0..self.rows {
                        let v = self.get(i, j);
                        let v = if trans == Trans::ConjTrans { v.conj() } else { v };
                        out.set(j, i, v);
                    }
                }
                out
            }
        }
    }

    /// Conjugate every element in place (no-op for real scalars).
    pub fn conjugate(&mut self) {
        if T::is_complex() {
            for j in 0..self.cols {
                let lda = self.lda;
                let rows = self.rows;
                for v in self.data[j * lda..j * lda + rows].iter_mut() {
                    *v = v.conj();
                }
            }
        }
    }

    /// `self = beta * self + alpha * op(a) * op(b)`.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm<K: DenseKernel<T>>(
        &mut self,
        transa: Trans,
        transb: Trans,
        alpha: T,
        a: ArrayView<'_, T>,
        b: ArrayView<'_, T>,
        beta: T,
        kernel: &K,
    ) {
        self.view_mut().gemm(transa, transb, alpha, a, b, beta, kernel);
    }

    /// `y = alpha * op(self) * x + beta * y`.
    #[allow(clippy::too_many_arguments)]
    pub fn gemv<K: DenseKernel<T>>(
        &self,
        trans: Trans,
        alpha: T,
        x: &[T],
        beta: T,
        y: &mut [T],
        kernel: &K,
    ) {
        kernel.gemv(trans, self.rows, self.cols, alpha, &self.data, self.lda, x, beta, y);
    }

    /// `self += alpha * x * y^T` (`y` conjugated when `conjugate_y`).
    pub fn rank_one_update<K: DenseKernel<T>>(
        &mut self,
        alpha: T,
        x: &[T],
        y: &[T],
        conjugate_y: bool,
        kernel: &K,
    ) {
        assert_eq!(x.len(), self.rows);
        assert_eq!(y.len(), self.cols);
        kernel.ger(
            self.rows,
            self.cols,
            alpha,
            x,
            y,
            conjugate_y,
            &mut self.data,
            self.lda,
        );
    }

    /// In-place LU with partial pivoting; returns the pivot vector.
    pub fn lu_in_place<K: DenseKernel<T>>(&mut self, kernel: &K) -> Result<Vec<usize>> {
        assert_eq!(self.rows, self.cols, "lu needs a square tile");
        let mut ipiv = vec![0usize; self.rows];
        let (rows, cols, lda) = (self.rows, self.cols, self.lda);
        kernel.getrf(rows, cols, &mut self.data, lda, &mut ipiv)?;
        Ok(ipiv)
    }

    /// In-place inverse.
    pub fn invert_in_place<K: DenseKernel<T>>(&mut self, kernel: &K) -> Result<()> {
        assert_eq!(self.rows, self.cols);
        let (n, lda) = (self.rows, self.lda);
        kernel.getri(n, &mut self.data, lda)
    }

    /// In-place lower Cholesky.
    pub fn cholesky_in_place<K: DenseKernel<T>>(&mut self, kernel: &K) -> Result<()> {
        assert_eq!(self.rows, self.cols);
        let (n, lda) = (self.rows, self.lda);
        kernel.potrf(n, &mut self.data, lda)
    }

    /// In-place LDL^T (unit lower factor, diagonal stored on the diagonal).
    pub fn ldlt_in_place<K: DenseKernel<T>>(&mut self, kernel: &K) -> Result<()> {
        assert_eq!(self.rows, self.cols);
        let (n, lda) = (self.rows, self.lda);
        kernel.ldlt_nopiv(n, &mut self.data, lda)
    }

    /// Full SVD of a copy of `self`: `(u, s, vt)` with `u` of shape
    /// `m x min(m,n)` and `vt` of shape `min(m,n) x n`.
    pub fn svd<K: DenseKernel<T>>(
        &self,
        kernel: &K,
    ) -> Result<(ScalarArray<T>, Vec<f64>, ScalarArray<T>)> {
        let (m, n) = (self.rows, self.cols);
        let k = m.min(n);
        let mut work = self.view().to_owned();
        let mut u = ScalarArray::zeros(m, k);
        let mut s = vec![0.0; k];
        let mut vt = ScalarArray::zeros(k, n);
        let (wlda, ulda, vtlda) = (work.lda, u.lda, vt.lda);
        kernel.gesvd(
            m,
            n,
            &mut work.data,
            wlda,
            &mut u.data,
            ulda,
            &mut s,
            &mut vt.data,
            vtlda,
        )?;
        Ok((u, s, vt))
    }

    /// Thin QR of a copy of `self`: `q` is `m x min(m,n)` with orthonormal
    /// columns, `r` is `min(m,n) x n` upper-trapezoidal.
    pub fn thin_qr<K: DenseKernel<T>>(&self, kernel: &K) -> Result<(ScalarArray<T>, ScalarArray<T>)> {
        let (m, n) = (self.rows, self.cols);
        let k = m.min(n);
        let mut work = self.view().to_owned();
        let mut tau = vec![T::zero(); k];
        let wlda = work.lda;
        kernel.geqrf(m, n, &mut work.data, wlda, &mut tau)?;
        let mut r = ScalarArray::zeros(k, n);
        for j in 0..n {
            for i in 0..k.min(j + 1) {
                r.set(i, j, work.get(i, j));
            }
        }
        let mut q = ScalarArray::zeros(m, k);
        for j in 0..k {
            q.set(j, j, T::one());
        }
        let qlda = q.lda;
        kernel.ormqr(Trans::No, m, k, k, &work.data, wlda, &tau, &mut q.data, qlda)?;
        Ok((q, r))
    }

    /// Modified Gram-Schmidt with column pivoting.
    ///
    /// Overwrites the leading `rank` columns of `self` with an orthonormal
    /// basis of its column span. The stopping rule compares remaining column
    /// norms against `prec` times the largest initial norm; `prec` is
    /// clamped to at least `1e-6`.
    pub fn modified_gram_schmidt(&mut self, prec: f64) -> Result<MgsDecomposition<T>> {
        let prec = prec.max(1e-6);
        let (m, n) = (self.rows, self.cols);
        let kmax = m.min(n);
        let mut r = ScalarArray::zeros(kmax, n);
        let mut perm: Vec<usize> = (0..n).collect();
        let mut norms_sq: Vec<f64> = (0..n).map(|j| col_norm_sq(self, j)).collect();
        let max_initial = norms_sq.iter().cloned().fold(0.0, f64::max);
        let threshold = prec * prec * max_initial;
        let mut rank = 0;
        for j in 0..kmax {
            // pivot: remaining column of largest norm
            let (p, &best) = norms_sq[j..]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, v)| (i + j, v))
                .unwrap();
            if best <= threshold || best == 0.0 {
                break;
            }
            if p != j {
                self.swap_cols(j, p);
                norms_sq.swap(j, p);
                perm.swap(j, p);
                r.swap_cols(j, p);
            }
            let norm = col_norm_sq(self, j).sqrt();
            if norm == 0.0 {
                break;
            }
            let inv = T::from_real(1.0 / norm);
            for v in self.column_mut(j).iter_mut() {
                *v *= inv;
            }
            r.set(j, j, T::from_real(norm));
            for l in (j + 1)..n {
                let mut proj = T::zero();
                for i in 0..m {
                    proj += self.get(i, j).conj() * self.get(i, l);
                }
                r.set(j, l, proj);
                for i in 0..m {
                    let qij = self.get(i, j);
                    let v = self.get(i, l) - proj * qij;
                    self.set(i, l, v);
                }
                norms_sq[l] = (norms_sq[l] - proj.abs_sq()).max(0.0);
            }
            rank = j + 1;
        }
        // report r with only the computed rows
        let mut r_out = ScalarArray::zeros(rank, n);
        for j in 0..n {
            for i in 0..rank {
                r_out.set(i, j, r.get(i, j));
            }
        }
        Ok(MgsDecomposition {
            r: r_out,
            perm,
            rank,
        })
    }

    fn swap_cols(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for i in 0..self.rows {
            let va = self.get(i, a);
            let vb = self.get(i, b);
            self.set(i, a, vb);
            self.set(i, b, va);
        }
    }
}

fn col_norm_sq<T: Scalar>(a: &ScalarArray<T>, j: usize) -> f64 {
    a.column(j).iter().map(|v| v.abs_sq()).sum()
}

impl<'a, T: Scalar> ArrayView<'a, T> {
    /// Build a view over a raw column-major slice.
    pub fn from_raw(data: &'a [T], rows: usize, cols: usize, lda: usize) -> Self {
        debug_assert!(lda >= rows.max(1));
        Self {
            data,
            rows,
            cols,
            lda,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn lda(&self) -> usize {
        self.lda
    }

    pub fn data(&self) -> &[T] {
        self.data
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.lda]
    }

    /// Sub-window of this view.
    pub fn sub(&self, ro: usize, rs: usize, co: usize, cs: usize) -> ArrayView<'a, T> {
        debug_assert!(ro + rs <= self.rows && co + cs <= self.cols);
        let start = ro + co * self.lda;
        let end = if rs == 0 || cs == 0 {
            start
        } else {
            start + (cs - 1) * self.lda + rs
        };
        ArrayView {
            data: &self.data[start.min(self.data.len())..end],
            rows: rs,
            cols: cs,
            lda: self.lda,
        }
    }

    /// Copy into a packed owned tile.
    pub fn to_owned(&self) -> ScalarArray<T> {
        let mut out = ScalarArray::zeros(self.rows, self.cols);
        for j in 0..self.cols {
            for i in 0..self.rows {
                out.set(i, j, self.get(i, j));
            }
        }
        out
    }

    pub fn norm_sqr(&self) -> f64 {
        let mut s = 0.0;
        for j in 0..self.cols {
            for i in 0..self.rows {
                s += self.get(i, j).abs_sq();
            }
        }
        s
    }
}

impl<'a, T: Scalar> ArrayViewMut<'a, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn lda(&self) -> usize {
        self.lda
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.lda]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i + j * self.lda] = v;
    }

    /// Reborrow as read-only.
    pub fn as_view(&self) -> ArrayView<'_, T> {
        ArrayView {
            data: self.data,
            rows: self.rows,
            cols: self.cols,
            lda: self.lda,
        }
    }

    /// Reborrowed mutable sub-window.
    pub fn sub_mut(&mut self, ro: usize, rs: usize, co: usize, cs: usize) -> ArrayViewMut<'_, T> {
        debug_assert!(ro + rs <= self.rows && co + cs <= self.cols);
        let start = ro + co * self.lda;
        let end = if rs == 0 || cs == 0 {
            start
        } else {
            start + (cs - 1) * self.lda + rs
        };
        let len = self.data.len();
        ArrayViewMut {
            data: &mut self.data[start.min(len)..end],
            rows: rs,
            cols: cs,
            lda: self.lda,
        }
    }

    /// Consuming sub-window (keeps the original lifetime).
    pub fn into_sub(self, ro: usize, rs: usize, co: usize, cs: usize) -> ArrayViewMut<'a, T> {
        debug_assert!(ro + rs <= self.rows && co + cs <= self.cols);
        let start = ro + co * self.lda;
        let end = if rs == 0 || cs == 0 {
            start
        } else {
            start + (cs - 1) * self.lda + rs
        };
        let len = self.data.len();
        ArrayViewMut {
            data: &mut self.data[start.min(len)..end],
            rows: rs,
            cols: cs,
            lda: self.lda,
        }
    }

    pub fn clear(&mut self) {
        for j in 0..self.cols {
            for i in 0..self.rows {
                self.set(i, j, T::zero());
            }
        }
    }

    pub fn scale(&mut self, alpha: T) {
        if alpha.is_one() {
            return;
        }
        for j in 0..self.cols {
            for i in 0..self.rows {
                let v = self.get(i, j) * alpha;
                self.set(i, j, v);
            }
        }
    }

    /// `self += alpha * a`.
    pub fn axpy(&mut self, alpha: T, a: ArrayView<'_, T>) {
        assert_eq!(self.rows, a.rows());
        assert_eq!(self.cols, a.cols());
        for j in 0..self.cols {
            for i in 0..self.rows {
                let v = self.get(i, j) + alpha * a.get(i, j);
                self.set(i, j, v);
            }
        }
    }

    /// Overwrite with the contents of `a`.
    pub fn copy_from(&mut self, a: ArrayView<'_, T>) {
        assert_eq!(self.rows, a.rows());
        assert_eq!(self.cols, a.cols());
        for j in 0..self.cols {
            for i in 0..self.rows {
                self.set(i, j, a.get(i, j));
            }
        }
    }

    /// `self = beta * self + alpha * op(a) * op(b)`.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm<K: DenseKernel<T>>(
        &mut self,
        transa: Trans,
        transb: Trans,
        alpha: T,
        a: ArrayView<'_, T>,
        b: ArrayView<'_, T>,
        beta: T,
        kernel: &K,
    ) {
        let (am, ak) = op_shape(a.rows(), a.cols(), transa);
        let (bk, bn) = op_shape(b.rows(), b.cols(), transb);
        assert_eq!(ak, bk, "gemm inner dimensions differ");
        assert_eq!(self.rows, am, "gemm row count differs");
        assert_eq!(self.cols, bn, "gemm column count differs");
        kernel.gemm(
            transa,
            transb,
            am,
            bn,
            ak,
            alpha,
            a.data(),
            a.lda(),
            b.data(),
            b.lda(),
            beta,
            self.data,
            self.lda,
        );
    }

    /// Triangular solve against the tile `a`; `self` is the right-hand side,
    /// overwritten with the solution.
    #[allow(clippy::too_many_arguments)]
    pub fn trsm<K: DenseKernel<T>>(
        &mut self,
        side: Side,
        uplo: Uplo,
        trans: Trans,
        diag: Diag,
        a: ArrayView<'_, T>,
        kernel: &K,
    ) {
        let dim = match side {
            Side::Left => self.rows,
            Side::Right => self.cols,
        };
        assert_eq!(a.rows(), dim);
        assert_eq!(a.cols(), dim);
        kernel.trsm(
            side,
            uplo,
            trans,
            diag,
            self.rows,
            self.cols,
            T::one(),
            a.data(),
            a.lda(),
            self.data,
            self.lda,
        );
    }

    /// Apply LU row interchanges to the right-hand side rows.
    pub fn laswp<K: DenseKernel<T>>(&mut self, ipiv: &[usize], forward: bool, kernel: &K) {
        kernel.laswp(self.cols, self.data, self.lda, ipiv, forward);
    }
}

fn op_shape(rows: usize, cols: usize, trans: Trans) -> (usize, usize) {
    if trans.is_transposed() {
        (cols, rows)
    } else {
        (rows, cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::NativeKernel;

    #[test]
    fn test_indexing_and_views() {
        let a = ScalarArray::from_fn(4, 3, |i, j| (i * 10 + j) as f64);
        assert_eq!(a.get(2, 1), 21.0);
        let v = a.sub_view(1, 2, 1, 2);
        assert_eq!(v.rows(), 2);
        assert_eq!(v.cols(), 2);
        assert_eq!(v.get(0, 0), 11.0);
        assert_eq!(v.get(1, 1), 22.0);
        let owned = v.to_owned();
        assert_eq!(owned.get(1, 0), 21.0);
        assert_eq!(owned.lda(), 2);
    }

    #[test]
    fn test_push_and_truncate_cols() {
        let mut a = ScalarArray::<f64>::zeros(3, 0);
        a.push_col(&[1.0, 2.0, 3.0]);
        a.push_col(&[4.0, 5.0, 6.0]);
        assert_eq!(a.cols(), 2);
        assert_eq!(a.get(1, 1), 5.0);
        a.truncate_cols(1);
        assert_eq!(a.cols(), 1);
        assert_eq!(a.get(2, 0), 3.0);
    }

    #[test]
    fn test_norm_and_axpy() {
        let a = ScalarArray::from_fn(2, 2, |i, j| if i == j { 3.0 } else { 4.0 });
        assert!((a.norm() - 50.0_f64.sqrt()).abs() < 1e-14);
        let mut b = ScalarArray::zeros(2, 2);
        b.axpy(2.0, &a);
        assert_eq!(b.get(0, 1), 8.0);
    }

    #[test]
    fn test_gemm_via_views() {
        let k = NativeKernel;
        let a = ScalarArray::from_fn(2, 3, |i, j| (i + j) as f64);
        let b = ScalarArray::from_fn(3, 2, |i, j| (i as f64) - (j as f64));
        let mut c = ScalarArray::zeros(2, 2);
        c.gemm(Trans::No, Trans::No, 1.0, a.view(), b.view(), 0.0, &k);
        // row 0 of a = [0,1,2], col 0 of b = [0,1,2] -> 5
        assert_eq!(c.get(0, 0), 5.0);
    }

    #[test]
    fn test_thin_qr_shapes() {
        let k = NativeKernel;
        let a = ScalarArray::from_fn(5, 2, |i, j| ((i * 3 + j * 7) % 5) as f64 + 1.0);
        let (q, r) = a.thin_qr(&k).unwrap();
        assert_eq!(q.rows(), 5);
        assert_eq!(q.cols(), 2);
        assert_eq!(r.rows(), 2);
        assert_eq!(r.cols(), 2);
        // q * r == a
        let mut rec = ScalarArray::zeros(5, 2);
        rec.gemm(Trans::No, Trans::No, 1.0, q.view(), r.view(), 0.0, &k);
        for j in 0..2 {
            for i in 0..5 {
                assert!((rec.get(i, j) - a.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_mgs_orthonormality() {
        let a0 = ScalarArray::from_fn(6, 4, |i, j| ((i * 5 + j * 3) % 7) as f64 - 3.0);
        let mut a = a0.clone();
        let mgs = a.modified_gram_schmidt(1e-6).unwrap();
        assert!(mgs.rank > 0);
        // q^T q = identity
        for c1 in 0..mgs.rank {
            for c2 in 0..mgs.rank {
                let mut dot = 0.0;
                for i in 0..6 {
                    dot += a.get(i, c1) * a.get(i, c2);
                }
                let expect = if c1 == c2 { 1.0 } else { 0.0 };
                assert!((dot - expect).abs() < 1e-12, "q not orthonormal");
            }
        }
        // a0[:, perm[j]] == q * r[:, j]
        for j in 0..4 {
            for i in 0..6 {
                let mut v = 0.0;
                for l in 0..mgs.rank {
                    v += a.get(i, l) * mgs.r.get(l, j);
                }
                assert!((v - a0.get(i, mgs.perm[j])).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_mgs_rank_deficient() {
        // two independent columns, third is their sum
        let mut a = ScalarArray::zeros(4, 3);
        for i in 0..4 {
            a.set(i, 0, 1.0 + i as f64);
            a.set(i, 1, (i as f64).sin());
            a.set(i, 2, 1.0 + i as f64 + (i as f64).sin());
        }
        let mgs = a.modified_gram_schmidt(1e-6).unwrap();
        assert_eq!(mgs.rank, 2);
    }

    #[test]
    fn test_lu_solve_tile() {
        let k = NativeKernel;
        let a0 = ScalarArray::from_fn(3, 3, |i, j| {
            if i == j {
                4.0
            } else {
                1.0 / (1.0 + (i as f64 - j as f64).abs())
            }
        });
        let mut lu = a0.clone();
        let ipiv = lu.lu_in_place(&k).unwrap();
        let mut b = ScalarArray::from_fn(3, 1, |i, _| i as f64 + 1.0);
        let expect = b.clone();
        // solve a x = b then check a * x == b
        {
            let mut bv = b.view_mut();
            bv.laswp(&ipiv, true, &k);
            bv.trsm(Side::Left, Uplo::Lower, Trans::No, Diag::Unit, lu.view(), &k);
            bv.trsm(
                Side::Left,
                Uplo::Upper,
                Trans::No,
                Diag::NonUnit,
                lu.view(),
                &k,
            );
        }
        let mut rec = ScalarArray::zeros(3, 1);
        rec.gemm(Trans::No, Trans::No, 1.0, a0.view(), b.view(), 0.0, &k);
        for i in 0..3 {
            assert!((rec.get(i, 0) - expect.get(i, 0)).abs() < 1e-12);
        }
    }
}
