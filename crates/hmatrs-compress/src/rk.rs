//! Low-rank factor pairs.
//!
//! An [`RkMatrix`] stores `a` (`m x k`) and `b` (`n x k`) and represents the
//! `m x n` matrix `a * b^H`. Rank 0 is the zero block. After
//! [`RkMatrix::truncate`] the singular values are absorbed entirely into the
//! `a` panel, so the columns of `b` are orthonormal.

use hmatrs_core::{ArrayView, ArrayViewMut, DenseKernel, ScalarArray, Scalar, Trans};

use crate::error::Result;

/// A matrix stored as the product `a * b^H` with inner dimension `rank`.
#[derive(Debug, Clone, PartialEq)]
pub struct RkMatrix<T> {
    a: ScalarArray<T>,
    b: ScalarArray<T>,
}

/// Smallest singular-value index kept: `s[i] > eps * s[0]`.
fn truncated_rank(s: &[f64], eps: f64) -> usize {
    if s.is_empty() || s[0] == 0.0 {
        return 0;
    }
    let cut = eps * s[0];
    s.iter().take_while(|&&v| v > cut).count()
}

impl<T: Scalar> RkMatrix<T> {
    /// Zero block of the given shape (rank 0).
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self {
            a: ScalarArray::zeros(rows, 0),
            b: ScalarArray::zeros(cols, 0),
        }
    }

    /// Wrap existing panels; they must agree on the inner dimension.
    pub fn new(a: ScalarArray<T>, b: ScalarArray<T>) -> Self {
        assert_eq!(a.cols(), b.cols(), "factor panels disagree on rank");
        Self { a, b }
    }

    pub fn rows(&self) -> usize {
        self.a.rows()
    }

    pub fn cols(&self) -> usize {
        self.b.rows()
    }

    pub fn rank(&self) -> usize {
        self.a.cols()
    }

    pub fn a(&self) -> &ScalarArray<T> {
        &self.a
    }

    pub fn b(&self) -> &ScalarArray<T> {
        &self.b
    }

    pub fn a_mut(&mut self) -> &mut ScalarArray<T> {
        &mut self.a
    }

    pub fn b_mut(&mut self) -> &mut ScalarArray<T> {
        &mut self.b
    }

    /// Storage cost in scalars.
    pub fn compressed_size(&self) -> usize {
        (self.rows() + self.cols()) * self.rank()
    }

    /// Scale the represented matrix (applied to the `a` panel).
    pub fn scale(&mut self, alpha: T) {
        self.a.scale(alpha);
    }

    /// Drop to rank 0.
    pub fn clear(&mut self) {
        self.a.truncate_cols(0);
        self.b.truncate_cols(0);
    }

    /// Materialize as a dense tile.
    pub fn to_dense<K: DenseKernel<T>>(&self, kernel: &K) -> ScalarArray<T> {
        let mut out = ScalarArray::zeros(self.rows(), self.cols());
        if self.rank() > 0 {
            out.gemm(
                Trans::No,
                Trans::ConjTrans,
                T::one(),
                self.a.view(),
                self.b.view(),
                T::zero(),
                kernel,
            );
        }
        out
    }

    /// `out += alpha * a * b^H`.
    pub fn axpy_into<K: DenseKernel<T>>(
        &self,
        alpha: T,
        out: &mut ArrayViewMut<'_, T>,
        kernel: &K,
    ) {
        assert_eq!(out.rows(), self.rows());
        assert_eq!(out.cols(), self.cols());
        if self.rank() == 0 {
            return;
        }
        out.gemm(
            Trans::No,
            Trans::ConjTrans,
            alpha,
            self.a.view(),
            self.b.view(),
            T::one(),
            kernel,
        );
    }

    /// Squared Frobenius norm via the small Gram matrices of the panels.
    pub fn norm_sqr<K: DenseKernel<T>>(&self, kernel: &K) -> f64 {
        let k = self.rank();
        if k == 0 {
            return 0.0;
        }
        let mut ga = ScalarArray::zeros(k, k);
        ga.gemm(
            Trans::ConjTrans,
            Trans::No,
            T::one(),
            self.a.view(),
            self.a.view(),
            T::zero(),
            kernel,
        );
        let mut gb = ScalarArray::zeros(k, k);
        gb.gemm(
            Trans::ConjTrans,
            Trans::No,
            T::one(),
            self.b.view(),
            self.b.view(),
            T::zero(),
            kernel,
        );
        // tr(ga * gb), real for hermitian factors
        let mut tr = 0.0;
        for i in 0..k {
            for l in 0..k {
                tr += (ga.get(i, l) * gb.get(l, i)).real_part();
            }
        }
        tr.max(0.0)
    }

    /// New block representing `op(self)`.
    pub fn transposed(&self, trans: Trans) -> RkMatrix<T> {
        match trans {
            Trans::No => self.clone(),
            // (a b^H)^H = b a^H
            Trans::ConjTrans => RkMatrix {
                a: self.b.clone(),
                b: self.a.clone(),
            },
            // (a b^H)^T = conj(b) conj(a)^H
            Trans::Trans => {
                let mut a = self.b.clone();
                let mut b = self.a.clone();
                a.conjugate();
                b.conjugate();
                RkMatrix { a, b }
            }
        }
    }

    /// Restriction to a contiguous row range.
    pub fn row_block(&self, offset: usize, size: usize) -> RkMatrix<T> {
        RkMatrix {
            a: self.a.copy_rows(offset, size),
            b: self.b.clone(),
        }
    }

    /// Restriction to a contiguous column range.
    pub fn col_block(&self, offset: usize, size: usize) -> RkMatrix<T> {
        RkMatrix {
            a: self.a.clone(),
            b: self.b.copy_rows(offset, size),
        }
    }

    /// Restriction to a contiguous sub-block (both panels cut).
    pub fn sub_block(
        &self,
        row_off: usize,
        row_size: usize,
        col_off: usize,
        col_size: usize,
    ) -> RkMatrix<T> {
        RkMatrix {
            a: self.a.copy_rows(row_off, row_size),
            b: self.b.copy_rows(col_off, col_size),
        }
    }

    /// Embed into a larger zero block at the given offsets (panels are
    /// zero-padded). Used when merging low-rank siblings.
    pub fn embedded(&self, rows: usize, cols: usize, row_off: usize, col_off: usize) -> RkMatrix<T> {
        let k = self.rank();
        let mut a = ScalarArray::zeros(rows, k);
        let mut b = ScalarArray::zeros(cols, k);
        for l in 0..k {
            for i in 0..self.rows() {
                a.set(row_off + i, l, self.a.get(i, l));
            }
            for i in 0..self.cols() {
                b.set(col_off + i, l, self.b.get(i, l));
            }
        }
        RkMatrix { a, b }
    }

    /// Concatenate `alpha * other` onto this block (same shape); the rank
    /// becomes the sum. Callers normally recompress right after.
    pub fn append_scaled(&mut self, alpha: T, other: &RkMatrix<T>) {
        assert_eq!(self.rows(), other.rows());
        assert_eq!(self.cols(), other.cols());
        for l in 0..other.rank() {
            if alpha.is_one() {
                self.a.push_col(other.a.column(l));
            } else {
                let scaled: Vec<T> = other.a.column(l).iter().map(|&v| v * alpha).collect();
                self.a.push_col(&scaled);
            }
            self.b.push_col(other.b.column(l));
        }
    }

    /// Compress a dense tile by truncated SVD at relative accuracy `eps`.
    pub fn compress_dense<K: DenseKernel<T>>(
        tile: ArrayView<'_, T>,
        eps: f64,
        kernel: &K,
    ) -> Result<RkMatrix<T>> {
        let owned = tile.to_owned();
        let (u, s, vt) = owned.svd(kernel)?;
        let rank = truncated_rank(&s, eps);
        let mut rk = RkMatrix::zero(tile.rows(), tile.cols());
        rk.assemble_from_svd(&u, &s, &vt, rank);
        Ok(rk)
    }

    /// `a <- u * diag(s)` (first `rank` columns), `b <- vt^H`.
    fn assemble_from_svd(
        &mut self,
        u: &ScalarArray<T>,
        s: &[f64],
        vt: &ScalarArray<T>,
        rank: usize,
    ) {
        let m = self.rows();
        let n = self.cols();
        let mut a = ScalarArray::zeros(m, rank);
        let mut b = ScalarArray::zeros(n, rank);
        for l in 0..rank {
            let sigma = T::from_real(s[l]);
            for i in 0..m {
                a.set(i, l, u.get(i, l) * sigma);
            }
            for i in 0..n {
                b.set(i, l, vt.get(l, i).conj());
            }
        }
        self.a = a;
        self.b = b;
    }

    /// Recompress to relative accuracy `eps`: QR of both panels, SVD of the
    /// small core, reassembly with the singular values absorbed into `a`.
    pub fn truncate<K: DenseKernel<T>>(&mut self, eps: f64, kernel: &K) -> Result<()> {
        let k = self.rank();
        if k == 0 {
            return Ok(());
        }
        let (m, n) = (self.rows(), self.cols());
        if k >= m.min(n) {
            // rank no smaller than the block: go through a dense pass
            let dense = self.to_dense(kernel);
            *self = RkMatrix::compress_dense(dense.view(), eps, kernel)?;
            return Ok(());
        }
        let (qa, ra) = self.a.thin_qr(kernel)?;
        let (qb, rb) = self.b.thin_qr(kernel)?;
        // core = ra * rb^H, of shape (min(m,k) x min(n,k))
        let mut core = ScalarArray::zeros(ra.rows(), rb.rows());
        core.gemm(
            Trans::No,
            Trans::ConjTrans,
            T::one(),
            ra.view(),
            rb.view(),
            T::zero(),
            kernel,
        );
        let (u, s, vt) = core.svd(kernel)?;
        let rank = truncated_rank(&s, eps);
        // a <- qa * (u * diag(s)), b <- qb * vt^H, both cut to `rank`
        let mut us = ScalarArray::zeros(u.rows(), rank);
        for l in 0..rank {
            let sigma = T::from_real(s[l]);
            for i in 0..u.rows() {
                us.set(i, l, u.get(i, l) * sigma);
            }
        }
        let mut a = ScalarArray::zeros(m, rank);
        a.gemm(Trans::No, Trans::No, T::one(), qa.view(), us.view(), T::zero(), kernel);
        let vt_cut = vt.sub_view(0, rank, 0, vt.cols());
        let mut b = ScalarArray::zeros(n, rank);
        b.gemm(
            Trans::No,
            Trans::ConjTrans,
            T::one(),
            qb.view(),
            vt_cut,
            T::zero(),
            kernel,
        );
        self.a = a;
        self.b = b;
        Ok(())
    }

    /// Recompression through pivoted modified Gram-Schmidt on both panels.
    /// Cheaper than the QR route when the numerical rank is far below the
    /// stored rank.
    pub fn truncate_mgs<K: DenseKernel<T>>(&mut self, eps: f64, kernel: &K) -> Result<()> {
        let k = self.rank();
        if k == 0 {
            return Ok(());
        }
        let (m, n) = (self.rows(), self.cols());
        if k >= m.min(n) {
            let dense = self.to_dense(kernel);
            *self = RkMatrix::compress_dense(dense.view(), eps, kernel)?;
            return Ok(());
        }
        let mut qa = self.a.clone();
        let mgs_a = qa.modified_gram_schmidt(eps)?;
        let mut qb = self.b.clone();
        let mgs_b = qb.modified_gram_schmidt(eps)?;
        if mgs_a.rank == 0 || mgs_b.rank == 0 {
            self.clear();
            return Ok(());
        }
        // scatter the pivoted triangular factors back to storage order
        let ra = scatter_columns(&mgs_a.r, &mgs_a.perm);
        let rb = scatter_columns(&mgs_b.r, &mgs_b.perm);
        let mut core = ScalarArray::zeros(mgs_a.rank, mgs_b.rank);
        core.gemm(
            Trans::No,
            Trans::ConjTrans,
            T::one(),
            ra.view(),
            rb.view(),
            T::zero(),
            kernel,
        );
        let (u, s, vt) = core.svd(kernel)?;
        let rank = truncated_rank(&s, eps);
        let mut us = ScalarArray::zeros(u.rows(), rank);
        for l in 0..rank {
            let sigma = T::from_real(s[l]);
            for i in 0..u.rows() {
                us.set(i, l, u.get(i, l) * sigma);
            }
        }
        let qa_cut = qa.sub_view(0, m, 0, mgs_a.rank);
        let mut a = ScalarArray::zeros(m, rank);
        a.gemm(Trans::No, Trans::No, T::one(), qa_cut, us.view(), T::zero(), kernel);
        let qb_cut = qb.sub_view(0, n, 0, mgs_b.rank);
        let vt_cut = vt.sub_view(0, rank, 0, vt.cols());
        let mut b = ScalarArray::zeros(n, rank);
        b.gemm(
            Trans::No,
            Trans::ConjTrans,
            T::one(),
            qb_cut,
            vt_cut,
            T::zero(),
            kernel,
        );
        self.a = a;
        self.b = b;
        Ok(())
    }

    /// Product of two low-rank blocks: `alpha * op(x) * op(y)`. The small
    /// inner matrix is absorbed into the side with the smaller rank.
    pub fn multiply_rk_rk<K: DenseKernel<T>>(
        alpha: T,
        x: &RkMatrix<T>,
        transx: Trans,
        y: &RkMatrix<T>,
        transy: Trans,
        kernel: &K,
    ) -> RkMatrix<T> {
        let ox = x.transposed(transx);
        let oy = y.transposed(transy);
        assert_eq!(ox.cols(), oy.rows(), "inner dimensions differ");
        let (kx, ky) = (ox.rank(), oy.rank());
        if kx == 0 || ky == 0 {
            return RkMatrix::zero(ox.rows(), oy.cols());
        }
        // t = bx^H * ay, of shape kx x ky
        let mut t = ScalarArray::zeros(kx, ky);
        t.gemm(
            Trans::ConjTrans,
            Trans::No,
            T::one(),
            ox.b.view(),
            oy.a.view(),
            T::zero(),
            kernel,
        );
        if kx <= ky {
            // keep ax, fold alpha * t into the b side: b = by * (alpha t)^H
            let mut b = ScalarArray::zeros(oy.cols(), kx);
            b.gemm(
                Trans::No,
                Trans::ConjTrans,
                alpha.conj(),
                oy.b.view(),
                t.view(),
                T::zero(),
                kernel,
            );
            RkMatrix::new(ox.a.clone(), b)
        } else {
            let mut a = ScalarArray::zeros(ox.rows(), ky);
            a.gemm(
                Trans::No,
                Trans::No,
                alpha,
                ox.a.view(),
                t.view(),
                T::zero(),
                kernel,
            );
            RkMatrix::new(a, oy.b.clone())
        }
    }

    /// `alpha * op(x) * op(d)` with a dense right operand.
    pub fn multiply_rk_dense<K: DenseKernel<T>>(
        alpha: T,
        x: &RkMatrix<T>,
        transx: Trans,
        d: ArrayView<'_, T>,
        transd: Trans,
        kernel: &K,
    ) -> RkMatrix<T> {
        let ox = x.transposed(transx);
        let od = materialize(d, transd);
        assert_eq!(ox.cols(), od.rows(), "inner dimensions differ");
        let k = ox.rank();
        // (a b^H) d = a (d^H b)^H
        let mut b = ScalarArray::zeros(od.cols(), k);
        if k > 0 {
            b.gemm(
                Trans::ConjTrans,
                Trans::No,
                alpha.conj(),
                od.view(),
                ox.b.view(),
                T::zero(),
                kernel,
            );
        }
        RkMatrix::new(ox.a.clone(), b)
    }

    /// `alpha * op(d) * op(y)` with a dense left operand.
    pub fn multiply_dense_rk<K: DenseKernel<T>>(
        alpha: T,
        d: ArrayView<'_, T>,
        transd: Trans,
        y: &RkMatrix<T>,
        transy: Trans,
        kernel: &K,
    ) -> RkMatrix<T> {
        let od = materialize(d, transd);
        let oy = y.transposed(transy);
        assert_eq!(od.cols(), oy.rows(), "inner dimensions differ");
        let k = oy.rank();
        let mut a = ScalarArray::zeros(od.rows(), k);
        if k > 0 {
            a.gemm(
                Trans::No,
                Trans::No,
                alpha,
                od.view(),
                oy.a.view(),
                T::zero(),
                kernel,
            );
        }
        RkMatrix::new(a, oy.b.clone())
    }
}

/// Owned copy of `op(d)`.
fn materialize<T: Scalar>(d: ArrayView<'_, T>, trans: Trans) -> ScalarArray<T> {
    match trans {
        Trans::No => d.to_owned(),
        t => d.to_owned().transposed(t),
    }
}

/// Spread pivot-ordered triangular columns back to their original positions:
/// `out[:, perm[j]] = r[:, j]`.
fn scatter_columns<T: Scalar>(r: &ScalarArray<T>, perm: &[usize]) -> ScalarArray<T> {
    let mut out = ScalarArray::zeros(r.rows(), perm.len());
    for (j, &orig) in perm.iter().enumerate() {
        for i in 0..r.rows() {
            out.set(i, orig, r.get(i, j));
        }
    }
    out
}
