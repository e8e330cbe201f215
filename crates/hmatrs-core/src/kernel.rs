//! Dense-kernel provider: the BLAS/LAPACK-shaped routines consumed at dense
//! leaves.
//!
//! The engine never assumes a specific library: every factorization and solve
//! is generic over a [`DenseKernel`] value. [`NativeKernel`] is the portable
//! pure-Rust provider. All routines work on flat column-major storage with an
//! explicit leading dimension, `a[i + j * lda]`.

use crate::error::{CoreError, Result};
use crate::scalar::Scalar;

/// Transposition of an operand, as in BLAS `trans` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    /// 'N'
    No,
    /// 'T'
    Trans,
    /// 'C'
    ConjTrans,
}

impl Trans {
    /// True unless `No`.
    pub fn is_transposed(self) -> bool {
        !matches!(self, Trans::No)
    }
}

/// Operand side, as in BLAS `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Stored triangle, as in BLAS `uplo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

/// Unit or non-unit diagonal, as in BLAS `diag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    Unit,
    NonUnit,
}

/// The dense routines the engine requires, for one scalar type.
///
/// Shapes follow LAPACK conventions; `m`, `n`, `k` are the dimensions of the
/// *operation*, not of the stored arrays. Nonzero info conditions surface as
/// [`CoreError`] values rather than being folded into results.
pub trait DenseKernel<T: Scalar>: Send + Sync {
    /// `c = alpha * op(a) * op(b) + beta * c` where `op(a)` is `m x k` and
    /// `op(b)` is `k x n`.
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        transa: Trans,
        transb: Trans,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &[T],
        ldb: usize,
        beta: T,
        c: &mut [T],
        ldc: usize,
    );

    /// `y = alpha * op(a) * x + beta * y` with `a` stored `m x n`.
    #[allow(clippy::too_many_arguments)]
    fn gemv(
        &self,
        trans: Trans,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        x: &[T],
        beta: T,
        y: &mut [T],
    );

    /// Rank-1 update `a += alpha * x * y^T` (`y` conjugated when
    /// `conjugate_y` is set), `a` stored `m x n`.
    #[allow(clippy::too_many_arguments)]
    fn ger(
        &self,
        m: usize,
        n: usize,
        alpha: T,
        x: &[T],
        y: &[T],
        conjugate_y: bool,
        a: &mut [T],
        lda: usize,
    );

    /// Triangular solve. `Side::Left` solves `op(a) * x = alpha * b`,
    /// `Side::Right` solves `x * op(a) = alpha * b`; `b` (`m x n`) is
    /// overwritten with the solution.
    #[allow(clippy::too_many_arguments)]
    fn trsm(
        &self,
        side: Side,
        uplo: Uplo,
        trans: Trans,
        diag: Diag,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &mut [T],
        ldb: usize,
    );

    /// LU factorization with partial pivoting, `p * a = l * u`. On exit `a`
    /// holds the unit-lower and upper factors; `ipiv[k]` is the row swapped
    /// with row `k`.
    fn getrf(&self, m: usize, n: usize, a: &mut [T], lda: usize, ipiv: &mut [usize]) -> Result<()>;

    /// Apply the row interchanges recorded by [`DenseKernel::getrf`] to the
    /// `n` columns of `a`.
    fn laswp(&self, n: usize, a: &mut [T], lda: usize, ipiv: &[usize], forward: bool);

    /// Solve `op(a) * x = b` with `a` factored by [`DenseKernel::getrf`];
    /// `b` (`n x nrhs`) is overwritten.
    #[allow(clippy::too_many_arguments)]
    fn getrs(
        &self,
        trans: Trans,
        n: usize,
        nrhs: usize,
        a: &[T],
        lda: usize,
        ipiv: &[usize],
        b: &mut [T],
        ldb: usize,
    ) -> Result<()>;

    /// Cholesky factorization of a Hermitian positive-definite matrix,
    /// lower triangle: `a = l * l^H`.
    fn potrf(&self, n: usize, a: &mut [T], lda: usize) -> Result<()>;

    /// LDL^T factorization (plain transpose, no pivoting) of a symmetric
    /// matrix, lower triangle. On exit the strict lower triangle holds the
    /// unit-lower factor and the diagonal holds `d`.
    fn ldlt_nopiv(&self, n: usize, a: &mut [T], lda: usize) -> Result<()>;

    /// Householder QR. On exit the upper triangle of `a` holds `r` and the
    /// columns below the diagonal the reflectors; `tau` has `min(m, n)`
    /// entries.
    fn geqrf(&self, m: usize, n: usize, a: &mut [T], lda: usize, tau: &mut [T]) -> Result<()>;

    /// Apply `q` (or `q^H`) from a [`DenseKernel::geqrf`] factorization to
    /// `c` (`m x n`) from the left. `k` is the number of reflectors.
    #[allow(clippy::too_many_arguments)]
    fn ormqr(
        &self,
        trans: Trans,
        m: usize,
        n: usize,
        k: usize,
        a: &[T],
        lda: usize,
        tau: &[T],
        c: &mut [T],
        ldc: usize,
    ) -> Result<()>;

    /// Singular value decomposition `a = u * diag(s) * vt`. `a` (`m x n`) is
    /// destroyed; `u` is `m x min(m,n)`, `vt` is `min(m,n) x n`, `s` is
    /// sorted non-increasing.
    #[allow(clippy::too_many_arguments)]
    fn gesvd(
        &self,
        m: usize,
        n: usize,
        a: &mut [T],
        lda: usize,
        u: &mut [T],
        ldu: usize,
        s: &mut [f64],
        vt: &mut [T],
        ldvt: usize,
    ) -> Result<()>;

    /// In-place inverse of a general square matrix.
    fn getri(&self, n: usize, a: &mut [T], lda: usize) -> Result<()>;
}

/// Portable pure-Rust implementation of [`DenseKernel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKernel;

#[inline]
fn opv<T: Scalar>(v: T, trans: Trans) -> T {
    match trans {
        Trans::ConjTrans => v.conj(),
        _ => v,
    }
}

#[inline]
fn at<T: Scalar>(a: &[T], lda: usize, i: usize, j: usize, trans: Trans) -> T {
    match trans {
        Trans::No => a[i + j * lda],
        Trans::Trans => a[j + i * lda],
        Trans::ConjTrans => a[j + i * lda].conj(),
    }
}

fn sign(x: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Maximum number of Jacobi sweeps before giving up.
const MAX_JACOBI_SWEEPS: usize = 60;

impl<T: Scalar> DenseKernel<T> for NativeKernel {
    fn gemm(
        &self,
        transa: Trans,
        transb: Trans,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &[T],
        ldb: usize,
        beta: T,
        c: &mut [T],
        ldc: usize,
    ) {
        for j in 0..n {
            if beta.is_zero() {
                for i in 0..m {
                    c[i + j * ldc] = T::zero();
                }
            } else if !beta.is_one() {
                for i in 0..m {
                    c[i + j * ldc] *= beta;
                }
            }
            for l in 0..k {
                let blj = alpha * at(b, ldb, l, j, transb);
                if blj.is_zero() {
                    continue;
                }
                match transa {
                    // stride-1 inner loop over a column of `a`
                    Trans::No => {
                        for i in 0..m {
                            c[i + j * ldc] += a[i + l * lda] * blj;
                        }
                    }
                    _ => {
                        for i in 0..m {
                            c[i + j * ldc] += at(a, lda, i, l, transa) * blj;
                        }
                    }
                }
            }
        }
    }

    fn gemv(
        &self,
        trans: Trans,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        x: &[T],
        beta: T,
        y: &mut [T],
    ) {
        let (ylen, xlen) = if trans.is_transposed() { (n, m) } else { (m, n) };
        debug_assert!(x.len() >= xlen && y.len() >= ylen);
        for yi in y.iter_mut().take(ylen) {
            *yi = if beta.is_zero() { T::zero() } else { *yi * beta };
        }
        match trans {
            Trans::No => {
                for j in 0..n {
                    let xj = alpha * x[j];
                    for i in 0..m {
                        y[i] += a[i + j * lda] * xj;
                    }
                }
            }
            _ => {
                for j in 0..n {
                    let mut s = T::zero();
                    for i in 0..m {
                        s += opv(a[i + j * lda], trans) * x[i];
                    }
                    y[j] += alpha * s;
                }
            }
        }
    }

    fn ger(
        &self,
        m: usize,
        n: usize,
        alpha: T,
        x: &[T],
        y: &[T],
        conjugate_y: bool,
        a: &mut [T],
        lda: usize,
    ) {
        for j in 0..n {
            let yj = if conjugate_y { y[j].conj() } else { y[j] };
            let s = alpha * yj;
            if s.is_zero() {
                continue;
            }
            for i in 0..m {
                a[i + j * lda] += x[i] * s;
            }
        }
    }

    fn trsm(
        &self,
        side: Side,
        uplo: Uplo,
        trans: Trans,
        diag: Diag,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &mut [T],
        ldb: usize,
    ) {
        if !alpha.is_one() {
            for j in 0..n {
                for i in 0..m {
                    b[i + j * ldb] *= alpha;
                }
            }
        }
        let unit = diag == Diag::Unit;
        // `op(a)` is lower-triangular iff the stored triangle and the
        // transposition flag disagree about orientation.
        let effective_lower = (uplo == Uplo::Lower) == (trans == Trans::No);
        match side {
            Side::Left => {
                // op(a) (m x m) applied to each column of b
                for jc in 0..n {
                    let col = jc * ldb;
                    if effective_lower {
                        for i in 0..m {
                            let mut s = b[col + i];
                            for l in 0..i {
                                s -= at(a, lda, i, l, trans) * b[col + l];
                            }
                            if !unit {
                                s /= at(a, lda, i, i, trans);
                            }
                            b[col + i] = s;
                        }
                    } else {
                        for i in (0..m).rev() {
                            let mut s = b[col + i];
                            for l in (i + 1)..m {
                                s -= at(a, lda, i, l, trans) * b[col + l];
                            }
                            if !unit {
                                s /= at(a, lda, i, i, trans);
                            }
                            b[col + i] = s;
                        }
                    }
                }
            }
            Side::Right => {
                // x * op(a) = b, op(a) is n x n; column j of x depends on
                // earlier (upper) or later (lower) solution columns
                if effective_lower {
                    for j in (0..n).rev() {
                        for l in (j + 1)..n {
                            let alj = at(a, lda, l, j, trans);
                            if alj.is_zero() {
                                continue;
                            }
                            for i in 0..m {
                                let blj = b[i + l * ldb] * alj;
                                b[i + j * ldb] -= blj;
                            }
                        }
                        if !unit {
                            let d = at(a, lda, j, j, trans).inv();
                            for i in 0..m {
                                b[i + j * ldb] *= d;
                            }
                        }
                    }
                } else {
                    for j in 0..n {
                        for l in 0..j {
                            let alj = at(a, lda, l, j, trans);
                            if alj.is_zero() {
                                continue;
                            }
                            for i in 0..m {
                                let blj = b[i + l * ldb] * alj;
                                b[i + j * ldb] -= blj;
                            }
                        }
                        if !unit {
                            let d = at(a, lda, j, j, trans).inv();
                            for i in 0..m {
                                b[i + j * ldb] *= d;
                            }
                        }
                    }
                }
            }
        }
    }

    fn getrf(&self, m: usize, n: usize, a: &mut [T], lda: usize, ipiv: &mut [usize]) -> Result<()> {
        let kmax = m.min(n);
        debug_assert!(ipiv.len() >= kmax);
        for k in 0..kmax {
            // partial pivoting on column k
            let mut max_val = a[k + k * lda].abs_sq();
            let mut max_idx = k;
            for i in (k + 1)..m {
                let v = a[i + k * lda].abs_sq();
                if v > max_val {
                    max_val = v;
                    max_idx = i;
                }
            }
            ipiv[k] = max_idx;
            if max_val == 0.0 {
                return Err(CoreError::Singular {
                    routine: "getrf",
                    index: k,
                });
            }
            if max_idx != k {
                for j in 0..n {
                    a.swap(k + j * lda, max_idx + j * lda);
                }
            }
            let pivot = a[k + k * lda].inv();
            for i in (k + 1)..m {
                a[i + k * lda] *= pivot;
            }
            for j in (k + 1)..n {
                let ukj = a[k + j * lda];
                if ukj.is_zero() {
                    continue;
                }
                for i in (k + 1)..m {
                    let lik = a[i + k * lda];
                    a[i + j * lda] -= lik * ukj;
                }
            }
        }
        Ok(())
    }

    fn laswp(&self, n: usize, a: &mut [T], lda: usize, ipiv: &[usize], forward: bool) {
        let swap_row = |a: &mut [T], k: usize, p: usize| {
            if k != p {
                for j in 0..n {
                    a.swap(k + j * lda, p + j * lda);
                }
            }
        };
        if forward {
            for (k, &p) in ipiv.iter().enumerate() {
                swap_row(a, k, p);
            }
        } else {
            for (k, &p) in ipiv.iter().enumerate().rev() {
                swap_row(a, k, p);
            }
        }
    }

    fn getrs(
        &self,
        trans: Trans,
        n: usize,
        nrhs: usize,
        a: &[T],
        lda: usize,
        ipiv: &[usize],
        b: &mut [T],
        ldb: usize,
    ) -> Result<()> {
        match trans {
            Trans::No => {
                self.laswp(nrhs, b, ldb, ipiv, true);
                self.trsm(
                    Side::Left,
                    Uplo::Lower,
                    Trans::No,
                    Diag::Unit,
                    n,
                    nrhs,
                    T::one(),
                    a,
                    lda,
                    b,
                    ldb,
                );
                self.trsm(
                    Side::Left,
                    Uplo::Upper,
                    Trans::No,
                    Diag::NonUnit,
                    n,
                    nrhs,
                    T::one(),
                    a,
                    lda,
                    b,
                    ldb,
                );
            }
            t => {
                // op(a) x = b with a = p^-1 l u: solve op(u) then op(l),
                // then undo the permutation
                self.trsm(
                    Side::Left,
                    Uplo::Upper,
                    t,
                    Diag::NonUnit,
                    n,
                    nrhs,
                    T::one(),
                    a,
                    lda,
                    b,
                    ldb,
                );
                self.trsm(
                    Side::Left,
                    Uplo::Lower,
                    t,
                    Diag::Unit,
                    n,
                    nrhs,
                    T::one(),
                    a,
                    lda,
                    b,
                    ldb,
                );
                self.laswp(nrhs, b, ldb, ipiv, false);
            }
        }
        Ok(())
    }

    fn potrf(&self, n: usize, a: &mut [T], lda: usize) -> Result<()> {
        for j in 0..n {
            let mut d = a[j + j * lda].real_part();
            for l in 0..j {
                d -= a[j + l * lda].abs_sq();
            }
            if d <= 0.0 {
                return Err(CoreError::Singular {
                    routine: "potrf",
                    index: j,
                });
            }
            let ljj = T::from_real(d.sqrt());
            a[j + j * lda] = ljj;
            let inv_ljj = ljj.inv();
            for i in (j + 1)..n {
                let mut s = a[i + j * lda];
                for l in 0..j {
                    s -= a[i + l * lda] * a[j + l * lda].conj();
                }
                a[i + j * lda] = s * inv_ljj;
            }
        }
        Ok(())
    }

    fn ldlt_nopiv(&self, n: usize, a: &mut [T], lda: usize) -> Result<()> {
        for j in 0..n {
            let mut d = a[j + j * lda];
            for l in 0..j {
                let ljl = a[j + l * lda];
                d -= ljl * ljl * a[l + l * lda];
            }
            if d.abs_sq() == 0.0 {
                return Err(CoreError::Singular {
                    routine: "ldlt",
                    index: j,
                });
            }
            a[j + j * lda] = d;
            let dinv = d.inv();
            for i in (j + 1)..n {
                let mut s = a[i + j * lda];
                for l in 0..j {
                    s -= a[i + l * lda] * a[j + l * lda] * a[l + l * lda];
                }
                a[i + j * lda] = s * dinv;
            }
        }
        Ok(())
    }

    fn geqrf(&self, m: usize, n: usize, a: &mut [T], lda: usize, tau: &mut [T]) -> Result<()> {
        let kmax = m.min(n);
        debug_assert!(tau.len() >= kmax);
        for j in 0..kmax {
            // reflector annihilating a[j+1.., j]
            let alpha = a[j + j * lda];
            let mut xnorm_sq = 0.0;
            for i in (j + 1)..m {
                xnorm_sq += a[i + j * lda].abs_sq();
            }
            if xnorm_sq == 0.0 && alpha.conj() == alpha {
                tau[j] = T::zero();
                continue;
            }
            let beta = -sign(alpha.real_part()) * (alpha.abs_sq() + xnorm_sq).sqrt();
            let tj = (T::from_real(beta) - alpha) * T::from_real(1.0 / beta);
            tau[j] = tj;
            let scale = (alpha - T::from_real(beta)).inv();
            for i in (j + 1)..m {
                a[i + j * lda] *= scale;
            }
            a[j + j * lda] = T::from_real(beta);
            // the reflector satisfies h^H x = beta e1, so the trailing
            // columns get c -= conj(tau) * v * (v^H c), v = [1, a[j+1.., j]]
            for c in (j + 1)..n {
                let mut w = a[j + c * lda];
                for i in (j + 1)..m {
                    w += a[i + j * lda].conj() * a[i + c * lda];
                }
                let tw = tj.conj() * w;
                a[j + c * lda] -= tw;
                for i in (j + 1)..m {
                    let vi = a[i + j * lda];
                    a[i + c * lda] -= tw * vi;
                }
            }
        }
        Ok(())
    }

    fn ormqr(
        &self,
        trans: Trans,
        m: usize,
        n: usize,
        k: usize,
        a: &[T],
        lda: usize,
        tau: &[T],
        c: &mut [T],
        ldc: usize,
    ) -> Result<()> {
        let apply = |c: &mut [T], j: usize, t: T| {
            if t.is_zero() {
                return;
            }
            for col in 0..n {
                let mut w = c[j + col * ldc];
                for i in (j + 1)..m {
                    w += a[i + j * lda].conj() * c[i + col * ldc];
                }
                let tw = t * w;
                c[j + col * ldc] -= tw;
                for i in (j + 1)..m {
                    let vi = a[i + j * lda];
                    c[i + col * ldc] -= tw * vi;
                }
            }
        };
        // r was produced by the adjoint reflectors, so q = h_1 ... h_k:
        // q * c applies plain reflectors in reverse order, q^H * c the
        // conjugated ones in forward order
        match trans {
            Trans::No => {
                for j in (0..k).rev() {
                    apply(c, j, tau[j]);
                }
            }
            _ => {
                for j in 0..k {
                    apply(c, j, tau[j].conj());
                }
            }
        }
        Ok(())
    }

    fn gesvd(
        &self,
        m: usize,
        n: usize,
        a: &mut [T],
        lda: usize,
        u: &mut [T],
        ldu: usize,
        s: &mut [f64],
        vt: &mut [T],
        ldvt: usize,
    ) -> Result<()> {
        let k = m.min(n);
        debug_assert!(s.len() >= k);
        if m >= n {
            let mut v = vec![T::zero(); n * n];
            jacobi_svd(m, n, a, lda, &mut v, n)?;
            finish_svd(m, n, a, lda, &v, n, u, ldu, s, vt, ldvt, false);
        } else {
            // work on the adjoint: a^H = u_b s v_b^H gives a = v_b s u_b^H
            let mut b = vec![T::zero(); n * m];
            for j in 0..m {
                for i in 0..n {
                    b[i + j * n] = a[j + i * lda].conj();
                }
            }
            let mut v = vec![T::zero(); m * m];
            jacobi_svd(n, m, &mut b, n, &mut v, m)?;
            // u <- v_b (m x k), vt <- u_b^H (k x n)
            finish_svd(n, m, &b, n, &v, m, u, ldu, s, vt, ldvt, true);
        }
        Ok(())
    }

    fn getri(&self, n: usize, a: &mut [T], lda: usize) -> Result<()> {
        let mut lu = vec![T::zero(); n * n];
        for j in 0..n {
            lu[j * n..j * n + n].copy_from_slice(&a[j * lda..j * lda + n]);
        }
        let mut ipiv = vec![0usize; n];
        self.getrf(n, n, &mut lu, n, &mut ipiv)?;
        for j in 0..n {
            for i in 0..n {
                a[i + j * lda] = if i == j { T::one() } else { T::zero() };
            }
        }
        self.getrs(Trans::No, n, n, &lu, n, &ipiv, a, lda)
    }
}

/// One-sided Jacobi: orthogonalize the columns of `a` (`m x n`, `m >= n`),
/// accumulating the applied rotations into `v` (`n x n`, overwritten with the
/// right singular vectors).
fn jacobi_svd<T: Scalar>(
    m: usize,
    n: usize,
    a: &mut [T],
    lda: usize,
    v: &mut [T],
    ldv: usize,
) -> Result<()> {
    for j in 0..n {
        for i in 0..n {
            v[i + j * ldv] = if i == j { T::one() } else { T::zero() };
        }
    }
    if n < 2 {
        return Ok(());
    }
    let tol = f64::EPSILON;
    for sweep in 0..MAX_JACOBI_SWEEPS {
        let mut rotated = false;
        for p in 0..(n - 1) {
            for q in (p + 1)..n {
                let mut app = 0.0;
                let mut aqq = 0.0;
                let mut apq = T::zero();
                for i in 0..m {
                    let ap = a[i + p * lda];
                    let aq = a[i + q * lda];
                    app += ap.abs_sq();
                    aqq += aq.abs_sq();
                    apq += ap.conj() * aq;
                }
                let off = apq.abs();
                if off <= tol * (app * aqq).sqrt() || off == 0.0 {
                    continue;
                }
                rotated = true;
                // phase so that the rotated 2x2 gram matrix is real
                let phase = apq * T::from_real(1.0 / off);
                let zeta = (aqq - app) / (2.0 * off);
                let t = sign(zeta) / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let sn = c * t;
                let (cs, ss) = (T::from_real(c), T::from_real(sn));
                let ph_conj = phase.conj();
                let rot = |mat: &mut [T], ld: usize, rows: usize| {
                    for i in 0..rows {
                        let xp = mat[i + p * ld];
                        let xq = mat[i + q * ld];
                        mat[i + p * ld] = cs * xp - ss * (ph_conj * xq);
                        mat[i + q * ld] = ss * (phase * xp) + cs * xq;
                    }
                };
                rot(a, lda, m);
                rot(v, ldv, n);
            }
        }
        if !rotated {
            return Ok(());
        }
        if sweep + 1 == MAX_JACOBI_SWEEPS {
            return Err(CoreError::NoConvergence {
                routine: "gesvd",
                sweeps: MAX_JACOBI_SWEEPS,
            });
        }
    }
    Ok(())
}

/// Extract sorted singular values and write the left/right factors of a
/// Jacobi-orthogonalized panel. With `adjoint` set the roles are flipped:
/// `left_out` receives `v` and `right_out` receives the adjoint of the
/// normalized panel (used for the `m < n` path).
#[allow(clippy::too_many_arguments)]
fn finish_svd<T: Scalar>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    v: &[T],
    ldv: usize,
    left_out: &mut [T],
    ld_left: usize,
    s: &mut [f64],
    right_out: &mut [T],
    ld_right: usize,
    adjoint: bool,
) {
    let mut norms: Vec<(f64, usize)> = (0..n)
        .map(|j| {
            let mut sq = 0.0;
            for i in 0..m {
                sq += a[i + j * lda].abs_sq();
            }
            (sq.sqrt(), j)
        })
        .collect();
    norms.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));
    for (rank, &(sigma, j)) in norms.iter().enumerate() {
        s[rank] = sigma;
        let scale = if sigma > 0.0 { 1.0 / sigma } else { 0.0 };
        if !adjoint {
            // left_out[:, rank] = a[:, j] / sigma; right_out[rank, :] = v[:, j]^H
            for i in 0..m {
                left_out[i + rank * ld_left] = a[i + j * lda] * T::from_real(scale);
            }
            for i in 0..n {
                right_out[rank + i * ld_right] = v[i + j * ldv].conj();
            }
        } else {
            // left factor of the original matrix is v, right factor is the
            // normalized panel's adjoint
            for i in 0..n {
                left_out[i + rank * ld_left] = v[i + j * ldv];
            }
            for i in 0..m {
                right_out[rank + i * ld_right] = (a[i + j * lda] * T::from_real(scale)).conj();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_diff(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_gemm_small() {
        let k = NativeKernel;
        // column-major 2x2
        let a = vec![1.0, 3.0, 2.0, 4.0];
        let b = vec![5.0, 7.0, 6.0, 8.0];
        let mut c = vec![0.0; 4];
        k.gemm(
            Trans::No,
            Trans::No,
            2,
            2,
            2,
            1.0,
            &a,
            2,
            &b,
            2,
            0.0,
            &mut c,
            2,
        );
        assert_eq!(c, vec![19.0, 43.0, 22.0, 50.0]);
    }

    #[test]
    fn test_gemm_transposed() {
        let k = NativeKernel;
        let a = vec![1.0, 3.0, 2.0, 4.0];
        let b = vec![5.0, 7.0, 6.0, 8.0];
        let mut c = vec![0.0; 4];
        // a^T * b
        k.gemm(
            Trans::Trans,
            Trans::No,
            2,
            2,
            2,
            1.0,
            &a,
            2,
            &b,
            2,
            0.0,
            &mut c,
            2,
        );
        // [[1,3],[2,4]] * [[5,6],[7,8]] = [[26,30],[38,44]]
        assert_eq!(c, vec![26.0, 38.0, 30.0, 44.0]);
    }

    #[test]
    fn test_getrf_getrs_roundtrip() {
        let k = NativeKernel;
        let a0 = vec![4.0, 2.0, 1.0, 3.0, 6.0, 2.0, 1.0, 1.0, 5.0];
        let mut a = a0.clone();
        let mut ipiv = vec![0usize; 3];
        k.getrf(3, 3, &mut a, 3, &mut ipiv).unwrap();
        let x_true = vec![1.0, -2.0, 0.5];
        // b = a0 * x_true
        let mut b = vec![0.0; 3];
        k.gemv(Trans::No, 3, 3, 1.0, &a0, 3, &x_true, 0.0, &mut b);
        k.getrs(Trans::No, 3, 1, &a, 3, &ipiv, &mut b, 3).unwrap();
        assert!(max_diff(&b, &x_true) < 1e-12);
    }

    #[test]
    fn test_getrf_singular() {
        let k = NativeKernel;
        let mut a = vec![1.0, 2.0, 2.0, 4.0];
        let mut ipiv = vec![0usize; 2];
        let err = k.getrf(2, 2, &mut a, 2, &mut ipiv);
        assert!(matches!(err, Err(CoreError::Singular { .. })));
    }

    #[test]
    fn test_trsm_left_lower() {
        let k = NativeKernel;
        // l = [[2,0],[1,3]] column-major
        let l = vec![2.0, 1.0, 0.0, 3.0];
        let x_true = vec![1.0, 2.0];
        let mut b = vec![0.0; 2];
        k.gemv(Trans::No, 2, 2, 1.0, &l, 2, &x_true, 0.0, &mut b);
        k.trsm(
            Side::Left,
            Uplo::Lower,
            Trans::No,
            Diag::NonUnit,
            2,
            1,
            1.0,
            &l,
            2,
            &mut b,
            2,
        );
        assert!(max_diff(&b, &x_true) < 1e-14);
    }

    #[test]
    fn test_trsm_right_transposed_lower() {
        let k = NativeKernel;
        // solve x * l^T = b with l lower; x = b * l^-T
        let l = vec![2.0, 1.0, 0.0, 3.0];
        let x_true = vec![1.0, 0.0, -1.0, 2.0]; // 2x2 column-major
        let mut b = vec![0.0; 4];
        // b = x_true * l^T
        k.gemm(
            Trans::No,
            Trans::Trans,
            2,
            2,
            2,
            1.0,
            &x_true,
            2,
            &l,
            2,
            0.0,
            &mut b,
            2,
        );
        k.trsm(
            Side::Right,
            Uplo::Lower,
            Trans::Trans,
            Diag::NonUnit,
            2,
            2,
            1.0,
            &l,
            2,
            &mut b,
            2,
        );
        assert!(max_diff(&b, &x_true) < 1e-14);
    }

    #[test]
    fn test_potrf() {
        let k = NativeKernel;
        // spd: [[4,2],[2,3]]
        let mut a = vec![4.0, 2.0, 2.0, 3.0];
        k.potrf(2, &mut a, 2).unwrap();
        // l = [[2,0],[1,sqrt(2)]]
        assert!((a[0] - 2.0).abs() < 1e-14);
        assert!((a[1] - 1.0).abs() < 1e-14);
        assert!((a[3] - 2.0_f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_potrf_not_positive() {
        let k = NativeKernel;
        let mut a = vec![1.0, 2.0, 2.0, 1.0];
        assert!(matches!(
            k.potrf(2, &mut a, 2),
            Err(CoreError::Singular { .. })
        ));
    }

    #[test]
    fn test_ldlt_roundtrip() {
        let k = NativeKernel;
        // symmetric indefinite [[2,4],[4,3]]
        let a0 = vec![2.0, 4.0, 4.0, 3.0];
        let mut a = a0.clone();
        k.ldlt_nopiv(2, &mut a, 2).unwrap();
        let (d0, l10, d1) = (a[0], a[1], a[3]);
        // reconstruct l d l^T
        let r00 = d0;
        let r10 = l10 * d0;
        let r11 = l10 * l10 * d0 + d1;
        assert!((r00 - 2.0).abs() < 1e-14);
        assert!((r10 - 4.0).abs() < 1e-14);
        assert!((r11 - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_qr_recomposition() {
        let k = NativeKernel;
        let m = 4;
        let n = 3;
        let a0: Vec<f64> = vec![
            1.0, 2.0, -1.0, 0.5, 0.0, 1.0, 3.0, -2.0, 2.0, 1.0, 1.0, 1.0,
        ];
        let mut a = a0.clone();
        let mut tau = vec![0.0; n];
        k.geqrf(m, n, &mut a, m, &mut tau).unwrap();
        // q * r should reproduce a0: start from r, apply q
        let mut qr = vec![0.0; m * n];
        for j in 0..n {
            for i in 0..=j.min(m - 1) {
                qr[i + j * m] = a[i + j * m];
            }
        }
        k.ormqr(Trans::No, m, n, n, &a, m, &tau, &mut qr, m).unwrap();
        assert!(max_diff(&qr, &a0) < 1e-12);
    }

    #[test]
    fn test_q_orthonormal() {
        let k = NativeKernel;
        let m = 5;
        let n = 3;
        let a0: Vec<f64> = (0..m * n).map(|i| ((i * 7 + 3) % 11) as f64 - 5.0).collect();
        let mut a = a0.clone();
        let mut tau = vec![0.0; n];
        k.geqrf(m, n, &mut a, m, &mut tau).unwrap();
        // form thin q by applying q to the first n columns of identity
        let mut q = vec![0.0; m * n];
        for j in 0..n {
            q[j + j * m] = 1.0;
        }
        k.ormqr(Trans::No, m, n, n, &a, m, &tau, &mut q, m).unwrap();
        // q^T q = identity
        let mut g = vec![0.0; n * n];
        k.gemm(
            Trans::Trans,
            Trans::No,
            n,
            n,
            m,
            1.0,
            &q,
            m,
            &q,
            m,
            0.0,
            &mut g,
            n,
        );
        for j in 0..n {
            for i in 0..n {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((g[i + j * n] - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_ormqr_adjoint_recovers_r() {
        let k = NativeKernel;
        let m = 5;
        let n = 3;
        let a0: Vec<f64> = (0..m * n).map(|i| ((i * 5 + 2) % 13) as f64 - 6.0).collect();
        let mut a = a0.clone();
        let mut tau = vec![0.0; n];
        k.geqrf(m, n, &mut a, m, &mut tau).unwrap();
        // q^T * a0 reproduces r in the leading rows
        let mut qta = a0.clone();
        k.ormqr(Trans::Trans, m, n, n, &a, m, &tau, &mut qta, m)
            .unwrap();
        for j in 0..n {
            for i in 0..m {
                let expect = if i <= j { a[i + j * m] } else { 0.0 };
                assert!((qta[i + j * m] - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_qr_complex_recomposition() {
        use num_complex::Complex64;
        let k = NativeKernel;
        let m = 4;
        let n = 3;
        let a0: Vec<Complex64> = (0..m * n)
            .map(|i| Complex64::new(((i * 3) % 7) as f64 - 3.0, ((i * 5) % 4) as f64 - 1.5))
            .collect();
        let mut a = a0.clone();
        let mut tau = vec![Complex64::new(0.0, 0.0); n];
        k.geqrf(m, n, &mut a, m, &mut tau).unwrap();
        // form thin q, check unitarity and q * r == a0
        let mut q = vec![Complex64::new(0.0, 0.0); m * n];
        for j in 0..n {
            q[j + j * m] = Complex64::new(1.0, 0.0);
        }
        k.ormqr(Trans::No, m, n, n, &a, m, &tau, &mut q, m).unwrap();
        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        let mut g = vec![zero; n * n];
        k.gemm(
            Trans::ConjTrans,
            Trans::No,
            n,
            n,
            m,
            one,
            &q,
            m,
            &q,
            m,
            zero,
            &mut g,
            n,
        );
        for j in 0..n {
            for i in 0..n {
                let expect = if i == j { one } else { zero };
                assert!((g[i + j * n] - expect).norm() < 1e-12, "q not unitary");
            }
        }
        let mut r = vec![zero; n * n];
        for j in 0..n {
            for i in 0..=j {
                r[i + j * n] = a[i + j * m];
            }
        }
        let mut rec = vec![zero; m * n];
        k.gemm(
            Trans::No,
            Trans::No,
            m,
            n,
            n,
            one,
            &q,
            m,
            &r,
            n,
            zero,
            &mut rec,
            m,
        );
        let err = rec
            .iter()
            .zip(a0.iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max);
        assert!(err < 1e-12, "complex qr recomposition error {err}");
    }

    #[test]
    fn test_svd_recomposition() {
        let k = NativeKernel;
        for (m, n) in [(4usize, 3usize), (3, 5)] {
            let a0: Vec<f64> = (0..m * n)
                .map(|i| (((i * 13 + 5) % 17) as f64 - 8.0) / 3.0)
                .collect();
            let mut a = a0.clone();
            let kk = m.min(n);
            let mut u = vec![0.0; m * kk];
            let mut s = vec![0.0; kk];
            let mut vt = vec![0.0; kk * n];
            k.gesvd(m, n, &mut a, m, &mut u, m, &mut s, &mut vt, kk)
                .unwrap();
            // singular values sorted non-increasing
            for i in 1..kk {
                assert!(s[i] <= s[i - 1] + 1e-14);
            }
            // u * diag(s) * vt == a0
            let mut us = u.clone();
            for j in 0..kk {
                for i in 0..m {
                    us[i + j * m] *= s[j];
                }
            }
            let mut rec = vec![0.0; m * n];
            k.gemm(
                Trans::No,
                Trans::No,
                m,
                n,
                kk,
                1.0,
                &us,
                m,
                &vt,
                kk,
                0.0,
                &mut rec,
                m,
            );
            assert!(max_diff(&rec, &a0) < 1e-10);
        }
    }

    #[test]
    fn test_svd_complex_recomposition() {
        use num_complex::Complex64;
        let k = NativeKernel;
        let m = 3;
        let n = 3;
        let a0: Vec<Complex64> = (0..m * n)
            .map(|i| Complex64::new((i % 4) as f64 - 1.5, ((i * 3) % 5) as f64 - 2.0))
            .collect();
        let mut a = a0.clone();
        let mut u = vec![Complex64::new(0.0, 0.0); m * n];
        let mut s = vec![0.0; n];
        let mut vt = vec![Complex64::new(0.0, 0.0); n * n];
        k.gesvd(m, n, &mut a, m, &mut u, m, &mut s, &mut vt, n)
            .unwrap();
        let mut us = u.clone();
        for j in 0..n {
            for i in 0..m {
                us[i + j * m] *= Complex64::new(s[j], 0.0);
            }
        }
        let mut rec = vec![Complex64::new(0.0, 0.0); m * n];
        k.gemm(
            Trans::No,
            Trans::No,
            m,
            n,
            n,
            Complex64::new(1.0, 0.0),
            &us,
            m,
            &vt,
            n,
            Complex64::new(0.0, 0.0),
            &mut rec,
            m,
        );
        let err = rec
            .iter()
            .zip(a0.iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max);
        assert!(err < 1e-10);
    }

    #[test]
    fn test_getri() {
        let k = NativeKernel;
        let a0 = vec![4.0, 2.0, 1.0, 3.0, 6.0, 2.0, 1.0, 1.0, 5.0];
        let mut a = a0.clone();
        k.getri(3, &mut a, 3).unwrap();
        let mut prod = vec![0.0; 9];
        k.gemm(
            Trans::No,
            Trans::No,
            3,
            3,
            3,
            1.0,
            &a0,
            3,
            &a,
            3,
            0.0,
            &mut prod,
            3,
        );
        for j in 0..3 {
            for i in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((prod[i + j * 3] - expect).abs() < 1e-12);
            }
        }
    }
}
