//! Adaptive Cross Approximation.
//!
//! All three variants build a low-rank approximation `a * b^H` one pivot at
//! a time from a matrix-element oracle, subtracting each rank-1 cross from
//! the residual:
//!
//! * [`aca_full`] materializes the block and pivots on the global residual
//!   maximum;
//! * [`aca_partial`] touches only single rows and columns, steering pivots
//!   by the last cross and a running Frobenius-norm estimate;
//! * [`aca_plus`] additionally tracks a full reference row and column of the
//!   residual to improve pivot selection on kernels with localized behavior.

use rand::Rng;

use hmatrs_core::{ScalarArray, Scalar};

use crate::rk::RkMatrix;

/// Element oracle over a matrix block, in block-local coordinates.
pub trait MatrixOracle<T: Scalar>: Sync {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// Single element.
    fn entry(&self, i: usize, j: usize) -> T;

    /// Row `i` into `out` (length `ncols`).
    fn fill_row(&self, i: usize, out: &mut [T]) {
        for (j, v) in out.iter_mut().enumerate() {
            *v = self.entry(i, j);
        }
    }

    /// Column `j` into `out` (length `nrows`).
    fn fill_col(&self, j: usize, out: &mut [T]) {
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.entry(i, j);
        }
    }

    /// Materialize the whole block.
    fn to_dense(&self) -> ScalarArray<T> {
        let mut tile = ScalarArray::zeros(self.nrows(), self.ncols());
        for j in 0..self.ncols() {
            self.fill_col(j, tile.column_mut(j));
        }
        tile
    }
}

impl<T: Scalar> MatrixOracle<T> for ScalarArray<T> {
    fn nrows(&self) -> usize {
        self.rows()
    }

    fn ncols(&self) -> usize {
        self.cols()
    }

    fn entry(&self, i: usize, j: usize) -> T {
        self.get(i, j)
    }
}

/// Outcome of an ACA run.
#[derive(Debug, Clone)]
pub struct AcaResult<T> {
    pub rk: RkMatrix<T>,
    /// False when the rank cap was reached before the accuracy target.
    pub converged: bool,
}

/// Growing cross state shared by the partial variants.
struct CrossState<T> {
    a: ScalarArray<T>,
    b: ScalarArray<T>,
    used_rows: Vec<bool>,
    used_cols: Vec<bool>,
    /// Running estimate of the squared Frobenius norm of the approximant.
    norm_est_sq: f64,
}

impl<T: Scalar> CrossState<T> {
    fn new(m: usize, n: usize) -> Self {
        Self {
            a: ScalarArray::zeros(m, 0),
            b: ScalarArray::zeros(n, 0),
            used_rows: vec![false; m],
            used_cols: vec![false; n],
            norm_est_sq: 0.0,
        }
    }

    fn rank(&self) -> usize {
        self.a.cols()
    }

    /// Residual value of row `i`: the oracle row minus the current cross.
    fn residual_row<O: MatrixOracle<T>>(&self, oracle: &O, i: usize) -> Vec<T> {
        let n = self.b.rows();
        let mut row = vec![T::zero(); n];
        oracle.fill_row(i, &mut row);
        for l in 0..self.rank() {
            let ail = self.a.get(i, l);
            if ail.is_zero() {
                continue;
            }
            for (j, v) in row.iter_mut().enumerate() {
                *v -= ail * self.b.get(j, l).conj();
            }
        }
        row
    }

    /// Residual value of column `j`.
    fn residual_col<O: MatrixOracle<T>>(&self, oracle: &O, j: usize) -> Vec<T> {
        let m = self.a.rows();
        let mut col = vec![T::zero(); m];
        oracle.fill_col(j, &mut col);
        for l in 0..self.rank() {
            let bjl = self.b.get(j, l).conj();
            if bjl.is_zero() {
                continue;
            }
            for (i, v) in col.iter_mut().enumerate() {
                *v -= self.a.get(i, l) * bjl;
            }
        }
        col
    }

    /// Append the cross `(col / delta) * row^H` and update the norm
    /// estimate. Returns `(|u| * |v|, estimated norm)` for the stop test.
    fn push_cross(&mut self, col: &[T], row: &[T], delta: T) -> (f64, f64) {
        let inv = delta.inv();
        let u: Vec<T> = col.iter().map(|&v| v * inv).collect();
        let v: Vec<T> = row.iter().map(|&x| x.conj()).collect();
        let nu_sq: f64 = u.iter().map(|x| x.abs_sq()).sum();
        let nv_sq: f64 = v.iter().map(|x| x.abs_sq()).sum();
        // cross terms against the previous rank-1 pieces
        let mut cross = 0.0;
        for l in 0..self.rank() {
            let mut ua = T::zero();
            for (i, &ui) in u.iter().enumerate() {
                ua += self.a.get(i, l).conj() * ui;
            }
            let mut vb = T::zero();
            for (j, &vj) in v.iter().enumerate() {
                vb += vj.conj() * self.b.get(j, l);
            }
            cross += (ua * vb).real_part();
        }
        self.norm_est_sq += nu_sq * nv_sq + 2.0 * cross;
        self.a.push_col(&u);
        self.b.push_col(&v);
        ((nu_sq * nv_sq).sqrt(), self.norm_est_sq.max(0.0).sqrt())
    }

    fn into_result(self, converged: bool) -> AcaResult<T> {
        AcaResult {
            rk: RkMatrix::new(self.a, self.b),
            converged,
        }
    }
}

fn argmax_abs<T: Scalar>(values: &[T], used: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, v) in values.iter().enumerate() {
        if used[idx] {
            continue;
        }
        let a = v.abs_sq();
        if best.map_or(true, |(_, bv)| a > bv) {
            best = Some((idx, a));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Full-pivoting ACA on a materialized tile. Stops when the residual
/// Frobenius norm falls below `eps` times the input norm.
pub fn aca_full<T: Scalar>(tile: &ScalarArray<T>, eps: f64, max_rank: usize) -> AcaResult<T> {
    let (m, n) = (tile.rows(), tile.cols());
    let cap = max_rank.min(m.min(n));
    let mut residual = tile.clone();
    let norm0 = residual.norm();
    let mut a = ScalarArray::zeros(m, 0);
    let mut b = ScalarArray::zeros(n, 0);
    if norm0 == 0.0 {
        return AcaResult {
            rk: RkMatrix::new(a, b),
            converged: true,
        };
    }
    let mut converged = false;
    while a.cols() < cap {
        if residual.norm() <= eps * norm0 {
            converged = true;
            break;
        }
        // global pivot search
        let (mut pi, mut pj, mut pv) = (0, 0, -1.0);
        for j in 0..n {
            for i in 0..m {
                let v = residual.get(i, j).abs_sq();
                if v > pv {
                    pv = v;
                    pi = i;
                    pj = j;
                }
            }
        }
        if pv == 0.0 {
            converged = true;
            break;
        }
        let delta = residual.get(pi, pj);
        let inv = delta.inv();
        let u: Vec<T> = (0..m).map(|i| residual.get(i, pj) * inv).collect();
        let v: Vec<T> = (0..n).map(|j| residual.get(pi, j).conj()).collect();
        // subtract the cross from the residual
        for j in 0..n {
            let vj = v[j].conj();
            if vj.is_zero() {
                continue;
            }
            for i in 0..m {
                let r = residual.get(i, j) - u[i] * vj;
                residual.set(i, j, r);
            }
        }
        a.push_col(&u);
        b.push_col(&v);
    }
    if !converged {
        converged = residual.norm() <= eps * norm0;
    }
    AcaResult {
        rk: RkMatrix::new(a, b),
        converged,
    }
}

/// Partial-pivoting ACA: only touches single rows and columns of the
/// oracle. Stops when `|u| * |v| <= eps * |approximant|` (estimated).
pub fn aca_partial<T: Scalar, O: MatrixOracle<T>>(
    oracle: &O,
    eps: f64,
    max_rank: usize,
) -> AcaResult<T> {
    let (m, n) = (oracle.nrows(), oracle.ncols());
    if m == 0 || n == 0 {
        return AcaResult {
            rk: RkMatrix::zero(m, n),
            converged: true,
        };
    }
    let cap = max_rank.min(m.min(n));
    let mut state = CrossState::new(m, n);
    let mut next_row = Some(0);
    let mut converged = false;
    while state.rank() < cap {
        let Some(i) = next_row else {
            converged = true;
            break;
        };
        let row = state.residual_row(oracle, i);
        state.used_rows[i] = true;
        let Some(j) = argmax_abs(&row, &state.used_cols) else {
            converged = true;
            break;
        };
        let delta = row[j];
        if delta.abs_sq() == 0.0 {
            // row already resolved; move to another one
            next_row = state.used_rows.iter().position(|&u| !u);
            continue;
        }
        state.used_cols[j] = true;
        let col = state.residual_col(oracle, j);
        let (uv, est) = state.push_cross(&col, &row, delta);
        if uv <= eps * est {
            converged = true;
            break;
        }
        // steer to the row dominating the newly added column
        let last = state.rank() - 1;
        let acol: Vec<T> = (0..m).map(|r| state.a.get(r, last)).collect();
        next_row = argmax_abs(&acol, &state.used_rows);
    }
    if state.rank() == m.min(n) {
        converged = true;
    }
    state.into_result(converged)
}

/// ACA with reference row/column steering: a full residual row and column
/// are kept up to date and seed the pivot choice each step.
pub fn aca_plus<T: Scalar, O: MatrixOracle<T>, R: Rng>(
    oracle: &O,
    eps: f64,
    max_rank: usize,
    rng: &mut R,
) -> AcaResult<T> {
    let (m, n) = (oracle.nrows(), oracle.ncols());
    if m == 0 || n == 0 {
        return AcaResult {
            rk: RkMatrix::zero(m, n),
            converged: true,
        };
    }
    let cap = max_rank.min(m.min(n));
    let mut state = CrossState::new(m, n);
    let mut ref_i = rng.gen_range(0..m);
    let mut ref_j = rng.gen_range(0..n);
    let mut ref_row = state.residual_row(oracle, ref_i);
    let mut ref_col = state.residual_col(oracle, ref_j);
    let mut converged = false;
    while state.rank() < cap {
        // candidate from the reference row, crossed with its best column
        let cand_col = argmax_abs(&ref_row, &state.used_cols);
        let cand_row = argmax_abs(&ref_col, &state.used_rows);
        let (pi, pj, col, row) = match (cand_col, cand_row) {
            (None, None) => {
                converged = true;
                break;
            }
            (col_idx, row_idx) => {
                let via_col = col_idx.map(|j| {
                    let col = state.residual_col(oracle, j);
                    let i = argmax_abs(&col, &state.used_rows);
                    (i, j, col)
                });
                let via_row = row_idx.map(|i| {
                    let row = state.residual_row(oracle, i);
                    let j = argmax_abs(&row, &state.used_cols);
                    (i, j, row)
                });
                let col_gain = via_col
                    .as_ref()
                    .and_then(|(i, _, col)| i.map(|i| col[i].abs_sq()))
                    .unwrap_or(-1.0);
                let row_gain = via_row
                    .as_ref()
                    .and_then(|(_, j, row)| j.map(|j| row[j].abs_sq()))
                    .unwrap_or(-1.0);
                if col_gain >= row_gain {
                    let (i, j, col) = via_col.unwrap();
                    let Some(i) = i else {
                        converged = true;
                        break;
                    };
                    let row = state.residual_row(oracle, i);
                    (i, j, col, row)
                } else {
                    let (i, j, row) = via_row.unwrap();
                    let Some(j) = j else {
                        converged = true;
                        break;
                    };
                    let col = state.residual_col(oracle, j);
                    (i, j, col, row)
                }
            }
        };
        let delta = row[pj];
        if delta.abs_sq() == 0.0 {
            converged = true;
            break;
        }
        state.used_rows[pi] = true;
        state.used_cols[pj] = true;
        let (uv, est) = state.push_cross(&col, &row, delta);
        // keep the reference cross in sync with the new rank-1 term
        let last = state.rank() - 1;
        for (j, v) in ref_row.iter_mut().enumerate() {
            *v -= state.a.get(ref_i, last) * state.b.get(j, last).conj();
        }
        for (i, v) in ref_col.iter_mut().enumerate() {
            *v -= state.a.get(i, last) * state.b.get(ref_j, last).conj();
        }
        if uv <= eps * est {
            converged = true;
            break;
        }
        // re-seed a consumed reference cross
        if state.used_rows[ref_i] {
            if let Some(i) = state.used_rows.iter().position(|&u| !u) {
                ref_i = i;
                ref_row = state.residual_row(oracle, ref_i);
            }
        }
        if state.used_cols[ref_j] {
            if let Some(j) = state.used_cols.iter().position(|&u| !u) {
                ref_j = j;
                ref_col = state.residual_col(oracle, ref_j);
            }
        }
    }
    if state.rank() == m.min(n) {
        converged = true;
    }
    state.into_result(converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmatrs_core::NativeKernel;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Smooth displacement kernel, numerically low rank on separated sets.
    struct SmoothKernel {
        m: usize,
        n: usize,
        shift: f64,
    }

    impl MatrixOracle<f64> for SmoothKernel {
        fn nrows(&self) -> usize {
            self.m
        }

        fn ncols(&self) -> usize {
            self.n
        }

        fn entry(&self, i: usize, j: usize) -> f64 {
            1.0 / (1.0 + (i as f64 - (j as f64 + self.shift)).abs())
        }
    }

    fn check_close(result: &AcaResult<f64>, oracle: &dyn MatrixOracle<f64>, tol: f64) {
        let k = NativeKernel;
        let dense = oracle.to_dense();
        let mut diff = result.rk.to_dense(&k);
        diff.axpy(-1.0, &dense);
        assert!(
            diff.norm() <= tol * dense.norm(),
            "aca error {} above {}",
            diff.norm() / dense.norm(),
            tol
        );
    }

    #[test]
    fn test_aca_full_converges() {
        let oracle = SmoothKernel {
            m: 24,
            n: 20,
            shift: 40.0,
        };
        let tile = oracle.to_dense();
        let res = aca_full(&tile, 1e-8, usize::MAX);
        assert!(res.converged);
        assert!(res.rk.rank() < 20);
        check_close(&res, &oracle, 1e-7);
    }

    #[test]
    fn test_aca_partial_converges() {
        let oracle = SmoothKernel {
            m: 30,
            n: 25,
            shift: 60.0,
        };
        let res = aca_partial(&oracle, 1e-8, usize::MAX);
        assert!(res.converged);
        assert!(res.rk.rank() < 25);
        check_close(&res, &oracle, 1e-6);
    }

    #[test]
    fn test_aca_plus_converges() {
        let oracle = SmoothKernel {
            m: 30,
            n: 25,
            shift: 60.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let res = aca_plus(&oracle, 1e-8, usize::MAX, &mut rng);
        assert!(res.converged);
        assert!(res.rk.rank() < 25);
        check_close(&res, &oracle, 1e-6);
    }

    #[test]
    fn test_aca_on_rank_one() {
        // exactly rank 1: outer product
        let tile = ScalarArray::from_fn(12, 9, |i, j| (i as f64 + 1.0) * (j as f64 - 4.0));
        let res = aca_partial(&tile, 1e-12, usize::MAX);
        assert!(res.converged);
        assert_eq!(res.rk.rank(), 1);
        check_close(&res, &tile, 1e-12);
    }

    #[test]
    fn test_aca_zero_block() {
        let tile = ScalarArray::<f64>::zeros(6, 6);
        let res = aca_full(&tile, 1e-10, usize::MAX);
        assert!(res.converged);
        assert_eq!(res.rk.rank(), 0);
        let res = aca_partial(&tile, 1e-10, usize::MAX);
        assert!(res.converged);
        assert_eq!(res.rk.rank(), 0);
    }

    #[test]
    fn test_aca_rank_cap() {
        let oracle = SmoothKernel {
            m: 20,
            n: 20,
            shift: 2.0,
        };
        let res = aca_partial(&oracle, 1e-14, 2);
        assert_eq!(res.rk.rank(), 2);
        assert!(!res.converged);
    }
}
