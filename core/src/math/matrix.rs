use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    pub fn multiply(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Array2<f64> {
        lhs.dot(&rhs)
    }

    /// Solves `T x = b` for the symmetric Toeplitz matrix `T[i][j] = r[|i - j|]`
    /// by Levinson recursion. `r` must hold at least `b.len()` lags.
    ///
    /// Returns `None` when a leading minor is singular.
    pub fn levinson(r: &[f64], b: &[f64]) -> Option<Vec<f64>> {
        let n = b.len();
        if n == 0 {
            return Some(Vec::new());
        }
        if r.len() < n || r[0] == 0.0 || !r[0].is_finite() {
            return None;
        }

        let mut forward = vec![0.0; n];
        let mut next = vec![0.0; n];
        let mut x = vec![0.0; n];
        forward[0] = 1.0 / r[0];
        x[0] = b[0] / r[0];

        for k in 1..n {
            let eps: f64 = (0..k).map(|i| r[k - i] * forward[i]).sum();
            let denom = 1.0 - eps * eps;
            if denom.abs() < f64::EPSILON || !denom.is_finite() {
                return None;
            }
            // forward_{k+1} = ([f; 0] - eps [0; reverse(f)]) / denom
            for i in 0..=k {
                let f = if i < k { forward[i] } else { 0.0 };
                let back = if i > 0 { forward[k - i] } else { 0.0 };
                next[i] = (f - eps * back) / denom;
            }
            forward[..=k].copy_from_slice(&next[..=k]);

            let eps_x: f64 = (0..k).map(|i| r[k - i] * x[i]).sum();
            let correction = b[k] - eps_x;
            // the backward vector is the reversed forward vector
            for i in 0..=k {
                x[i] += correction * forward[k - i];
            }
        }

        if x.iter().all(|v| v.is_finite()) {
            Some(x)
        } else {
            None
        }
    }
}

/// Lower-triangular Cholesky factor grown one row at a time, for normal
/// equations whose support expands incrementally.
#[derive(Debug, Clone, Default)]
pub struct CholeskyFactor {
    rows: Vec<Vec<f64>>,
}

impl CholeskyFactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    /// Appends the last row of the grown matrix: its entries against the
    /// existing columns followed by the diagonal. Returns `false` (leaving the
    /// factor untouched) when the matrix would not be positive definite.
    pub fn push(&mut self, row: &[f64]) -> bool {
        let k = self.rows.len();
        if row.len() != k + 1 {
            return false;
        }
        let mut next = Vec::with_capacity(k + 1);
        for j in 0..k {
            let dot: f64 = (0..j).map(|p| next[p] * self.rows[j][p]).sum();
            next.push((row[j] - dot) / self.rows[j][j]);
        }
        let pivot = row[k] - next.iter().map(|v| v * v).sum::<f64>();
        if !(pivot > 0.0) || !pivot.is_finite() {
            return false;
        }
        next.push(pivot.sqrt());
        self.rows.push(next);
        true
    }

    pub fn solve(&self, b: &[f64]) -> Option<Vec<f64>> {
        let n = self.rows.len();
        if b.len() != n {
            return None;
        }
        let mut y = vec![0.0; n];
        for i in 0..n {
            let dot: f64 = (0..i).map(|k| self.rows[i][k] * y[k]).sum();
            y[i] = (b[i] - dot) / self.rows[i][i];
        }
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let dot: f64 = ((i + 1)..n).map(|k| self.rows[k][i] * x[k]).sum();
            x[i] = (y[i] - dot) / self.rows[i][i];
        }
        Some(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn levinson_solves_toeplitz_system() {
        let r = [4.0, 1.0, 0.5, 0.25];
        let b = [1.0, 2.0, 3.0, 4.0];
        let x = MatrixHelper::levinson(&r, &b).unwrap();
        for i in 0..4 {
            let row: f64 = (0..4)
                .map(|j| r[(i as isize - j as isize).unsigned_abs()] * x[j])
                .sum();
            assert!((row - b[i]).abs() < 1e-10, "row {} = {}", i, row);
        }
    }

    #[test]
    fn levinson_rejects_zero_diagonal() {
        assert!(MatrixHelper::levinson(&[0.0, 1.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn incremental_cholesky_matches_direct_product() {
        let a = [[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let mut factor = CholeskyFactor::new();
        assert!(factor.push(&[4.0]));
        assert!(factor.push(&[2.0, 5.0]));
        assert!(factor.push(&[0.4, 1.0, 3.0]));
        let b = [1.0, -2.0, 0.5];
        let x = factor.solve(&b).unwrap();
        for i in 0..3 {
            let row: f64 = (0..3).map(|j| a[i][j] * x[j]).sum();
            assert!((row - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn incremental_cholesky_rejects_singular_growth() {
        let mut factor = CholeskyFactor::new();
        assert!(factor.push(&[1.0]));
        assert!(!factor.push(&[1.0, 1.0]));
        assert_eq!(factor.dim(), 1);
    }

    #[test]
    fn multiply_applies_rotation() {
        let rotation = array![[0.0, -1.0], [1.0, 0.0]];
        let points = array![[1.0, 0.0], [0.0, 1.0]];
        let rotated = MatrixHelper::multiply(rotation.view(), points.view());
        assert_eq!(rotated, array![[0.0, -1.0], [1.0, 0.0]]);
    }
}
