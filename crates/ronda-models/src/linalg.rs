//! Dense least squares for the small systems the reference estimators solve.

use ndarray::{Array1, Array2};

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when the system is singular.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

/// Ordinary least squares via the normal equations, with an optional ridge term
/// on every coefficient except the first (the intercept column).
pub(crate) fn least_squares(x: &Array2<f64>, y: &Array1<f64>, ridge: f64) -> Option<Array1<f64>> {
    let xt = x.t();
    let mut xtx = xt.dot(x);
    for i in 1..xtx.nrows() {
        xtx[[i, i]] += ridge;
    }
    let xty = xt.dot(y);
    let beta = solve(xtx, xty)?;
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_solve_with_pivoting() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve(a, b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular() {
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_least_squares_recovers_line() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let beta = least_squares(&x, &y, 0.0).unwrap();
        assert_relative_eq!(beta[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(beta[1], 2.0, epsilon = 1e-9);
    }
}
