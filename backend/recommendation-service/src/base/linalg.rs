use crate::error::{AppError, Result};
use ndarray::Array2;

const PIVOT_EPSILON: f64 = 1e-12;

/// Inverts a square matrix with Gauss-Jordan elimination and partial pivoting.
pub fn inverse(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let (n, m) = matrix.dim();
    if n != m {
        return Err(AppError::SingularMatrix(format!(
            "cannot invert a {}x{} matrix",
            n, m
        )));
    }
    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&x, &y| a[[x, col]].abs().total_cmp(&a[[y, col]].abs()))
            .unwrap_or(col);
        let pivot = a[[pivot_row, col]];
        if !pivot.is_finite() || pivot.abs() < PIVOT_EPSILON {
            return Err(AppError::SingularMatrix(format!(
                "zero pivot in column {}",
                col
            )));
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([pivot_row, k], [col, k]);
                inv.swap([pivot_row, k], [col, k]);
            }
        }
        for k in 0..n {
            a[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_inverse() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = inverse(&a).unwrap();
        let identity = a.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        let a = array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 2.0]];
        let inv = inverse(&a).unwrap();
        assert!((inv[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((inv[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((inv[[2, 2]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(inverse(&a), Err(AppError::SingularMatrix(_))));
    }
}
