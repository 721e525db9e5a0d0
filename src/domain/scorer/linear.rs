//! Ordinary least squares on standardized features.

use ndarray::{s, Array1, Array2, Axis};

use super::{check_rows, check_training_set, not_fitted, Scorer};
use crate::domain::error::FactorpickError;

/// Added to the feature diagonal of the normal equations so constant or
/// collinear factors still give a solvable system.
const RIDGE: f64 = 1e-8;
const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
struct Fitted {
    means: Array1<f64>,
    scales: Array1<f64>,
    intercept: f64,
    weights: Array1<f64>,
}

impl Fitted {
    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.scales
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    fitted: Option<Fitted>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coefficients in standardized feature space, if fitted.
    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.weights)
    }
}

impl Scorer for LinearRegression {
    fn name(&self) -> &str {
        "linear"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FactorpickError> {
        let width = check_training_set(x, y)?;

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| FactorpickError::model("cannot fit on an empty training set"))?;
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|sd| if sd > 0.0 { sd } else { 1.0 });
        let z = (x - &means) / &scales;

        // Column 0 is the intercept.
        let ones = Array2::ones((x.nrows(), 1));
        let design = ndarray::concatenate(Axis(1), &[ones.view(), z.view()])
            .map_err(|e| FactorpickError::model(format!("design matrix: {e}")))?;
        let xt = design.t();
        let mut xtx = xt.dot(&design);
        let xty = xt.dot(y);
        for i in 1..=width {
            xtx[[i, i]] += RIDGE;
        }

        let beta = match cholesky_solve(&xtx, &xty) {
            Some(beta) => beta,
            None => solve(xtx, xty)?,
        };
        self.fitted = Some(Fitted {
            means,
            scales,
            intercept: beta[0],
            weights: beta.slice(s![1..]).to_owned(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FactorpickError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        check_rows(x, fitted.weights.len())?;
        Ok(fitted.standardize(x).dot(&fitted.weights) + fitted.intercept)
    }
}

/// `None` when `a` is not numerically positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b, then L^T x = z.
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }
    let mut out = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * out[j]).sum();
        out[i] = (z[i] - sum) / l[[i, i]];
    }
    Some(out)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, FactorpickError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < PIVOT_EPSILON {
            return Err(FactorpickError::model("normal equations are singular"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
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

    let mut out = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * out[k]).sum();
        out[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn recovers_exact_linear_relation() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| {
            if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 }
        });
        let y = x.map_axis(Axis(1), |r| 3.0 + 2.0 * r[0] - 0.5 * r[1]);

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let predicted = model.predict(&array![[100.0, 1.0]]).unwrap();
        assert_relative_eq!(predicted[0], 3.0 + 200.0 - 0.5, epsilon = 1e-4);
    }

    #[test]
    fn constant_feature_is_tolerated() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| if j == 0 { i as f64 } else { 5.0 });
        let y = x.column(0).mapv(|v| v * 0.1);

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let predicted = model.predict(&x).unwrap();
        for (p, t) in predicted.iter().zip(&y) {
            assert_relative_eq!(p, t, epsilon = 1e-6);
        }
        assert_relative_eq!(model.weights().unwrap()[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = LinearRegression::new();
        assert!(model.predict(&array![[1.0]]).is_err());
        assert!(model.weights().is_none());
    }

    #[test]
    fn predict_rejects_wrong_width() {
        let mut model = LinearRegression::new();
        model.fit(&array![[1.0], [2.0]], &array![1.0, 2.0]).unwrap();
        assert!(model.predict(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn cholesky_matches_elimination() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let chol = cholesky_solve(&a, &b).unwrap();
        let gauss = solve(a, b).unwrap();
        assert_relative_eq!(chol[0], gauss[0], epsilon = 1e-12);
        assert_relative_eq!(chol[1], gauss[1], epsilon = 1e-12);
        assert_relative_eq!(chol[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(chol[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cholesky_declines_indefinite_matrix() {
        assert!(cholesky_solve(&array![[0.0, 2.0], [2.0, 1.0]], &array![4.0, 3.0]).is_none());
    }

    #[test]
    fn solve_small_system() {
        let x = solve(array![[0.0, 2.0], [1.0, 1.0]], array![4.0, 3.0]).unwrap();
        assert_relative_eq!(x[0], 1.0);
        assert_relative_eq!(x[1], 2.0);
    }

    #[test]
    fn solve_singular_system_fails() {
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_err());
    }
}
