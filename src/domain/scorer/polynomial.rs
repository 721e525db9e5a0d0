//! Degree-2 polynomial regression.

use ndarray::{Array1, Array2};

use super::{check_rows, check_training_set, not_fitted, LinearRegression, Scorer};
use crate::domain::error::FactorpickError;

/// Linear terms, then `x_i * x_j` for every `i <= j`. No bias column; the
/// inner regression fits its own intercept.
pub fn expand_degree2(x: &Array2<f64>) -> Array2<f64> {
    let n = x.ncols();
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect();
    Array2::from_shape_fn((x.nrows(), n + pairs.len()), |(r, c)| {
        if c < n {
            x[[r, c]]
        } else {
            let (i, j) = pairs[c - n];
            x[[r, i]] * x[[r, j]]
        }
    })
}

#[derive(Debug, Clone, Default)]
pub struct PolynomialRegression {
    inner: LinearRegression,
    width: Option<usize>,
}

impl PolynomialRegression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scorer for PolynomialRegression {
    fn name(&self) -> &str {
        "polynomial"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FactorpickError> {
        let width = check_training_set(x, y)?;
        self.inner.fit(&expand_degree2(x), y)?;
        self.width = Some(width);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FactorpickError> {
        let width = self.width.ok_or_else(|| not_fitted(self.name()))?;
        check_rows(x, width)?;
        self.inner.predict(&expand_degree2(x))
    }
}
