//! Supervised scorers that map factor vectors to an expected return.
//!
//! A scorer is fitted on a labeled dataset and then ranks every candidate; the
//! top of that ranking becomes the evaluated selection.

pub mod forest;
pub mod linear;
pub mod polynomial;

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::FactorpickError;

pub use forest::{ForestConfig, RandomForestRegressor};
pub use linear::LinearRegression;
pub use polynomial::PolynomialRegression;

pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    /// `x` holds one row per sample and one column per factor.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FactorpickError>;

    /// One score per row of `x`. Fails if called before [`Scorer::fit`].
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FactorpickError>;
}

/// The scorers selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    Linear,
    Polynomial,
    Forest,
}

impl ScorerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScorerKind::Linear => "linear",
            ScorerKind::Polynomial => "polynomial",
            ScorerKind::Forest => "forest",
        }
    }

    pub fn build(self, seed: u64) -> Box<dyn Scorer> {
        match self {
            ScorerKind::Linear => Box::new(LinearRegression::new()),
            ScorerKind::Polynomial => Box::new(PolynomialRegression::new()),
            ScorerKind::Forest => Box::new(RandomForestRegressor::new(ForestConfig {
                seed,
                ..ForestConfig::default()
            })),
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScorerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ScorerKind::Linear),
            "polynomial" | "quadratic" => Ok(ScorerKind::Polynomial),
            "forest" | "random_forest" => Ok(ScorerKind::Forest),
            other => Err(format!(
                "unknown scorer '{other}' (expected linear, polynomial or forest)"
            )),
        }
    }
}

/// Parse a comma-separated scorer list, e.g. `"linear, forest"`.
pub fn parse_scorer_list(list: &str) -> Result<Vec<ScorerKind>, String> {
    let kinds = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(ScorerKind::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if kinds.is_empty() {
        return Err("no scorers listed".to_string());
    }
    Ok(kinds)
}

/// Shuffle `0..n` with a seeded RNG and split off `ceil(n * test_fraction)`
/// indices for testing. Returns `(train, test)`.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), FactorpickError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FactorpickError::model(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(FactorpickError::model(format!(
            "{n} rows cannot be split with test fraction {test_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Check a training set's shape; returns the feature count.
pub(crate) fn check_training_set(
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<usize, FactorpickError> {
    if x.nrows() == 0 {
        return Err(FactorpickError::model("cannot fit on an empty training set"));
    }
    if x.nrows() != y.len() {
        return Err(FactorpickError::model(format!(
            "{} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.ncols() == 0 {
        return Err(FactorpickError::model("training set has no features"));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FactorpickError::model("training set contains non-finite values"));
    }
    Ok(x.ncols())
}

/// `x` must have `width` columns.
pub(crate) fn check_rows(x: &Array2<f64>, width: usize) -> Result<(), FactorpickError> {
    if x.ncols() != width {
        return Err(FactorpickError::model(format!(
            "got {} features, expected {width}",
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn not_fitted(name: &str) -> FactorpickError {
    FactorpickError::model(format!("{name} scorer used before fitting"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scorer_kind_parsing() {
        assert_eq!("linear".parse::<ScorerKind>(), Ok(ScorerKind::Linear));
        assert_eq!(" Quadratic ".parse::<ScorerKind>(), Ok(ScorerKind::Polynomial));
        assert_eq!("forest".parse::<ScorerKind>(), Ok(ScorerKind::Forest));
        assert!("svm".parse::<ScorerKind>().is_err());
    }

    #[test]
    fn scorer_list_parsing() {
        assert_eq!(
            parse_scorer_list("linear, polynomial,forest").unwrap(),
            vec![ScorerKind::Linear, ScorerKind::Polynomial, ScorerKind::Forest]
        );
        assert!(parse_scorer_list(" , ").is_err());
        assert!(parse_scorer_list("linear,bogus").is_err());
    }

    #[test]
    fn built_scorers_are_named() {
        for kind in [ScorerKind::Linear, ScorerKind::Polynomial, ScorerKind::Forest] {
            assert_eq!(kind.build(1).name(), kind.as_str());
        }
    }

    #[test]
    fn split_partitions_all_indices() {
        let (train, test) = train_test_split(10, 0.2, 631).unwrap();
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        assert_eq!(
            train_test_split(50, 0.2, 631).unwrap(),
            train_test_split(50, 0.2, 631).unwrap()
        );
        assert_ne!(
            train_test_split(50, 0.2, 631).unwrap(),
            train_test_split(50, 0.2, 632).unwrap()
        );
    }

    #[test]
    fn split_rejects_degenerate_input() {
        assert!(train_test_split(10, 0.0, 1).is_err());
        assert!(train_test_split(10, 1.0, 1).is_err());
        assert!(train_test_split(1, 0.2, 1).is_err());
        assert!(train_test_split(0, 0.2, 1).is_err());
    }

    #[test]
    fn training_set_shape_checks() {
        assert!(check_training_set(&Array2::zeros((0, 2)), &Array1::zeros(0)).is_err());
        assert!(check_training_set(&array![[1.0]], &array![1.0, 2.0]).is_err());
        assert!(check_training_set(&Array2::zeros((2, 0)), &array![1.0, 2.0]).is_err());
        assert!(check_training_set(&array![[f64::NAN]], &array![1.0]).is_err());
        assert!(check_training_set(&array![[1.0]], &array![f64::INFINITY]).is_err());
        assert_eq!(check_training_set(&array![[1.0, 2.0]], &array![1.0]).unwrap(), 2);
        assert!(check_rows(&array![[1.0, 2.0]], 3).is_err());
    }
}
