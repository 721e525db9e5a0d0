//! Summary statistics over labeled returns and scorer fit quality.

use crate::domain::error::FactorpickError;

/// One equal-width bucket of a return histogram. `upper` is inclusive for the
/// last bucket only.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Distribution of annualized returns across a labeled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub positive: usize,
    pub histogram: Vec<HistogramBin>,
}

impl ReturnSummary {
    /// Summarize `returns` into `bins` equal-width buckets.
    ///
    /// Non-finite values are rejected rather than silently skewing the mean.
    pub fn compute(returns: &[f64], bins: usize) -> Result<Self, FactorpickError> {
        if returns.is_empty() {
            return Err(FactorpickError::data_format("no returns to summarize"));
        }
        if let Some(bad) = returns.iter().find(|r| !r.is_finite()) {
            return Err(FactorpickError::data_format(format!(
                "non-finite return {bad} in dataset"
            )));
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        Ok(Self {
            count: returns.len(),
            mean,
            median,
            stddev: variance.sqrt(),
            min,
            max,
            positive: returns.iter().filter(|&&r| r > 0.0).count(),
            histogram: histogram(&sorted, min, max, bins.max(1)),
        })
    }
}

fn histogram(sorted: &[f64], min: f64, max: f64, bins: usize) -> Vec<HistogramBin> {
    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for &value in sorted {
        let idx = if width > 0.0 {
            (((value - min) / width) as usize).min(bins - 1)
        } else {
            0
        };
        out[idx].count += 1;
    }
    out
}

/// Root mean squared error between aligned slices.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Result<f64, FactorpickError> {
    check_aligned(actual, predicted)?;
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok((sse / actual.len() as f64).sqrt())
}

/// Coefficient of determination. A constant `actual` yields 0 unless the
/// prediction is exact, in which case it is 1.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Result<f64, FactorpickError> {
    check_aligned(actual, predicted)?;
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

fn check_aligned(actual: &[f64], predicted: &[f64]) -> Result<(), FactorpickError> {
    if actual.is_empty() {
        return Err(FactorpickError::model("cannot score an empty sample"));
    }
    if actual.len() != predicted.len() {
        return Err(FactorpickError::model(format!(
            "{} targets but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    Ok(())
}
