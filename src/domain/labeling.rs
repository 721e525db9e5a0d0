//! Return labeling: join each candidate's factors with the annualized return
//! of holding it alone over a window.

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::fmt;

use crate::domain::backtest::{simulate, BacktestConfig, SimulationWindow};
use crate::domain::candidate::{CandidateStock, FactorTable};
use crate::domain::error::FactorpickError;
use crate::ports::data_port::DataPort;
use crate::ports::dataset_cache_port::DatasetCachePort;

/// Column holding the label in persisted datasets.
pub const RETURN_COLUMN: &str = "ar";

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub candidate: CandidateStock,
    pub annualized_return: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    pub factor_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub rows: Vec<LabeledRow>,
}

impl LabeledDataset {
    pub fn empty(factor_columns: Vec<String>, text_columns: Vec<String>) -> Self {
        Self {
            factor_columns,
            text_columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn codes(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.candidate.code.clone()).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.annualized_return).collect()
    }

    /// One row per labeled candidate, one column per factor.
    pub fn factor_matrix(&self) -> Result<Array2<f64>, FactorpickError> {
        let width = self.factor_columns.len();
        if let Some(row) = self.rows.iter().find(|r| r.candidate.factors.len() != width) {
            return Err(FactorpickError::data_format(format!(
                "{} has {} factors, expected {width}",
                row.candidate.code,
                row.candidate.factors.len()
            )));
        }
        let flat: Vec<f64> = self
            .rows
            .iter()
            .flat_map(|r| r.candidate.factors.iter().copied())
            .collect();
        Array2::from_shape_vec((self.rows.len(), width), flat)
            .map_err(|e| FactorpickError::data_format(format!("factor matrix: {e}")))
    }

    pub fn return_vector(&self) -> Array1<f64> {
        self.rows.iter().map(|r| r.annualized_return).collect()
    }

    pub fn has_schema_of(&self, table: &FactorTable) -> bool {
        self.factor_columns == table.factor_columns && self.text_columns == table.text_columns
    }

    /// The candidates that were labeled, without their returns.
    pub fn candidates(&self) -> FactorTable {
        FactorTable {
            factor_columns: self.factor_columns.clone(),
            text_columns: self.text_columns.clone(),
            rows: self.rows.iter().map(|r| r.candidate.clone()).collect(),
        }
    }
}

/// An asset left out of the dataset because its history does not cover the
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAsset {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelOutcome {
    pub dataset: LabeledDataset,
    /// Empty when the dataset came from the cache.
    pub skipped: Vec<SkippedAsset>,
    pub from_cache: bool,
}

/// Content hash identifying one labeling run's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(
        candidates: &FactorTable,
        window: &SimulationWindow,
        config: &BacktestConfig,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        let h = &mut hasher;

        for column in &candidates.factor_columns {
            hash_field(h, column.as_bytes());
        }
        hash_field(h, b"|text|");
        for column in &candidates.text_columns {
            hash_field(h, column.as_bytes());
        }
        hash_field(h, b"|rows|");
        for row in &candidates.rows {
            hash_field(h, row.code.as_bytes());
            hash_field(h, row.name.as_bytes());
            for text in &row.text {
                hash_field(h, text.as_bytes());
            }
            for factor in &row.factors {
                hash_field(h, &factor.to_bits().to_le_bytes());
            }
        }
        hash_field(h, b"|window|");
        hash_field(h, window.start_date.to_string().as_bytes());
        hash_field(h, window.end_date.to_string().as_bytes());
        hash_field(h, &window.initial_cash.to_bits().to_le_bytes());
        hash_field(h, b"|config|");
        hash_field(h, &config.allocation_fraction.to_bits().to_le_bytes());
        hash_field(h, &config.lot_size.to_le_bytes());
        hash_field(h, &config.coverage_tolerance_days.to_le_bytes());

        CacheKey(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Length-prefixed so adjacent fields cannot run together.
fn hash_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Simulate every candidate alone over `window` and attach its annualized
/// return.
///
/// Candidates are simulated in parallel; rows come back in candidate order.
/// Insufficient history skips the asset, any other failure aborts.
pub fn label(
    data_port: &dyn DataPort,
    candidates: &FactorTable,
    window: &SimulationWindow,
    config: &BacktestConfig,
) -> Result<LabelOutcome, FactorpickError> {
    if candidates.resolve_column(RETURN_COLUMN).is_some() {
        return Err(FactorpickError::data_format(format!(
            "candidate table already has a '{RETURN_COLUMN}' column"
        )));
    }

    let results: Vec<_> = candidates
        .rows
        .par_iter()
        .map(|candidate| {
            let codes = [candidate.code.clone()];
            let result = simulate(data_port, &codes, window, config);
            if let Ok(trade) = &result {
                tracing::debug!(
                    code = %candidate.code,
                    annualized_return = trade.annualized_return,
                    final_value = trade.final_value,
                    "labeled"
                );
            }
            (candidate, result)
        })
        .collect();

    let mut dataset = LabeledDataset::empty(
        candidates.factor_columns.clone(),
        candidates.text_columns.clone(),
    );
    let mut skipped = Vec::new();

    for (candidate, result) in results {
        match result {
            Ok(trade) => dataset.rows.push(LabeledRow {
                candidate: candidate.clone(),
                annualized_return: trade.annualized_return,
            }),
            Err(e) if e.is_insufficient_history() => {
                tracing::warn!(code = %candidate.code, error = %e, "skipping asset");
                skipped.push(SkippedAsset {
                    code: candidate.code.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(code = %candidate.code, error = %e, "labeling aborted");
                return Err(e);
            }
        }
    }

    tracing::info!(
        candidates = candidates.len(),
        labeled = dataset.len(),
        skipped = skipped.len(),
        "labeling complete"
    );

    Ok(LabelOutcome {
        dataset,
        skipped,
        from_cache: false,
    })
}

/// [`label`], short-circuited by a persisted dataset for the same inputs.
///
/// A cached entry whose schema no longer matches the candidates is treated as
/// a miss and overwritten.
pub fn label_with_cache(
    cache: &dyn DatasetCachePort,
    data_port: &dyn DataPort,
    candidates: &FactorTable,
    window: &SimulationWindow,
    config: &BacktestConfig,
) -> Result<LabelOutcome, FactorpickError> {
    let key = CacheKey::compute(candidates, window, config);

    if let Some(dataset) = cache.get(&key)? {
        if dataset.has_schema_of(candidates) {
            tracing::info!(key = %key, rows = dataset.len(), "labeled dataset loaded from cache");
            return Ok(LabelOutcome {
                dataset,
                skipped: Vec::new(),
                from_cache: true,
            });
        }
        tracing::warn!(key = %key, "cached dataset schema differs, recomputing");
    }

    let outcome = label(data_port, candidates, window, config)?;
    cache.put(&key, &outcome.dataset)?;
    Ok(outcome)
}
