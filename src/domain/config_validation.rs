//! Configuration validation and typed settings.
//!
//! Every command reads its settings through these functions, so a value that
//! passes `validate` is exactly the value a run will use.

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::domain::backtest::{BacktestConfig, SimulationWindow};
use crate::domain::eligibility::EligibilityRule;
use crate::domain::eligibility_parser;
use crate::domain::error::FactorpickError;
use crate::domain::scorer::{parse_scorer_list, ScorerKind};
use crate::domain::universe::default_rules;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_CACHE_DIR: &str = "cache";
pub const DEFAULT_LABEL_START: &str = "2017-01-01";
pub const DEFAULT_LABEL_END: &str = "2020-07-31";
pub const DEFAULT_LABEL_CASH: f64 = 100_000.0;
pub const DEFAULT_EVAL_START: &str = "2010-01-01";
pub const DEFAULT_EVAL_END: &str = "2020-07-01";
pub const DEFAULT_EVAL_CASH: f64 = 1_000_000.0;
pub const DEFAULT_TOP_K: i64 = 10;
pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_SEED: i64 = 631;
pub const DEFAULT_SCORERS: &str = "linear, polynomial, forest";

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub factor_table: PathBuf,
    pub price_dir: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelSettings {
    pub window: SimulationWindow,
    pub output: Option<PathBuf>,
    pub use_cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateSettings {
    pub window: SimulationWindow,
    pub top_k: usize,
    pub scorers: Vec<ScorerKind>,
    pub test_size: f64,
    pub seed: u64,
    pub report: Option<PathBuf>,
}

/// Check every section a full `evaluate` run would read.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), FactorpickError> {
    data_settings(config)?;
    universe_rules(config)?;
    backtest_config(config)?;
    label_settings(config)?;
    evaluate_settings(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorpickError {
    FactorpickError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_path(config: &dyn ConfigPort, section: &str, key: &str) -> Result<PathBuf, FactorpickError> {
    non_blank(config, section, key)
        .map(PathBuf::from)
        .ok_or_else(|| FactorpickError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

/// A float that, when present, must parse.
fn double(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, FactorpickError> {
    match non_blank(config, section, key) {
        None => Ok(default),
        Some(raw) if raw.parse::<f64>().is_ok() => Ok(config.get_double(section, key, default)),
        Some(raw) => Err(invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

/// An integer that, when present, must parse.
fn int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, FactorpickError> {
    match non_blank(config, section, key) {
        None => Ok(default),
        Some(raw) if raw.parse::<i64>().is_ok() => Ok(config.get_int(section, key, default)),
        Some(raw) => Err(invalid(section, key, format!("'{raw}' is not an integer"))),
    }
}

fn date(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> Result<NaiveDate, FactorpickError> {
    let raw = non_blank(config, section, key).unwrap_or_else(|| default.to_string());
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| invalid(section, key, format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn window(
    config: &dyn ConfigPort,
    section: &str,
    defaults: (&str, &str, f64),
) -> Result<SimulationWindow, FactorpickError> {
    let start_date = date(config, section, "start_date", defaults.0)?;
    let end_date = date(config, section, "end_date", defaults.1)?;
    if start_date >= end_date {
        return Err(invalid(section, "start_date", "start_date must be before end_date"));
    }
    let initial_cash = double(config, section, "initial_cash", defaults.2)?;
    if !initial_cash.is_finite() || initial_cash <= 0.0 {
        return Err(invalid(section, "initial_cash", "initial_cash must be positive"));
    }
    SimulationWindow::new(start_date, end_date, initial_cash)
}

pub fn data_settings(config: &dyn ConfigPort) -> Result<DataSettings, FactorpickError> {
    Ok(DataSettings {
        factor_table: required_path(config, "data", "factor_table")?,
        price_dir: required_path(config, "data", "price_dir")?,
        cache_dir: non_blank(config, "data", "cache_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
    })
}

/// `[universe] rules`, or the default screen when absent or blank.
pub fn universe_rules(config: &dyn ConfigPort) -> Result<Vec<EligibilityRule>, FactorpickError> {
    match non_blank(config, "universe", "rules") {
        None => Ok(default_rules()),
        Some(text) => Ok(eligibility_parser::parse(&text)?),
    }
}

pub fn backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, FactorpickError> {
    let defaults = BacktestConfig::default();

    let allocation_fraction = double(config, "backtest", "allocation_fraction", defaults.allocation_fraction)?;
    if !(allocation_fraction > 0.0 && allocation_fraction <= 1.0) {
        return Err(invalid(
            "backtest",
            "allocation_fraction",
            "allocation_fraction must be in (0, 1]",
        ));
    }

    let lot_size = int(config, "backtest", "lot_size", defaults.lot_size)?;
    if lot_size <= 0 {
        return Err(invalid("backtest", "lot_size", "lot_size must be positive"));
    }

    let coverage_tolerance_days = int(
        config,
        "backtest",
        "coverage_tolerance_days",
        defaults.coverage_tolerance_days,
    )?;
    if coverage_tolerance_days < 0 {
        return Err(invalid(
            "backtest",
            "coverage_tolerance_days",
            "coverage_tolerance_days must be non-negative",
        ));
    }

    Ok(BacktestConfig {
        allocation_fraction,
        lot_size,
        coverage_tolerance_days,
    })
}

pub fn label_settings(config: &dyn ConfigPort) -> Result<LabelSettings, FactorpickError> {
    Ok(LabelSettings {
        window: window(config, "label", (DEFAULT_LABEL_START, DEFAULT_LABEL_END, DEFAULT_LABEL_CASH))?,
        output: non_blank(config, "label", "output").map(PathBuf::from),
        use_cache: config.get_bool("label", "use_cache", true),
    })
}

pub fn evaluate_settings(config: &dyn ConfigPort) -> Result<EvaluateSettings, FactorpickError> {
    let window = window(config, "evaluate", (DEFAULT_EVAL_START, DEFAULT_EVAL_END, DEFAULT_EVAL_CASH))?;

    let top_k = int(config, "evaluate", "top_k", DEFAULT_TOP_K)?;
    if top_k <= 0 {
        return Err(invalid("evaluate", "top_k", "top_k must be positive"));
    }

    let scorer_list = non_blank(config, "evaluate", "scorers").unwrap_or_else(|| DEFAULT_SCORERS.to_string());
    let scorers = parse_scorer_list(&scorer_list).map_err(|reason| invalid("evaluate", "scorers", reason))?;

    let test_size = double(config, "evaluate", "test_size", DEFAULT_TEST_SIZE)?;
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(invalid("evaluate", "test_size", "test_size must be in (0, 1)"));
    }

    let seed = int(config, "evaluate", "seed", DEFAULT_SEED)?;
    if seed < 0 {
        return Err(invalid("evaluate", "seed", "seed must be non-negative"));
    }

    Ok(EvaluateSettings {
        window,
        top_k: top_k as usize,
        scorers,
        test_size,
        seed: seed as u64,
        report: non_blank(config, "evaluate", "report").map(PathBuf::from),
    })
}
