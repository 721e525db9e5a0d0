//! Core domain types and logic.

pub mod backtest;
pub mod candidate;
pub mod code_data;
pub mod config_validation;
pub mod eligibility;
pub mod eligibility_parser;
pub mod error;
pub mod execution;
pub mod labeling;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod scorer;
pub mod selection;
pub mod universe;
