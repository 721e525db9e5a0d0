//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_dataset_cache;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod table_csv;
