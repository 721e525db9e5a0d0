//! Report output port.

use crate::domain::error::FactorpickError;
use crate::domain::selection::StrategyReport;

/// Port for writing strategy evaluation reports.
pub trait ReportPort {
    fn write(&self, reports: &[StrategyReport], output_path: &str) -> Result<(), FactorpickError>;
}
