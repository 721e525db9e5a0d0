//! Historical price series port.

use crate::domain::error::FactorpickError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

/// Read-only provider of daily bars.
///
/// Implementations are shared across the labeling worker pool, hence
/// `Send + Sync`. A code with no stored series should fail with
/// [`FactorpickError::InsufficientHistory`]; malformed stored data with
/// [`FactorpickError::DataFormat`].
pub trait DataPort: Send + Sync {
    /// Bars for `code` dated within `[start_date, end_date]`, ordered by date.
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FactorpickError>;
}
