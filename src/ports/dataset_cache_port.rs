//! Persistence port for labeled datasets.

use crate::domain::error::FactorpickError;
use crate::domain::labeling::{CacheKey, LabeledDataset};

/// Store of labeled datasets keyed by the content hash of their inputs.
pub trait DatasetCachePort {
    /// `Ok(None)` on a miss.
    fn get(&self, key: &CacheKey) -> Result<Option<LabeledDataset>, FactorpickError>;

    /// Replaces any existing entry for `key`.
    fn put(&self, key: &CacheKey, dataset: &LabeledDataset) -> Result<(), FactorpickError>;

    /// Returns whether an entry was removed.
    fn invalidate(&self, key: &CacheKey) -> Result<bool, FactorpickError>;

    /// Returns the number of entries removed.
    fn clear(&self) -> Result<usize, FactorpickError>;

    fn contains(&self, key: &CacheKey) -> Result<bool, FactorpickError> {
        Ok(self.get(key)?.is_some())
    }
}
