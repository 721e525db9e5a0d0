//! Directory-backed labeled dataset cache: one `<key>.csv` per entry, in the
//! typed layout so an entry reads back with the schema it was stored under.

use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::table_csv;
use crate::domain::error::FactorpickError;
use crate::domain::labeling::{CacheKey, LabeledDataset};
use crate::ports::dataset_cache_port::DatasetCachePort;

#[derive(Debug, Clone)]
pub struct CsvDatasetCache {
    cache_dir: PathBuf,
}

impl CsvDatasetCache {
    /// The directory is created if it does not exist.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self, FactorpickError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.csv", key))
    }

    fn entries(&self) -> Result<Vec<PathBuf>, FactorpickError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("csv") {
                out.push(path);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> Result<usize, FactorpickError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, FactorpickError> {
        Ok(self.len()? == 0)
    }
}

impl DatasetCachePort for CsvDatasetCache {
    fn get(&self, key: &CacheKey) -> Result<Option<LabeledDataset>, FactorpickError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&path)?;
        table_csv::read_typed_labeled_dataset(file, &path.display().to_string()).map(Some)
    }

    fn put(&self, key: &CacheKey, dataset: &LabeledDataset) -> Result<(), FactorpickError> {
        let path = self.entry_path(key);
        // Written aside and renamed so a crash never leaves a partial entry.
        let staging = path.with_extension("csv.partial");
        table_csv::write_typed_labeled_dataset(fs::File::create(&staging)?, dataset)?;
        fs::rename(&staging, &path)?;
        tracing::debug!(path = %path.display(), rows = dataset.len(), "dataset cached");
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<bool, FactorpickError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    fn clear(&self) -> Result<usize, FactorpickError> {
        let entries = self.entries()?;
        for path in &entries {
            fs::remove_file(path)?;
        }
        Ok(entries.len())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool, FactorpickError> {
        Ok(self.entry_path(key).exists())
    }
}
