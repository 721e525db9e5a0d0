//! CSV price series adapter: one `<code>.csv` per asset.

use crate::domain::error::FactorpickError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const PRICE_HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    price_dir: PathBuf,
}

impl CsvAdapter {
    pub fn new(price_dir: PathBuf) -> Self {
        Self { price_dir }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.price_dir.join(format!("{}.csv", code))
    }

    /// Codes that have a price file, sorted.
    pub fn list_codes(&self) -> Result<Vec<String>, FactorpickError> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.price_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                codes.push(stem.to_string());
            }
        }
        codes.sort();
        Ok(codes)
    }
}

fn malformed(path: &std::path::Path, e: csv::Error) -> FactorpickError {
    FactorpickError::data_format(format!("{}: {}", path.display(), e))
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    line: u64,
    path: &std::path::Path,
) -> Result<T, FactorpickError>
where
    T::Err: std::fmt::Display,
{
    let name = PRICE_HEADER[index];
    let raw = record.get(index).ok_or_else(|| {
        FactorpickError::data_format(format!("{}:{}: missing {} column", path.display(), line, name))
    })?;
    raw.trim().parse().map_err(|e| {
        FactorpickError::data_format(format!(
            "{}:{}: invalid {} value '{}': {}",
            path.display(),
            line,
            name,
            raw,
            e
        ))
    })
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FactorpickError> {
        let path = self.csv_path(code);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FactorpickError::insufficient_history(code, "no price file"));
            }
            Err(e) => return Err(e.into()),
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| malformed(&path, e))?.clone();
        if headers.iter().map(str::trim).ne(PRICE_HEADER.iter().copied()) {
            return Err(FactorpickError::data_format(format!(
                "{}: expected header {}",
                path.display(),
                PRICE_HEADER.join(",")
            )));
        }

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| malformed(&path, e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date_str = record.get(0).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                FactorpickError::data_format(format!(
                    "{}:{}: invalid date '{}': {}",
                    path.display(),
                    line,
                    date_str,
                    e
                ))
            })?;

            if date < start_date || date > end_date {
                continue;
            }

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: parse_field(&record, 1, line, &path)?,
                high: parse_field(&record, 2, line, &path)?,
                low: parse_field(&record, 3, line, &path)?,
                close: parse_field(&record, 4, line, &path)?,
                volume: parse_field::<f64>(&record, 5, line, &path)? as i64,
            });
        }

        bars.sort_by_key(|b| b.date);
        if let Some(pair) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(FactorpickError::data_format(format!(
                "{}: more than one bar dated {}",
                path.display(),
                pair[0].date
            )));
        }
        Ok(bars)
    }
}
