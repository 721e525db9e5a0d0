#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};
use factorpick::domain::backtest::{BacktestConfig, SimulationWindow};
use factorpick::domain::candidate::{CandidateStock, FactorTable};
use factorpick::domain::error::FactorpickError;
pub use factorpick::domain::ohlcv::OhlcvBar;
use factorpick::ports::data_port::DataPort;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: AtomicUsize,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    /// Fetching `code` fails with a data format error.
    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FactorpickError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.errors.get(code) {
            return Err(FactorpickError::data_format(reason.clone()));
        }
        match self.data.get(code) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.date >= start_date && b.date <= end_date)
                .cloned()
                .collect()),
            None => Err(FactorpickError::insufficient_history(code, "no price data")),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        date,
        open: close,
        high: close,
        low: close,
        close,
        volume: 10_000,
    }
}

pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .collect()
}

/// Weekday bars over `[start, end]` whose close moves linearly from
/// `start_price` to `end_price`.
pub fn linear_bars(
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
    start_price: f64,
    end_price: f64,
) -> Vec<OhlcvBar> {
    let dates = weekdays(start, end);
    let last = (dates.len().max(2) - 1) as f64;
    dates
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            make_bar(
                code,
                d,
                start_price + (end_price - start_price) * i as f64 / last,
            )
        })
        .collect()
}

pub fn window_2019(initial_cash: f64) -> SimulationWindow {
    SimulationWindow::new(date(2019, 1, 1), date(2019, 12, 31), initial_cash).unwrap()
}

pub fn default_config() -> BacktestConfig {
    BacktestConfig::default()
}

/// A factor table with `npr` and `pe` factors and an `industry` text column.
pub fn candidates(rows: &[(&str, f64, f64)]) -> FactorTable {
    FactorTable::new(
        vec!["npr".into(), "pe".into()],
        vec!["industry".into()],
        rows.iter()
            .map(|(code, npr, pe)| CandidateStock {
                code: code.to_string(),
                name: format!("Stock {code}"),
                factors: vec![*npr, *pe],
                text: vec!["Bank".into()],
            })
            .collect(),
    )
    .unwrap()
}

pub fn write_price_csv(dir: &std::path::Path, code: &str, bars: &[OhlcvBar]) {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{code}.csv")), out).unwrap();
}
