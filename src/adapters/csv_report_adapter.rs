//! CSV strategy report: one row per evaluated method.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::error::FactorpickError;
use crate::domain::selection::StrategyReport;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    method: &'a str,
    codes: String,
    start_date: String,
    end_date: String,
    initial_cash: f64,
    final_value: f64,
    annualized_return: f64,
}

impl<'a> From<&'a StrategyReport> for ReportRow<'a> {
    fn from(report: &'a StrategyReport) -> Self {
        ReportRow {
            method: &report.method,
            codes: report.codes.join(";"),
            start_date: report.window.start_date.to_string(),
            end_date: report.window.end_date.to_string(),
            initial_cash: report.window.initial_cash,
            final_value: report.final_value,
            annualized_return: report.annualized_return,
        }
    }
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn write_to<W: Write>(writer: W, reports: &[StrategyReport]) -> Result<(), FactorpickError> {
        let mut wtr = csv::Writer::from_writer(writer);
        if reports.is_empty() {
            wtr.write_record([
                "method",
                "codes",
                "start_date",
                "end_date",
                "initial_cash",
                "final_value",
                "annualized_return",
            ])?;
        }
        for report in reports {
            wtr.serialize(ReportRow::from(report))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, reports: &[StrategyReport], output_path: &str) -> Result<(), FactorpickError> {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::write_to(File::create(path)?, reports)?;
        tracing::info!(path = output_path, rows = reports.len(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{simulate, BacktestConfig, SimulationWindow};
    use crate::domain::ohlcv::OhlcvBar;
    use crate::ports::data_port::DataPort;
    use chrono::NaiveDate;

    struct TwoDays;

    impl DataPort for TwoDays {
        fn fetch_ohlcv(
            &self,
            code: &str,
            start_date: NaiveDate,
            end_date: NaiveDate,
        ) -> Result<Vec<OhlcvBar>, FactorpickError> {
            Ok([(start_date, 10.0), (end_date, 11.0)]
                .into_iter()
                .map(|(date, close)| OhlcvBar {
                    code: code.to_string(),
                    date,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100,
                })
                .collect())
        }
    }

    fn report() -> StrategyReport {
        let window = SimulationWindow::new(
            NaiveDate::from_ymd_opt(2019, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            100_000.0,
        )
        .unwrap();
        let codes = vec!["600000".to_string(), "600004".to_string()];
        let trade = simulate(&TwoDays, &codes, &window, &BacktestConfig::default()).unwrap();
        StrategyReport {
            method: "linear".into(),
            codes,
            window,
            annualized_return: trade.annualized_return,
            final_value: trade.final_value,
            trade,
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let mut out = Vec::new();
        CsvReportAdapter::write_to(&mut out, &[report()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "method,codes,start_date,end_date,initial_cash,final_value,annualized_return"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("linear,600000;600004,2019-01-02,2019-12-31,100000.0,109000.0,"));
    }

    #[test]
    fn empty_report_still_has_header() {
        let mut out = Vec::new();
        CsvReportAdapter::write_to(&mut out, &[]).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("method,codes"));
    }

    #[test]
    fn port_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.csv");
        CsvReportAdapter
            .write(&[report()], path.to_str().unwrap())
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 2);
    }
}
