//! Turning scores into a top-K basket and measuring how that basket performs.

use std::cmp::Ordering;

use ndarray::Axis;

use crate::domain::backtest::{simulate, BacktestConfig, SimulationWindow, TradeResult};
use crate::domain::error::FactorpickError;
use crate::domain::labeling::LabeledDataset;
use crate::domain::metrics::{r2_score, rmse};
use crate::domain::scorer::{train_test_split, Scorer};
use crate::ports::data_port::DataPort;

/// A scorer's picks plus its fit quality on the held-out rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub method: String,
    pub test_rmse: f64,
    pub test_r2: f64,
    pub codes: Vec<String>,
}

/// Outcome of holding one selection over an evaluation window.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReport {
    /// Which scorer (or other method) produced the selection.
    pub method: String,
    pub codes: Vec<String>,
    pub window: SimulationWindow,
    pub annualized_return: f64,
    pub final_value: f64,
    pub trade: TradeResult,
}

/// Order `codes` by descending score and keep the first `k`.
///
/// Ties break on identifier; NaN scores rank after every finite one.
pub fn rank_top_k(codes: &[String], scores: &[f64], k: usize) -> Result<Vec<String>, FactorpickError> {
    if codes.len() != scores.len() {
        return Err(FactorpickError::model(format!(
            "{} codes but {} scores",
            codes.len(),
            scores.len()
        )));
    }

    let mut ranked: Vec<(&String, f64)> = codes.iter().zip(scores.iter().copied()).collect();
    ranked.sort_by(|(code_a, a), (code_b, b)| {
        let by_score = match (a.is_finite(), b.is_finite()) {
            (true, true) => b.total_cmp(a),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        };
        by_score.then_with(|| code_a.cmp(code_b))
    });

    Ok(ranked.into_iter().take(k).map(|(code, _)| code.clone()).collect())
}

/// Fit `scorer` on a seeded train split of `dataset`, score the held-out rows,
/// then rank every labeled candidate and keep the best `k`.
pub fn select_top_k(
    scorer: &mut dyn Scorer,
    dataset: &LabeledDataset,
    test_size: f64,
    seed: u64,
    k: usize,
) -> Result<Selection, FactorpickError> {
    let x = dataset.factor_matrix()?;
    let y = dataset.return_vector();
    let (train, test) = train_test_split(x.nrows(), test_size, seed)?;

    scorer.fit(&x.select(Axis(0), &train), &y.select(Axis(0), &train))?;
    let y_test = y.select(Axis(0), &test).to_vec();
    let predicted = scorer.predict(&x.select(Axis(0), &test))?.to_vec();
    let test_rmse = rmse(&y_test, &predicted)?;
    let test_r2 = r2_score(&y_test, &predicted)?;
    tracing::info!(
        method = scorer.name(),
        train = train.len(),
        test = test.len(),
        rmse = test_rmse,
        r2 = test_r2,
        "scorer fitted"
    );

    let scores = scorer.predict(&x)?;
    let codes = rank_top_k(&dataset.codes(), &scores.to_vec(), k)?;

    Ok(Selection {
        method: scorer.name().to_string(),
        test_rmse,
        test_r2,
        codes,
    })
}

/// Hold exactly `selected` over `window` in one multi-asset run.
///
/// Unlike labeling, a selected asset without full history fails the whole
/// evaluation.
pub fn evaluate(
    data_port: &dyn DataPort,
    selected: &[String],
    window: &SimulationWindow,
    config: &BacktestConfig,
    method: &str,
) -> Result<StrategyReport, FactorpickError> {
    if selected.is_empty() {
        return Err(FactorpickError::data_format(format!(
            "{method}: nothing selected to evaluate"
        )));
    }

    let trade = simulate(data_port, selected, window, config).map_err(|e| {
        tracing::error!(method, error = %e, "evaluation failed");
        e
    })?;

    tracing::info!(
        method,
        assets = selected.len(),
        annualized_return = trade.annualized_return,
        final_value = trade.final_value,
        "selection evaluated"
    );

    Ok(StrategyReport {
        method: method.to_string(),
        codes: selected.to_vec(),
        window: window.clone(),
        annualized_return: trade.annualized_return,
        final_value: trade.final_value,
        trade,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use approx::assert_relative_eq;
    use chrono::{Datelike, Duration, NaiveDate};

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rank_descending_with_code_ties() {
        let ranked = rank_top_k(
            &codes(&["600004", "600000", "600006", "600008"]),
            &[0.5, 0.5, 0.9, -1.0],
            3,
        )
        .unwrap();
        assert_eq!(ranked, codes(&["600006", "600000", "600004"]));
    }

    #[test]
    fn rank_puts_nan_last() {
        let ranked = rank_top_k(&codes(&["A", "B", "C"]), &[f64::NAN, -5.0, f64::NAN], 3).unwrap();
        assert_eq!(ranked, codes(&["B", "A", "C"]));
    }

    #[test]
    fn rank_k_larger_than_input() {
        let ranked = rank_top_k(&codes(&["A", "B"]), &[1.0, 2.0], 10).unwrap();
        assert_eq!(ranked, codes(&["B", "A"]));
        assert!(rank_top_k(&codes(&["A"]), &[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn rank_rejects_length_mismatch() {
        assert!(rank_top_k(&codes(&["A"]), &[1.0, 2.0], 1).is_err());
    }

    fn linear_dataset(n: usize) -> LabeledDataset {
        use crate::domain::candidate::CandidateStock;
        use crate::domain::labeling::LabeledRow;

        LabeledDataset {
            factor_columns: vec!["npr".into(), "pe".into()],
            text_columns: vec![],
            rows: (0..n)
                .map(|i| {
                    let npr = i as f64;
                    let pe = ((i * 7) % 5) as f64;
                    LabeledRow {
                        candidate: CandidateStock {
                            code: format!("{}", 600000 + i),
                            name: format!("Stock {i}"),
                            factors: vec![npr, pe],
                            text: vec![],
                        },
                        annualized_return: 0.01 * npr - 0.02 * pe,
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn linear_selection_picks_highest_true_returns() {
        let dataset = linear_dataset(40);
        let mut scorer = crate::domain::scorer::LinearRegression::new();
        let selection = select_top_k(&mut scorer, &dataset, 0.2, 631, 3).unwrap();

        assert_eq!(selection.method, "linear");
        assert!(selection.test_rmse < 1e-6);
        assert!(selection.test_r2 > 0.999);

        let truth = rank_top_k(&dataset.codes(), &dataset.returns(), 3).unwrap();
        assert_eq!(selection.codes, truth);
    }

    #[test]
    fn selection_needs_enough_rows_to_split() {
        let dataset = linear_dataset(1);
        let mut scorer = crate::domain::scorer::LinearRegression::new();
        let err = select_top_k(&mut scorer, &dataset, 0.2, 631, 3).unwrap_err();
        assert!(matches!(err, FactorpickError::Model { .. }));
    }

    struct FlatPort;

    impl DataPort for FlatPort {
        fn fetch_ohlcv(
            &self,
            code: &str,
            start_date: NaiveDate,
            end_date: NaiveDate,
        ) -> Result<Vec<OhlcvBar>, FactorpickError> {
            if code == "600999" {
                return Err(FactorpickError::insufficient_history(code, "no price data"));
            }
            let mut bars = Vec::new();
            let mut date = start_date;
            while date <= end_date {
                if date.weekday().number_from_monday() <= 5 {
                    bars.push(OhlcvBar {
                        code: code.to_string(),
                        date,
                        open: 10.0,
                        high: 10.0,
                        low: 10.0,
                        close: 10.0,
                        volume: 1_000,
                    });
                }
                date += Duration::days(1);
            }
            Ok(bars)
        }
    }

    fn window() -> SimulationWindow {
        SimulationWindow::new(
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            1_000_000.0,
        )
        .unwrap()
    }

    #[test]
    fn evaluate_reports_method_and_codes() {
        let selected = codes(&["600000", "600004"]);
        let report = evaluate(&FlatPort, &selected, &window(), &BacktestConfig::default(), "linear").unwrap();
        assert_eq!(report.method, "linear");
        assert_eq!(report.codes, selected);
        assert_relative_eq!(report.final_value, 1_000_000.0, epsilon = 1e-6);
        assert_relative_eq!(report.annualized_return, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn evaluate_empty_selection_is_data_format() {
        let err = evaluate(&FlatPort, &[], &window(), &BacktestConfig::default(), "linear").unwrap_err();
        assert!(matches!(err, FactorpickError::DataFormat { .. }));
    }

    #[test]
    fn evaluate_fails_on_uncovered_asset() {
        let err = evaluate(
            &FlatPort,
            &codes(&["600000", "600999"]),
            &window(),
            &BacktestConfig::default(),
            "forest",
        )
        .unwrap_err();
        assert!(err.is_insufficient_history());
    }
}
