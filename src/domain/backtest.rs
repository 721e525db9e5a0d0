//! Buy-and-hold backtest engine.
//!
//! Every asset in a run moves through an explicit state machine driven by the
//! dated bars of the unified timeline:
//!
//! ```text
//! Flat --(first bar, size > 0)--> Holding --(terminal date)--> Liquidated
//! Flat --(first bar, size == 0)--> Flat (for the rest of the run)
//! ```
//!
//! A single-asset run gives that asset the whole allocation fraction; a
//! multi-asset run splits it evenly. Both modes share [`run_backtest`].

use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};

use crate::domain::code_data::{build_unified_timeline, CodeData};
use crate::domain::error::FactorpickError;
use crate::domain::execution::{self, EntryResult, OrderRecord, OrderSide};
use crate::domain::portfolio::{EquityPoint, Portfolio};
use crate::domain::position::ClosedTrade;
use crate::ports::data_port::DataPort;

pub const DAYS_PER_YEAR: f64 = 365.25;

/// Dates and starting cash shared by every simulation in one labeling or
/// evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
}

impl SimulationWindow {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_cash: f64,
    ) -> Result<Self, FactorpickError> {
        if start_date >= end_date {
            return Err(FactorpickError::data_format(format!(
                "window start {} must be before end {}",
                start_date, end_date
            )));
        }
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(FactorpickError::data_format(format!(
                "initial cash must be positive, got {}",
                initial_cash
            )));
        }
        Ok(Self {
            start_date,
            end_date,
            initial_cash,
        })
    }

    pub fn overlaps(&self, other: &SimulationWindow) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Share of starting cash put to work, split evenly across the run's assets.
    pub allocation_fraction: f64,
    pub lot_size: i64,
    /// How far (calendar days) an asset's first bar may trail the window start,
    /// or its last bar precede the window end, and still count as covering it.
    pub coverage_tolerance_days: i64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            allocation_fraction: 0.9,
            lot_size: 100,
            coverage_tolerance_days: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Flat,
    Holding,
    Liquidated,
}

/// Outcome of one simulation over one asset set and window.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub codes: Vec<String>,
    pub initial_cash: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub first_trading_date: NaiveDate,
    pub terminal_date: NaiveDate,
    pub elapsed_days: i64,
    /// Final state per asset, in `codes` order.
    pub asset_states: Vec<AssetState>,
    pub orders: Vec<OrderRecord>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl TradeResult {
    pub fn state_of(&self, code: &str) -> Option<AssetState> {
        self.codes
            .iter()
            .position(|c| c == code)
            .map(|i| self.asset_states[i])
    }
}

/// `(final_value / initial_cash)^(365.25 / elapsed_days) - 1`.
pub fn annualized_return(final_value: f64, initial_cash: f64, elapsed_days: i64) -> f64 {
    if elapsed_days <= 0 || initial_cash <= 0.0 {
        return 0.0;
    }
    (final_value / initial_cash).powf(DAYS_PER_YEAR / elapsed_days as f64) - 1.0
}

/// Check that an asset's bars cover the window and reach the run's terminal date.
fn check_coverage(
    asset: &CodeData,
    window: &SimulationWindow,
    terminal_date: NaiveDate,
    config: &BacktestConfig,
) -> Result<(), FactorpickError> {
    let tolerance = Duration::days(config.coverage_tolerance_days.max(0));

    let (first, last) = match (asset.first_date(), asset.last_date()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(FactorpickError::insufficient_history(
                &asset.code,
                format!(
                    "no price data between {} and {}",
                    window.start_date, window.end_date
                ),
            ));
        }
    };

    if first > window.start_date + tolerance {
        return Err(FactorpickError::insufficient_history(
            &asset.code,
            format!(
                "first bar {} is later than window start {}",
                first, window.start_date
            ),
        ));
    }
    if last < window.end_date - tolerance {
        return Err(FactorpickError::insufficient_history(
            &asset.code,
            format!(
                "last bar {} is earlier than window end {}",
                last, window.end_date
            ),
        ));
    }
    if asset.get_bar(terminal_date).is_none() {
        return Err(FactorpickError::insufficient_history(
            &asset.code,
            format!("no bar on terminal date {}", terminal_date),
        ));
    }
    Ok(())
}

/// Simulate buy-and-hold over `assets`, whose bars are already restricted to
/// the window.
///
/// Each asset attempts one lot-sized buy at the close of its first bar. On
/// the terminal date (the last timeline date) every holding is sold at the
/// close. Elapsed time runs from the first timeline date to the terminal date.
pub fn run_backtest(
    assets: &[CodeData],
    window: &SimulationWindow,
    config: &BacktestConfig,
) -> Result<TradeResult, FactorpickError> {
    if assets.is_empty() {
        return Err(FactorpickError::data_format("backtest needs at least one asset"));
    }
    let mut seen = HashSet::new();
    for asset in assets {
        if !seen.insert(asset.code.as_str()) {
            return Err(FactorpickError::data_format(format!(
                "asset {} listed twice in one run",
                asset.code
            )));
        }
        if let Some(date) = asset.repeated_date() {
            return Err(FactorpickError::data_format(format!(
                "{} has more than one bar on {}",
                asset.code, date
            )));
        }
    }

    let timeline: Vec<NaiveDate> = build_unified_timeline(assets)
        .into_iter()
        .filter(|d| *d >= window.start_date && *d <= window.end_date)
        .collect();

    let (first_trading_date, terminal_date) = match (timeline.first(), timeline.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            // No bar at all inside the window; report the first asset lacking one.
            let asset = &assets[0];
            return Err(FactorpickError::insufficient_history(
                &asset.code,
                format!(
                    "no price data between {} and {}",
                    window.start_date, window.end_date
                ),
            ));
        }
    };

    for asset in assets {
        check_coverage(asset, window, terminal_date, config)?;
    }

    let elapsed_days = (terminal_date - first_trading_date).num_days();
    if elapsed_days <= 0 {
        return Err(FactorpickError::insufficient_history(
            &assets[0].code,
            format!("only one trading day ({}) inside the window", terminal_date),
        ));
    }

    let allocated_cash = config.allocation_fraction * window.initial_cash / assets.len() as f64;

    let mut portfolio = Portfolio::new(window.initial_cash);
    let mut states = vec![AssetState::Flat; assets.len()];
    let mut entry_attempted = vec![false; assets.len()];
    let mut orders = Vec::new();
    let mut last_close: HashMap<String, f64> = HashMap::new();

    for &date in &timeline {
        let is_terminal = date == terminal_date;

        for (i, asset) in assets.iter().enumerate() {
            let Some(bar) = asset.get_bar(date) else {
                continue;
            };
            if !bar.has_tradable_close() {
                return Err(FactorpickError::data_format(format!(
                    "{} has untradable close {} on {}",
                    asset.code, bar.close, date
                )));
            }
            last_close.insert(asset.code.clone(), bar.close);

            if is_terminal {
                if states[i] == AssetState::Holding {
                    if let Some(exit) =
                        execution::liquidate(&mut portfolio, &asset.code, bar.close, date)
                    {
                        orders.push(OrderRecord {
                            date,
                            code: asset.code.clone(),
                            side: OrderSide::Sell,
                            quantity: exit.quantity,
                            price: exit.exit_price,
                            value: exit.exit_value,
                        });
                    }
                    states[i] = AssetState::Liquidated;
                }
                continue;
            }

            if states[i] == AssetState::Flat && !entry_attempted[i] {
                entry_attempted[i] = true;
                match execution::enter_long(
                    &mut portfolio,
                    &asset.code,
                    bar.close,
                    date,
                    allocated_cash,
                    config.lot_size,
                ) {
                    EntryResult::Entered {
                        quantity,
                        price,
                        cost,
                    } => {
                        orders.push(OrderRecord {
                            date,
                            code: asset.code.clone(),
                            side: OrderSide::Buy,
                            quantity,
                            price,
                            value: cost,
                        });
                        states[i] = AssetState::Holding;
                    }
                    EntryResult::AllocationUnderflow => {
                        tracing::debug!(
                            code = %asset.code,
                            price = bar.close,
                            allocated_cash,
                            "allocation buys no lot, asset stays flat"
                        );
                    }
                    EntryResult::InsufficientCash => {
                        tracing::warn!(
                            code = %asset.code,
                            price = bar.close,
                            allocated_cash,
                            cash = portfolio.cash,
                            "portfolio cash cannot cover the sized order, asset stays flat"
                        );
                    }
                }
            }
        }

        let equity = portfolio.total_equity(&last_close);
        portfolio.record_equity(date, equity);
    }

    let final_value = portfolio.total_equity(&last_close);
    let total_return = final_value / window.initial_cash - 1.0;
    let annualized = annualized_return(final_value, window.initial_cash, elapsed_days);

    Ok(TradeResult {
        codes: assets.iter().map(|a| a.code.clone()).collect(),
        initial_cash: window.initial_cash,
        final_value,
        total_return,
        annualized_return: annualized,
        first_trading_date,
        terminal_date,
        elapsed_days,
        asset_states: states,
        orders,
        closed_trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
    })
}

/// Load each asset's bars for the window, simulate, and release the series.
pub fn simulate(
    data_port: &dyn DataPort,
    codes: &[String],
    window: &SimulationWindow,
    config: &BacktestConfig,
) -> Result<TradeResult, FactorpickError> {
    let mut assets = Vec::with_capacity(codes.len());
    for code in codes {
        let bars = data_port.fetch_ohlcv(code, window.start_date, window.end_date)?;
        assets.push(CodeData::new(code.clone(), bars));
    }
    run_backtest(&assets, window, config)
}
