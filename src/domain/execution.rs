//! Order sizing and fill simulation.
//!
//! Buy-and-hold runs only ever place two kinds of order: a lot-sized market
//! buy on the first bar, and a full liquidation on the terminal date. Both fill
//! at the bar's close. There is no commission or slippage model.

use chrono::NaiveDate;

use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// One filled order, as kept in a run's order log.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub date: NaiveDate,
    pub code: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: f64,
    pub value: f64,
}

/// Largest multiple of `lot_size` shares whose cost at `price` fits in
/// `allocated_cash`.
///
/// `floor(allocated_cash / lot_size / price) * lot_size`, truncated, never
/// rounded up. Degenerate inputs (non-positive lot, price or cash) size to 0.
pub fn lot_sized_quantity(allocated_cash: f64, lot_size: i64, price: f64) -> i64 {
    if lot_size <= 0 || !price.is_finite() || price <= 0.0 || allocated_cash.is_nan() || allocated_cash <= 0.0 {
        return 0;
    }

    let lots = (allocated_cash / lot_size as f64 / price).floor();
    if !lots.is_finite() || lots < 1.0 {
        return 0;
    }

    let mut quantity = lots as i64 * lot_size;
    // Floating-point division can land a hair above an exact boundary.
    while quantity > 0 && quantity as f64 * price > allocated_cash {
        quantity -= lot_size;
    }
    quantity
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        quantity: i64,
        price: f64,
        cost: f64,
    },
    /// The allocation cannot buy a single lot. The asset stays flat; this is
    /// a valid outcome, not a failure.
    AllocationUnderflow,
    /// The allocation buys at least one lot but the portfolio lacks the cash.
    InsufficientCash,
}

/// Open a long position sized from `allocated_cash`.
pub fn enter_long(
    portfolio: &mut Portfolio,
    code: &str,
    price: f64,
    date: NaiveDate,
    allocated_cash: f64,
    lot_size: i64,
) -> EntryResult {
    let quantity = lot_sized_quantity(allocated_cash, lot_size, price);
    if quantity == 0 {
        return EntryResult::AllocationUnderflow;
    }

    let cost = quantity as f64 * price;
    if cost > portfolio.cash {
        return EntryResult::InsufficientCash;
    }

    portfolio.cash -= cost;
    portfolio.add_position(Position {
        code: code.to_string(),
        quantity,
        entry_price: price,
        entry_date: date,
    });

    EntryResult::Entered {
        quantity,
        price,
        cost,
    }
}

/// Result of a liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub quantity: i64,
    pub exit_price: f64,
    pub exit_value: f64,
    pub pnl: f64,
}

/// Sell the whole position in `code`, crediting proceeds and recording the
/// closed trade. Returns `None` if nothing is held.
pub fn liquidate(
    portfolio: &mut Portfolio,
    code: &str,
    price: f64,
    exit_date: NaiveDate,
) -> Option<ExitResult> {
    let position = portfolio.remove_position(code)?;

    let exit_value = position.market_value(price);
    let pnl = position.unrealized_pnl(price);
    portfolio.cash += exit_value;

    portfolio.record_trade(ClosedTrade {
        code: position.code.clone(),
        quantity: position.quantity,
        entry_price: position.entry_price,
        exit_price: price,
        entry_date: position.entry_date,
        exit_date,
        pnl,
    });

    Some(ExitResult {
        quantity: position.quantity,
        exit_price: price,
        exit_value,
        pnl,
    })
}
