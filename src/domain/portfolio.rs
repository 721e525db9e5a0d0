//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.code.clone(), position);
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Position> {
        self.positions.remove(code)
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    /// Cash plus open positions marked at `price_map`. A position with no
    /// price is carried at cost.
    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| match price_map.get(&pos.code) {
                Some(&price) => pos.market_value(price),
                None => pos.cost_basis(),
            })
            .sum();
        self.cash + position_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position(code: &str, quantity: i64) -> Position {
        Position {
            code: code.to_string(),
            quantity,
            entry_price: 100.0,
            entry_date: NaiveDate::from_ymd_opt(2019, 1, 2).unwrap(),
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100000.0);
        assert!((portfolio.cash - 100000.0).abs() < f64::EPSILON);
        assert!((portfolio.initial_capital - 100000.0).abs() < f64::EPSILON);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.closed_trades.is_empty());
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn add_get_remove_position() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.add_position(sample_position("600000", 100));

        assert!(portfolio.has_position("600000"));
        assert_eq!(portfolio.get_position("600000").unwrap().quantity, 100);
        assert_eq!(portfolio.positions.len(), 1);

        assert!(portfolio.remove_position("600000").is_some());
        assert!(!portfolio.has_position("600000"));
        assert!(portfolio.remove_position("600000").is_none());
    }

    #[test]
    fn record_equity() {
        let mut portfolio = Portfolio::new(100000.0);
        let date = NaiveDate::from_ymd_opt(2019, 1, 2).unwrap();

        portfolio.record_equity(date, 105000.0);
        assert_eq!(portfolio.equity_curve.len(), 1);
        assert_eq!(portfolio.equity_curve[0].date, date);
        assert!((portfolio.equity_curve[0].equity - 105000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_no_positions() {
        let portfolio = Portfolio::new(100000.0);
        let equity = portfolio.total_equity(&HashMap::new());
        assert!((equity - 100000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_marks_to_market() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.add_position(sample_position("600000", 100));
        portfolio.cash = 90000.0;

        let mut price_map = HashMap::new();
        price_map.insert("600000".to_string(), 150.0);

        let equity = portfolio.total_equity(&price_map);
        assert!((equity - 105000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_without_price_uses_cost() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.add_position(sample_position("600000", 100));
        portfolio.cash = 90000.0;

        let equity = portfolio.total_equity(&HashMap::new());
        assert!((equity - 100000.0).abs() < f64::EPSILON);
    }
}
