//! Universe screening.
//!
//! Applies a set of eligibility rules to a factor table. Each rule is a
//! boolean mask over the rows; the candidate set is their intersection, kept
//! in table order.

use crate::domain::candidate::FactorTable;
use crate::domain::eligibility::{Comparison, EligibilityRule};
use crate::domain::error::FactorpickError;

/// Listing-date cutoff used by the stock screen: listed at least two years
/// before the end of the labeling window.
pub const DEFAULT_LISTING_CUTOFF: f64 = 20180801.0;

/// Smallest code admitted by the stock screen.
pub const DEFAULT_MIN_CODE: f64 = 100000.0;

/// The stock screen: profitable, listed before the cutoff, not flagged as
/// distressed ("ST"), code at or above [`DEFAULT_MIN_CODE`], non-zero P/E.
pub fn default_rules() -> Vec<EligibilityRule> {
    vec![
        EligibilityRule::Compare {
            column: "npr".into(),
            op: Comparison::Gt,
            value: 0.0,
        },
        EligibilityRule::Compare {
            column: "timeToMarket".into(),
            op: Comparison::Le,
            value: DEFAULT_LISTING_CUTOFF,
        },
        EligibilityRule::Contains {
            column: "name".into(),
            needle: "ST".into(),
            negated: true,
        },
        EligibilityRule::Compare {
            column: "code".into(),
            op: Comparison::Ge,
            value: DEFAULT_MIN_CODE,
        },
        EligibilityRule::Compare {
            column: "pe".into(),
            op: Comparison::Ne,
            value: 0.0,
        },
    ]
}

/// Check that every rule can be evaluated against the table's schema.
pub fn validate_rules(table: &FactorTable, rules: &[EligibilityRule]) -> Result<(), FactorpickError> {
    for rule in rules {
        rule.bind(table)?;
    }
    Ok(())
}

/// Keep the rows that satisfy every rule.
///
/// Columns are resolved before any row is looked at, so a rule naming a
/// missing column fails even on an empty table.
pub fn filter(table: &FactorTable, rules: &[EligibilityRule]) -> Result<FactorTable, FactorpickError> {
    let bound = rules
        .iter()
        .map(|rule| rule.bind(table).map(|column| (rule, column)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut kept = Vec::with_capacity(table.len());
    for row in &table.rows {
        let mut eligible = true;
        for (rule, column) in &bound {
            if !rule.matches(*column, row)? {
                eligible = false;
                break;
            }
        }
        if eligible {
            kept.push(row.clone());
        }
    }

    tracing::info!(
        total = table.len(),
        eligible = kept.len(),
        rules = rules.len(),
        "universe screened"
    );

    Ok(table.with_rows(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::CandidateStock;
    use crate::domain::eligibility_parser;

    fn stock(code: &str, name: &str, npr: f64, listed: f64, pe: f64) -> CandidateStock {
        CandidateStock {
            code: code.into(),
            name: name.into(),
            factors: vec![npr, listed, pe],
            text: vec![],
        }
    }

    fn table() -> FactorTable {
        FactorTable::new(
            vec!["npr".into(), "timeToMarket".into(), "pe".into()],
            vec![],
            vec![
                stock("600000", "Pudong Bank", 30.0, 19991110.0, 5.6),
                stock("600001", "Loss Maker", -3.0, 19980101.0, 12.0),
                stock("600002", "*ST Trouble", 2.0, 20000101.0, 40.0),
                stock("000001", "Ping An", 25.0, 19910403.0, 8.0),
                stock("688001", "New Listing", 10.0, 20190722.0, 60.0),
                stock("600003", "Delisted", 1.0, 19990101.0, 0.0),
                stock("600004", "Good Co", 15.0, 20100101.0, 20.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn default_rules_reproduce_screen() {
        let result = filter(&table(), &default_rules()).unwrap();
        assert_eq!(result.codes(), vec!["600000", "600004"]);
    }

    #[test]
    fn default_rules_match_text_form() {
        let parsed = eligibility_parser::parse(
            "npr > 0, timeToMarket <= 20180801, name !contains \"ST\", code >= 100000, pe != 0",
        )
        .unwrap();
        assert_eq!(parsed, default_rules());
    }

    #[test]
    fn no_rules_keeps_everything() {
        let t = table();
        assert_eq!(filter(&t, &[]).unwrap(), t);
    }

    #[test]
    fn filter_is_idempotent() {
        let once = filter(&table(), &default_rules()).unwrap();
        let twice = filter(&once, &default_rules()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rule_order_does_not_matter() {
        let mut reversed = default_rules();
        reversed.reverse();
        assert_eq!(
            filter(&table(), &default_rules()).unwrap(),
            filter(&table(), &reversed).unwrap()
        );
    }

    #[test]
    fn missing_column_fails_even_when_table_empty() {
        let empty = table().with_rows(vec![]);
        let rules = eligibility_parser::parse("roe > 0").unwrap();
        assert!(matches!(
            filter(&empty, &rules),
            Err(FactorpickError::DataFormat { .. })
        ));
        assert!(validate_rules(&empty, &rules).is_err());
    }

    #[test]
    fn non_numeric_code_fails_numeric_code_rule() {
        let t = FactorTable::new(
            vec!["npr".into()],
            vec![],
            vec![CandidateStock {
                code: "SH600000".into(),
                name: "Prefixed".into(),
                factors: vec![1.0],
                text: vec![],
            }],
        )
        .unwrap();
        let rules = eligibility_parser::parse("code >= 100000").unwrap();
        assert!(matches!(filter(&t, &rules), Err(FactorpickError::DataFormat { .. })));
    }

    #[test]
    fn non_numeric_code_fails_whatever_the_rule_order() {
        let t = FactorTable::new(
            vec!["npr".into()],
            vec![],
            vec![
                CandidateStock {
                    code: "600000".into(),
                    name: "Numeric".into(),
                    factors: vec![1.0],
                    text: vec![],
                },
                CandidateStock {
                    code: "SH1".into(),
                    name: "Prefixed".into(),
                    factors: vec![-1.0],
                    text: vec![],
                },
            ],
        )
        .unwrap();
        let profit_first = eligibility_parser::parse("npr > 0, code >= 100000").unwrap();
        let code_first = eligibility_parser::parse("code >= 100000, npr > 0").unwrap();
        assert!(matches!(filter(&t, &profit_first), Err(FactorpickError::DataFormat { .. })));
        assert!(matches!(filter(&t, &code_first), Err(FactorpickError::DataFormat { .. })));
    }
}
