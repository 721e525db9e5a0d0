//! Eligibility rule AST and evaluation.
//!
//! - `Comparison`: numeric comparison operators
//! - `EligibilityRule`: one predicate over a candidate's attributes
//!
//! Rules are pure predicates. A rule set is the AND of its members.

use std::fmt;

use crate::domain::candidate::{CandidateStock, ColumnRef, FactorTable};
use crate::domain::error::FactorpickError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EligibilityRule {
    /// Numeric comparison against a factor column or the numeric value of the code.
    Compare {
        column: String,
        op: Comparison,
        value: f64,
    },
    /// Substring match on a text column, the name, or the code.
    Contains {
        column: String,
        needle: String,
        negated: bool,
    },
}

impl fmt::Display for EligibilityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EligibilityRule::Compare { column, op, value } => {
                write!(f, "{} {} {}", column, op.symbol(), value)
            }
            EligibilityRule::Contains {
                column,
                needle,
                negated,
            } => {
                let op = if *negated { "!contains" } else { "contains" };
                write!(f, "{} {} \"{}\"", column, op, needle)
            }
        }
    }
}

impl EligibilityRule {
    pub fn column(&self) -> &str {
        match self {
            EligibilityRule::Compare { column, .. } | EligibilityRule::Contains { column, .. } => {
                column
            }
        }
    }

    /// Resolve this rule's column against a table schema.
    ///
    /// Fails when the column is missing or its kind cannot be used by the rule
    /// (a numeric comparison on a text column, or the reverse). A numeric
    /// comparison on `code` also fails if any row's code is not a number, so
    /// the outcome never depends on which rows other rules already rejected.
    pub fn bind(&self, table: &FactorTable) -> Result<ColumnRef, FactorpickError> {
        let column = table.resolve_column(self.column()).ok_or_else(|| {
            FactorpickError::data_format(format!(
                "rule '{}' references missing column '{}'",
                self,
                self.column()
            ))
        })?;

        match (self, column) {
            (EligibilityRule::Compare { .. }, ColumnRef::Name | ColumnRef::Text(_))
            | (EligibilityRule::Contains { .. }, ColumnRef::Factor(_)) => {
                Err(self.kind_mismatch())
            }
            (EligibilityRule::Compare { .. }, ColumnRef::Code) => {
                for row in &table.rows {
                    self.numeric_code(row)?;
                }
                Ok(column)
            }
            _ => Ok(column),
        }
    }

    fn numeric_code(&self, row: &CandidateStock) -> Result<f64, FactorpickError> {
        row.code.trim().parse::<f64>().map_err(|_| {
            FactorpickError::data_format(format!(
                "rule '{}' needs a numeric code, got '{}'",
                self, row.code
            ))
        })
    }

    fn kind_mismatch(&self) -> FactorpickError {
        let reason = match self {
            EligibilityRule::Compare { .. } => "compares a text column numerically",
            EligibilityRule::Contains { .. } => "matches text against a numeric column",
        };
        FactorpickError::data_format(format!("rule '{}' {} ('{}')", self, reason, self.column()))
    }

    /// Evaluate against one row using a column resolved by [`bind`](Self::bind).
    pub fn matches(&self, column: ColumnRef, row: &CandidateStock) -> Result<bool, FactorpickError> {
        match self {
            EligibilityRule::Compare { op, value, .. } => {
                let left = match column {
                    ColumnRef::Factor(i) => row.factors[i],
                    ColumnRef::Code => self.numeric_code(row)?,
                    ColumnRef::Name | ColumnRef::Text(_) => return Err(self.kind_mismatch()),
                };
                Ok(op.apply(left, *value))
            }
            EligibilityRule::Contains {
                needle, negated, ..
            } => {
                let haystack = match column {
                    ColumnRef::Code => row.code.as_str(),
                    ColumnRef::Name => row.name.as_str(),
                    ColumnRef::Text(i) => row.text[i].as_str(),
                    ColumnRef::Factor(_) => return Err(self.kind_mismatch()),
                };
                Ok(haystack.contains(needle.as_str()) != *negated)
            }
        }
    }
}
