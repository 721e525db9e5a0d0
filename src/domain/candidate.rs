//! Candidate stocks and the factor table they are loaded into.
//!
//! A [`FactorTable`] holds one row per asset identifier. Numeric columns are
//! factors (net profit ratio, P/E, listing date as `YYYYMMDD`, ...); the
//! remaining non-numeric columns are kept verbatim as text attributes.

use crate::domain::error::FactorpickError;
use std::collections::HashSet;

pub const CODE_COLUMN: &str = "code";
pub const NAME_COLUMN: &str = "name";

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateStock {
    pub code: String,
    pub name: String,
    /// Aligned with [`FactorTable::factor_columns`].
    pub factors: Vec<f64>,
    /// Aligned with [`FactorTable::text_columns`].
    pub text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    pub factor_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub rows: Vec<CandidateStock>,
}

/// Where a column name resolves to inside a [`FactorTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef {
    Code,
    Name,
    Factor(usize),
    Text(usize),
}

impl FactorTable {
    /// Build a table, rejecting empty or duplicate identifiers and rows whose
    /// width disagrees with the schema.
    pub fn new(
        factor_columns: Vec<String>,
        text_columns: Vec<String>,
        rows: Vec<CandidateStock>,
    ) -> Result<Self, FactorpickError> {
        let mut seen = HashSet::new();
        for row in &rows {
            if row.code.trim().is_empty() {
                return Err(FactorpickError::data_format("empty asset identifier"));
            }
            if !seen.insert(row.code.as_str()) {
                return Err(FactorpickError::data_format(format!(
                    "duplicate asset identifier {}",
                    row.code
                )));
            }
            if row.factors.len() != factor_columns.len() || row.text.len() != text_columns.len() {
                return Err(FactorpickError::data_format(format!(
                    "row {} has {} factors and {} text values, schema expects {} and {}",
                    row.code,
                    row.factors.len(),
                    row.text.len(),
                    factor_columns.len(),
                    text_columns.len()
                )));
            }
        }
        Ok(Self {
            factor_columns,
            text_columns,
            rows,
        })
    }

    /// Same schema, different rows. Rows are assumed to come from this table.
    pub fn with_rows(&self, rows: Vec<CandidateStock>) -> Self {
        Self {
            factor_columns: self.factor_columns.clone(),
            text_columns: self.text_columns.clone(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn codes(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.code.clone()).collect()
    }

    pub fn get(&self, code: &str) -> Option<&CandidateStock> {
        self.rows.iter().find(|r| r.code == code)
    }

    pub fn resolve_column(&self, column: &str) -> Option<ColumnRef> {
        if column == CODE_COLUMN {
            return Some(ColumnRef::Code);
        }
        if column == NAME_COLUMN {
            return Some(ColumnRef::Name);
        }
        if let Some(i) = self.factor_columns.iter().position(|c| c == column) {
            return Some(ColumnRef::Factor(i));
        }
        self.text_columns
            .iter()
            .position(|c| c == column)
            .map(ColumnRef::Text)
    }
}
