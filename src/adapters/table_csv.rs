//! CSV codec for factor tables and labeled datasets.
//!
//! Both formats share one layout: `code`, `name`, then attribute columns. A
//! column whose non-blank cells all parse as `f64` is a factor, with blank
//! cells read as NaN; anything else is text. A labeled dataset adds the
//! return column after the factors.
//!
//! The typed variant writes a second header row naming each column's kind,
//! so a reader gets back exactly the schema that was written rather than
//! one inferred from whichever rows happen to be present.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::domain::candidate::{CandidateStock, FactorTable, CODE_COLUMN, NAME_COLUMN};
use crate::domain::error::FactorpickError;
use crate::domain::labeling::{LabeledDataset, LabeledRow, RETURN_COLUMN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Code,
    Name,
    Text,
    Factor,
    Label,
}

impl ColumnKind {
    fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Code => "code",
            ColumnKind::Name => "name",
            ColumnKind::Text => "text",
            ColumnKind::Factor => "factor",
            ColumnKind::Label => "label",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "code" => Some(ColumnKind::Code),
            "name" => Some(ColumnKind::Name),
            "text" => Some(ColumnKind::Text),
            "factor" => Some(ColumnKind::Factor),
            "label" => Some(ColumnKind::Label),
            _ => None,
        }
    }
}

fn malformed(source: &str, e: csv::Error) -> FactorpickError {
    FactorpickError::data_format(format!("{}: {}", source, e))
}

fn open(path: &Path) -> Result<File, FactorpickError> {
    File::open(path).map_err(|e| {
        FactorpickError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })
}

/// A blank cell is a missing value.
fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        Some(f64::NAN)
    } else {
        cell.parse().ok()
    }
}

fn format_number(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}

/// Headers and every data record, with header names trimmed and checked for
/// repeats.
fn read_raw<R: Read>(
    reader: R,
    source: &str,
) -> Result<(Vec<String>, Vec<StringRecord>), FactorpickError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| malformed(source, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    for (i, h) in headers.iter().enumerate() {
        if headers[..i].contains(h) {
            return Err(FactorpickError::data_format(format!(
                "{source}: duplicate column '{h}'"
            )));
        }
    }

    let records = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(source, e))?;
    Ok((headers, records))
}

/// Column kinds guessed from the cells. `code` and `name` must be present.
fn infer_kinds(
    headers: &[String],
    records: &[StringRecord],
    source: &str,
) -> Result<Vec<ColumnKind>, FactorpickError> {
    for required in [CODE_COLUMN, NAME_COLUMN] {
        if !headers.iter().any(|h| h == required) {
            return Err(FactorpickError::data_format(format!(
                "{source}: missing '{required}' column"
            )));
        }
    }

    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h == CODE_COLUMN {
                return ColumnKind::Code;
            }
            if h == NAME_COLUMN {
                return ColumnKind::Name;
            }
            let cells = || records.iter().map(move |r| r.get(i).unwrap_or_default());
            let numeric = cells().all(|v| parse_number(v).is_some())
                && cells().any(|v| !v.trim().is_empty());
            if numeric { ColumnKind::Factor } else { ColumnKind::Text }
        })
        .collect())
}

/// Build a table from classified columns. Label columns are kept as the last
/// factors; [`into_labeled`] splits them off.
fn build_table(
    headers: &[String],
    records: &[StringRecord],
    kinds: &[ColumnKind],
    source: &str,
) -> Result<FactorTable, FactorpickError> {
    let find = |kind: ColumnKind| kinds.iter().position(|&k| k == kind);
    let (Some(code_idx), Some(name_idx)) = (find(ColumnKind::Code), find(ColumnKind::Name)) else {
        return Err(FactorpickError::data_format(format!(
            "{source}: missing '{CODE_COLUMN}' or '{NAME_COLUMN}' column"
        )));
    };
    let of_kind = |wanted: &[ColumnKind]| -> Vec<usize> {
        (0..kinds.len()).filter(|&i| wanted.contains(&kinds[i])).collect()
    };
    let factor_idx = of_kind(&[ColumnKind::Factor, ColumnKind::Label]);
    let text_idx = of_kind(&[ColumnKind::Text]);

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let cell = |i: usize| record.get(i).unwrap_or_default().trim();
        let code = cell(code_idx).to_string();
        let factors = factor_idx
            .iter()
            .map(|&i| {
                parse_number(cell(i)).ok_or_else(|| {
                    FactorpickError::data_format(format!(
                        "{source}: {code}: '{}' is not a number: '{}'",
                        headers[i],
                        cell(i)
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(CandidateStock {
            name: cell(name_idx).to_string(),
            factors,
            text: text_idx.iter().map(|&i| cell(i).to_string()).collect(),
            code,
        });
    }

    FactorTable::new(
        factor_idx.iter().map(|&i| headers[i].clone()).collect(),
        text_idx.iter().map(|&i| headers[i].clone()).collect(),
        rows,
    )
}

fn into_labeled(mut table: FactorTable, source: &str) -> Result<LabeledDataset, FactorpickError> {
    let label_idx = table
        .factor_columns
        .iter()
        .position(|c| c == RETURN_COLUMN)
        .ok_or_else(|| {
            FactorpickError::data_format(format!(
                "{source}: missing numeric '{RETURN_COLUMN}' column"
            ))
        })?;
    table.factor_columns.remove(label_idx);

    let rows = table
        .rows
        .into_iter()
        .map(|mut candidate| {
            let annualized_return = candidate.factors.remove(label_idx);
            LabeledRow {
                candidate,
                annualized_return,
            }
        })
        .collect();

    Ok(LabeledDataset {
        factor_columns: table.factor_columns,
        text_columns: table.text_columns,
        rows,
    })
}

pub fn load_factor_table(path: &Path) -> Result<FactorTable, FactorpickError> {
    read_factor_table(open(path)?, &path.display().to_string())
}

/// Parse a factor table. `source` names the input in error messages.
pub fn read_factor_table<R: Read>(reader: R, source: &str) -> Result<FactorTable, FactorpickError> {
    let (headers, records) = read_raw(reader, source)?;
    let kinds = infer_kinds(&headers, &records, source)?;
    build_table(&headers, &records, &kinds, source)
}

pub fn load_labeled_dataset(path: &Path) -> Result<LabeledDataset, FactorpickError> {
    read_labeled_dataset(open(path)?, &path.display().to_string())
}

/// Like [`read_factor_table`], with the `ar` column always numeric.
pub fn read_labeled_dataset<R: Read>(
    reader: R,
    source: &str,
) -> Result<LabeledDataset, FactorpickError> {
    let (headers, records) = read_raw(reader, source)?;
    let mut kinds = infer_kinds(&headers, &records, source)?;
    if let Some(i) = headers.iter().position(|h| h == RETURN_COLUMN) {
        kinds[i] = ColumnKind::Label;
    }
    into_labeled(build_table(&headers, &records, &kinds, source)?, source)
}

/// Read a dataset written by [`write_typed_labeled_dataset`].
pub fn read_typed_labeled_dataset<R: Read>(
    reader: R,
    source: &str,
) -> Result<LabeledDataset, FactorpickError> {
    let (headers, mut records) = read_raw(reader, source)?;
    if records.is_empty() {
        return Err(FactorpickError::data_format(format!(
            "{source}: missing column kinds row"
        )));
    }
    let kinds_row = records.remove(0);
    let kinds = kinds_row
        .iter()
        .zip(&headers)
        .map(|(kind, h)| {
            ColumnKind::parse(kind).ok_or_else(|| {
                FactorpickError::data_format(format!("{source}: column '{h}' has unknown kind '{kind}'"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let labels: Vec<&str> = headers
        .iter()
        .zip(&kinds)
        .filter(|(_, k)| **k == ColumnKind::Label)
        .map(|(h, _)| h.as_str())
        .collect();
    if labels != [RETURN_COLUMN] {
        return Err(FactorpickError::data_format(format!(
            "{source}: expected exactly one label column named '{RETURN_COLUMN}'"
        )));
    }

    into_labeled(build_table(&headers, &records, &kinds, source)?, source)
}

pub fn write_factor_table<W: Write>(writer: W, table: &FactorTable) -> Result<(), FactorpickError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(&table.factor_columns, &table.text_columns, false))?;
    for row in &table.rows {
        wtr.write_record(record(row, None))?;
    }
    wtr.flush()?;
    Ok(())
}

/// `code,name,<text>,<factors>,ar`; floats use shortest round-trip formatting
/// and NaN is written as a blank cell.
pub fn write_labeled_dataset<W: Write>(
    writer: W,
    dataset: &LabeledDataset,
) -> Result<(), FactorpickError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(&dataset.factor_columns, &dataset.text_columns, true))?;
    for row in &dataset.rows {
        wtr.write_record(record(&row.candidate, Some(row.annualized_return)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// [`write_labeled_dataset`] plus a row of column kinds under the header.
pub fn write_typed_labeled_dataset<W: Write>(
    writer: W,
    dataset: &LabeledDataset,
) -> Result<(), FactorpickError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(&dataset.factor_columns, &dataset.text_columns, true))?;
    let kinds = [ColumnKind::Code, ColumnKind::Name]
        .into_iter()
        .chain(dataset.text_columns.iter().map(|_| ColumnKind::Text))
        .chain(dataset.factor_columns.iter().map(|_| ColumnKind::Factor))
        .chain([ColumnKind::Label])
        .map(ColumnKind::as_str);
    wtr.write_record(kinds)?;
    for row in &dataset.rows {
        wtr.write_record(record(&row.candidate, Some(row.annualized_return)))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_labeled_dataset(path: &Path, dataset: &LabeledDataset) -> Result<(), FactorpickError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_labeled_dataset(File::create(path)?, dataset)
}

fn header(factor_columns: &[String], text_columns: &[String], labeled: bool) -> Vec<String> {
    let mut out = vec![CODE_COLUMN.to_string(), NAME_COLUMN.to_string()];
    out.extend(text_columns.iter().cloned());
    out.extend(factor_columns.iter().cloned());
    if labeled {
        out.push(RETURN_COLUMN.to_string());
    }
    out
}

fn record(row: &CandidateStock, label: Option<f64>) -> Vec<String> {
    let mut out = vec![row.code.clone(), row.name.clone()];
    out.extend(row.text.iter().cloned());
    out.extend(row.factors.iter().map(|&v| format_number(v)));
    out.extend(label.map(format_number));
    out
}
