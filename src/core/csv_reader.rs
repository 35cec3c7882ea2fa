// Delimited text reader: one file into named (timestamp, value) columns

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::constants::{DATE_FORMATS, MAX_UNIT_LEN};
use crate::core::error::{ReaderError, Result};

/// One data column of a single file, keyed by its full header text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedColumn {
    pub key: String,
    pub name: String,
    pub unit: String,
    pub points: Vec<(f64, f64)>,
}

impl ParsedColumn {
    fn new(key: &str) -> Self {
        let (name, unit) = split_unit(key);
        Self {
            key: key.to_string(),
            name,
            unit,
            points: Vec::new(),
        }
    }
}

/// Splits `Name(Unit)` at the last parenthesis. Suffixes longer than a unit stay in the name.
pub fn split_unit(header: &str) -> (String, String) {
    let Some(open) = header.rfind('(') else {
        return (header.to_string(), String::new());
    };

    let close = header
        .rfind(')')
        .filter(|close| *close > open)
        .unwrap_or(header.len());
    let unit = &header[open + 1..close];

    if unit.chars().count() > MAX_UNIT_LEN {
        return (header.to_string(), String::new());
    }

    (header[..open].trim().to_string(), unit.trim().to_string())
}

/// Tries the last format that worked first, then the others in order.
#[derive(Debug, Default)]
pub struct TimestampParser {
    preferred: usize,
}

impl TimestampParser {
    pub fn parse(&mut self, text: &str) -> Result<f64> {
        for i in 0..DATE_FORMATS.len() {
            let index = (i + self.preferred) % DATE_FORMATS.len();
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATE_FORMATS[index]) {
                self.preferred = index;
                return Ok(dt.and_utc().timestamp() as f64);
            }
        }

        self.preferred = 0;
        Err(ReaderError::Parse(format!("Failed to parse date: \"{}\"", text)))
    }
}

/// Accepts either `,` or `.` as the decimal separator. Non-finite results are rejected.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let value = if text.contains(',') {
        text.replace(',', ".").parse::<f64>().ok()?
    } else {
        text.parse::<f64>().ok()?
    };

    value.is_finite().then_some(value)
}

pub fn parse_file(path: &Path, cancel: &CancellationToken) -> Result<Vec<ParsedColumn>> {
    let file = File::open(path)?;
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_reader(file, &label, cancel)
}

/// Parses comma-delimited text. The first column is the timestamp; every other non-empty header
/// becomes a column. Bad rows and cells are dropped, and each kind is reported once per file.
pub fn parse_reader<R: Read>(
    input: R,
    label: &str,
    cancel: &CancellationToken,
) -> Result<Vec<ParsedColumn>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers()?.clone();

    // (record index, column)
    let mut columns: Vec<(usize, ParsedColumn)> = Vec::new();
    for (index, header) in headers.iter().enumerate().skip(1) {
        if header.is_empty() || columns.iter().any(|(_, c)| c.key == header) {
            continue;
        }
        columns.push((index, ParsedColumn::new(header)));
    }

    let mut line_error_shown = false;
    let mut col_error_shown = vec![false; columns.len()];
    let mut dates = TimestampParser::default();

    for (line, result) in reader.records().enumerate() {
        if cancel.is_cancelled() {
            return Err(ReaderError::Cancelled);
        }

        let record = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                if !line_error_shown {
                    warn!("Error parsing line {}:{}: {}", label, line + 2, e);
                    line_error_shown = true;
                }
                continue;
            }
        };

        let date = match dates.parse(record.get(0).unwrap_or_default()) {
            Ok(d) => d,
            Err(e) => {
                if !line_error_shown {
                    warn!("Error parsing line {}:{}: {}", label, line + 2, e);
                    line_error_shown = true;
                }
                continue;
            }
        };

        for (col, (index, column)) in columns.iter_mut().enumerate() {
            match record.get(*index) {
                Some("") => {}
                Some(cell) => match parse_decimal(cell) {
                    Some(value) => column.points.push((date, value)),
                    None => {
                        if !col_error_shown[col] {
                            warn!(
                                "Error parsing column {} in file {}:{}: invalid number \"{}\"",
                                *index + 1,
                                label,
                                line + 2,
                                cell
                            );
                            col_error_shown[col] = true;
                        }
                    }
                },
                None => {
                    if !col_error_shown[col] {
                        warn!(
                            "Error parsing column {} in file {}:{}: missing cell",
                            *index + 1,
                            label,
                            line + 2
                        );
                        col_error_shown[col] = true;
                    }
                }
            }

            if cancel.is_cancelled() {
                return Err(ReaderError::Cancelled);
            }
        }
    }

    debug!("Parsed {} columns from {}", columns.len(), label);
    Ok(columns.into_iter().map(|(_, c)| c).collect())
}
