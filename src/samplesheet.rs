// src/samplesheet.rs

//! Sample sheet parsing.
//!
//! A sheet is a small delimited text file:
//!
//! ```text
//! porerefiner_ver,1.0.1
//! library_id,LIB01
//! sequencing_kit,SQK-LSK109
//! barcode_kit,EXP-NBD104,EXP-NBD114
//! sample_id,accession,barcode_id,organism,extraction_kit,comment,user
//! S1,ACC1,BC01,E. coli,kit,,jdoe
//! ```
//!
//! The `barcode_kit` row only exists from version 1.0.1 on. Parsing is pure:
//! the result is a [`ParsedSampleSheet`] that the store can persist and the
//! service can attach to a run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{Result, RunwardenError};

pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.0", "1.0.0-fda", "1.0.1"];

const VERSION_KEY: &str = "porerefiner_ver";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSampleSheet {
    pub version: String,
    pub date: DateTime<Utc>,
    pub library_id: String,
    pub sequencing_kit: String,
    pub barcode_kit: Vec<String>,
    pub samples: Vec<ParsedSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedSample {
    pub sample_id: String,
    pub accession: String,
    pub barcode_id: String,
    pub organism: String,
    pub extraction_kit: String,
    pub comment: String,
    pub user: String,
}

/// Guess the delimiter from the first line: tab if present, comma otherwise.
pub fn sniff_delimiter(text: &str) -> char {
    match text.lines().next() {
        Some(first) if first.contains('\t') => '\t',
        _ => ',',
    }
}

/// Read and parse a sheet from disk.
pub fn load_from_path(path: &Path) -> Result<ParsedSampleSheet> {
    let text = std::fs::read_to_string(path)?;
    parse(&text, sniff_delimiter(&text), Utc::now())
}

/// Parse sheet text with an explicit delimiter. `date` stamps the result.
pub fn parse(text: &str, delimiter: char, date: DateTime<Utc>) -> Result<ParsedSampleSheet> {
    let mut rows = text
        .lines()
        .map(|line| split_row(line, delimiter))
        .filter(|row| row.iter().any(|cell| !cell.is_empty()));

    let version = keyed_value(rows.next(), VERSION_KEY)?;
    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(RunwardenError::UnsupportedSheetVersion(version));
    }
    let library_id = keyed_value(rows.next(), "library_id")?;
    let sequencing_kit = keyed_value(rows.next(), "sequencing_kit")?;

    // Either the barcode_kit row or straight to the header.
    let mut barcode_kit = Vec::new();
    let header = rows
        .next()
        .ok_or_else(|| RunwardenError::MalformedSheet("missing sample header".into()))?;
    if header.first().is_some_and(|key| key.contains("barcode_kit")) {
        barcode_kit = header[1..]
            .iter()
            .filter(|kit| !kit.is_empty())
            .cloned()
            .collect();
        rows.next()
            .ok_or_else(|| RunwardenError::MalformedSheet("missing sample header".into()))?;
    }

    let samples = rows
        .map(|row| {
            let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
            ParsedSample {
                sample_id: cell(0),
                accession: cell(1),
                barcode_id: cell(2),
                organism: cell(3),
                extraction_kit: cell(4),
                comment: cell(5),
                user: cell(6),
            }
        })
        .filter(|sample| !sample.sample_id.is_empty())
        .collect();

    Ok(ParsedSampleSheet {
        version,
        date,
        library_id,
        sequencing_kit,
        barcode_kit,
        samples,
    })
}

fn keyed_value(row: Option<Vec<String>>, key: &str) -> Result<String> {
    let row = row.ok_or_else(|| RunwardenError::MalformedSheet(format!("missing {key} row")))?;
    match row.first() {
        Some(found) if found.contains(key) => Ok(row.get(1).cloned().unwrap_or_default()),
        Some(found) => Err(RunwardenError::MalformedSheet(format!(
            "expected {key}, found '{found}'"
        ))),
        None => Err(RunwardenError::MalformedSheet(format!("missing {key} row"))),
    }
}

/// Split one line on `delimiter`, honouring double-quoted cells.
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}
