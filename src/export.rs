//! Flat table output via polars.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use polars::prelude::*;

use crate::config::OutputFormat;
use crate::flatten::{
    FlatRow, CODE_COLUMN, CONFLICTS_COLUMN, HANDLE_COLUMN, NAME_COLUMN, RECORD_STATUS_COLUMN,
    ROW_COLUMN, SECTION_COLUMN, SECTION_DETAIL_COLUMN, SECTION_STATUS_COLUMN,
};

/// Present even when no rows were produced
const BASE_COLUMNS: [&str; 9] = [
    CODE_COLUMN,
    HANDLE_COLUMN,
    NAME_COLUMN,
    RECORD_STATUS_COLUMN,
    CONFLICTS_COLUMN,
    SECTION_COLUMN,
    SECTION_STATUS_COLUMN,
    SECTION_DETAIL_COLUMN,
    ROW_COLUMN,
];

/// Timestamped output file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub table: PathBuf,
    pub audit: PathBuf,
}

impl OutputPaths {
    pub fn new<Tz: TimeZone>(
        dir: impl AsRef<Path>,
        prefix: &str,
        format: OutputFormat,
        at: &DateTime<Tz>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let stamp = at.format("%Y%m%d_%H%M%S");
        let dir = dir.as_ref();
        Self {
            table: dir.join(format!("{}_{}.{}", prefix, stamp, format.extension())),
            audit: dir.join(format!("{}_{}_audit.jsonl", prefix, stamp)),
        }
    }
}

/// Build a string-typed frame whose columns are the union of all row keys
/// in first-seen order. Missing cells are null.
pub fn flat_rows_to_frame(rows: &[FlatRow]) -> Result<DataFrame> {
    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        for (name, _) in row.columns() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    for name in BASE_COLUMNS {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .map(|&name| {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| row.get(name).map(str::to_string))
                .collect();
            Column::new(name.into(), values)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

pub fn write_table<W: Write>(rows: &[FlatRow], format: OutputFormat, writer: W) -> Result<()> {
    let mut df = flat_rows_to_frame(rows)?;
    match format {
        OutputFormat::Csv => {
            CsvWriter::new(writer).include_header(true).finish(&mut df)?;
        }
        OutputFormat::Parquet => {
            ParquetWriter::new(writer).finish(&mut df)?;
        }
    }
    Ok(())
}

pub fn save_table(path: impl AsRef<Path>, rows: &[FlatRow], format: OutputFormat) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    write_table(rows, format, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))
}
