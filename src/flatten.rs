//! Flatten measure records into scalar rows.
//!
//! Each section row becomes one output row carrying the record's shared
//! columns. Sections are concatenated, not crossed: a measure with two
//! characteristics and three groups yields 2 + 3 rows for those sections,
//! not 6.

use crate::scraper::Section;
use crate::types::{FailureKind, MeasureRecord, Row, SectionResult};

pub const CODE_COLUMN: &str = "CMIT ID";
pub const HANDLE_COLUMN: &str = "Variant ID";
pub const NAME_COLUMN: &str = "Measure Name";
pub const RECORD_STATUS_COLUMN: &str = "Record Status";
pub const CONFLICTS_COLUMN: &str = "Metadata Conflicts";
pub const SECTION_COLUMN: &str = "Section";
pub const SECTION_STATUS_COLUMN: &str = "Section Status";
pub const SECTION_DETAIL_COLUMN: &str = "Section Detail";
pub const ROW_COLUMN: &str = "Row";

/// How a flat row's section fared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Extracted,
    /// Page rendered, section had no rows
    Empty,
    Failed,
    ExtractionError,
    /// Identifier's Properties page was not found
    Invalid,
    /// Crawl stopped before reaching the section
    NotAttempted,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Extracted => "extracted",
            SectionStatus::Empty => "empty",
            SectionStatus::Failed => "failed",
            SectionStatus::ExtractionError => "extraction_error",
            SectionStatus::Invalid => "invalid",
            SectionStatus::NotAttempted => "not_attempted",
        }
    }
}

/// One output row: ordered column names with nullable values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRow {
    columns: Vec<(String, Option<String>)>,
}

impl FlatRow {
    fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn columns(&self) -> &[(String, Option<String>)] {
        &self.columns
    }
}

/// Columns every row of `record` shares
fn shared_columns(record: &MeasureRecord) -> FlatRow {
    let mut row = FlatRow::default();
    row.push(CODE_COLUMN, Some(record.code.clone()));
    row.push(HANDLE_COLUMN, Some(record.handle.to_string()));

    for (label, value) in record.metadata.fields() {
        let column = if label == NAME_COLUMN {
            label.to_string()
        } else {
            format!("Metadata_{}", label)
        };
        row.push(column, value.map(str::to_string));
    }

    row.push(RECORD_STATUS_COLUMN, Some(record.status().as_str().to_string()));
    let conflicts = if record.conflicts.is_empty() {
        None
    } else {
        Some(
            record
                .conflicts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    };
    row.push(CONFLICTS_COLUMN, conflicts);
    row
}

fn section_row(
    shared: &FlatRow,
    section: Section,
    status: SectionStatus,
    detail: Option<&str>,
    index: Option<usize>,
    fields: &Row,
) -> FlatRow {
    let mut row = shared.clone();
    row.push(SECTION_COLUMN, Some(section.name().to_string()));
    row.push(SECTION_STATUS_COLUMN, Some(status.as_str().to_string()));
    row.push(SECTION_DETAIL_COLUMN, detail.map(str::to_string));
    row.push(ROW_COLUMN, index.map(|i| i.to_string()));
    for (field, value) in fields.fields() {
        row.push(format!("{}_{}", section.name(), field), value.clone());
    }
    row
}

/// Flatten records in order: record, then section, then row.
pub fn flatten(records: &[MeasureRecord]) -> Vec<FlatRow> {
    let mut rows = Vec::new();

    for record in records {
        let shared = shared_columns(record);

        if record.is_invalid() {
            let section = Section::Properties;
            let detail = match record.sections.get(&section) {
                Some(SectionResult::Failed { detail, .. }) => Some(detail.as_str()),
                _ => None,
            };
            let padding = Row::with_fields(section.fields());
            rows.push(section_row(&shared, section, SectionStatus::Invalid, detail, None, &padding));
            continue;
        }

        for section in Section::ALL {
            let padding = Row::with_fields(section.fields());
            match record.sections.get(&section) {
                Some(SectionResult::Extracted(table)) if table.is_empty() => {
                    rows.push(section_row(&shared, section, SectionStatus::Empty, None, None, &padding));
                }
                Some(SectionResult::Extracted(table)) => {
                    for (i, fields) in table.iter().enumerate() {
                        rows.push(section_row(
                            &shared,
                            section,
                            SectionStatus::Extracted,
                            None,
                            Some(i),
                            fields,
                        ));
                    }
                }
                Some(SectionResult::Failed { kind, detail }) => {
                    let status = match kind {
                        FailureKind::Extraction => SectionStatus::ExtractionError,
                        FailureKind::Transient | FailureKind::Invalid => SectionStatus::Failed,
                    };
                    rows.push(section_row(&shared, section, status, Some(detail), None, &padding));
                }
                None => {
                    rows.push(section_row(
                        &shared,
                        section,
                        SectionStatus::NotAttempted,
                        None,
                        None,
                        &padding,
                    ));
                }
            }
        }
    }
    rows
}
