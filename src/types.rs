//! Record types shared by the extractors, the crawler and the output stage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scraper::sections::Section;

/// One extracted row: ordered field names with nullable values.
///
/// Declared fields keep their position even when the page does not carry
/// them, so rows of the same section line up across measures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<(String, Option<String>)>,
}

impl Row {
    /// Row pre-seeded with `declared` fields, all null
    pub fn with_fields(declared: &[&str]) -> Self {
        Self {
            fields: declared.iter().map(|f| (f.to_string(), None)).collect(),
        }
    }

    /// Set a field. Unknown keys are appended; a repeated label on the same
    /// row is joined with `; ` instead of replacing the first value.
    pub fn set(&mut self, key: &str, value: Option<String>) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => {
                if let Some(v) = value {
                    match slot {
                        Some(existing) if *existing != v => {
                            existing.push_str("; ");
                            existing.push_str(&v);
                        }
                        Some(_) => {}
                        None => *slot = Some(v),
                    }
                }
            }
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }

    /// True when every field is null
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_none())
    }
}

/// Ordered rows extracted from one section page.
pub type SectionTable = Vec<Row>;

/// Measure-level metadata shown in the header of every section page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureMetadata {
    pub measure_name: Option<String>,
    pub cmit_measure_id: Option<String>,
    pub cmit_id: Option<String>,
    pub measure_type: Option<String>,
    pub date_of_information: Option<String>,
    pub revision: Option<String>,
    pub program: Option<String>,
    pub status: Option<String>,
}

impl MeasureMetadata {
    /// Fields in output order, keyed by their on-page label
    pub fn fields(&self) -> [(&'static str, Option<&str>); 8] {
        [
            ("Measure Name", self.measure_name.as_deref()),
            ("CMIT Measure ID", self.cmit_measure_id.as_deref()),
            ("CMIT ID", self.cmit_id.as_deref()),
            ("Measure Type", self.measure_type.as_deref()),
            ("Date of Information", self.date_of_information.as_deref()),
            ("Revision", self.revision.as_deref()),
            ("Program", self.program.as_deref()),
            ("Status", self.status.as_deref()),
        ]
    }

    pub fn field_mut(&mut self, label: &str) -> Option<&mut Option<String>> {
        match label {
            "Measure Name" => Some(&mut self.measure_name),
            "CMIT Measure ID" => Some(&mut self.cmit_measure_id),
            "CMIT ID" => Some(&mut self.cmit_id),
            "Measure Type" => Some(&mut self.measure_type),
            "Date of Information" => Some(&mut self.date_of_information),
            "Revision" => Some(&mut self.revision),
            "Program" => Some(&mut self.program),
            "Status" => Some(&mut self.status),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_none())
    }
}

/// Two section pages of the same measure disagree on a metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataConflict {
    pub field: &'static str,
    pub first: String,
    pub first_section: Section,
    pub second: String,
    pub second_section: Section,
}

impl fmt::Display for MetadataConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: '{}' ({}) vs '{}' ({})",
            self.field,
            self.first,
            self.first_section.name(),
            self.second,
            self.second_section.name()
        )
    }
}

/// Why a section did not produce a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retries exhausted on navigation or render timeouts
    Transient,
    /// Page rendered but the expected DOM shape was missing
    Extraction,
    /// The portal reported the page as not found
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionResult {
    Extracted(SectionTable),
    Failed { kind: FailureKind, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Complete,
    Incomplete,
    Invalid,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Complete => "complete",
            RecordStatus::Incomplete => "incomplete",
            RecordStatus::Invalid => "invalid",
        }
    }
}

/// Everything gathered for one measure across its five sections.
#[derive(Debug, Clone)]
pub struct MeasureRecord {
    pub code: String,
    pub handle: u32,
    pub metadata: MeasureMetadata,
    metadata_source: Option<Section>,
    pub sections: BTreeMap<Section, SectionResult>,
    pub conflicts: Vec<MetadataConflict>,
    invalid: bool,
}

impl MeasureRecord {
    pub fn new(code: &str, handle: u32) -> Self {
        Self {
            code: code.to_string(),
            handle,
            metadata: MeasureMetadata::default(),
            metadata_source: None,
            sections: BTreeMap::new(),
            conflicts: Vec::new(),
            invalid: false,
        }
    }

    pub fn record_section(&mut self, section: Section, result: SectionResult) {
        self.sections.insert(section, result);
    }

    pub fn mark_invalid(&mut self) {
        self.invalid = true;
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn status(&self) -> RecordStatus {
        if self.invalid {
            return RecordStatus::Invalid;
        }
        let all_extracted = Section::ALL.iter().all(|s| {
            matches!(self.sections.get(s), Some(SectionResult::Extracted(_)))
        });
        if all_extracted {
            RecordStatus::Complete
        } else {
            RecordStatus::Incomplete
        }
    }

    /// Merge metadata read from `section`'s page into the record.
    ///
    /// The first non-empty observation is adopted as-is. Later observations
    /// only fill fields that are still unknown; a differing value is returned
    /// as a conflict and kept on the record, never written over the first.
    pub fn observe_metadata(
        &mut self,
        section: Section,
        observed: &MeasureMetadata,
    ) -> Vec<MetadataConflict> {
        if observed.is_empty() {
            return Vec::new();
        }
        let Some(first_section) = self.metadata_source else {
            self.metadata = observed.clone();
            self.metadata_source = Some(section);
            return Vec::new();
        };

        let mut conflicts = Vec::new();
        for (label, value) in observed.fields() {
            let Some(value) = value else { continue };
            let Some(slot) = self.metadata.field_mut(label) else {
                continue;
            };
            match slot {
                Some(existing) if existing.as_str() != value => {
                    conflicts.push(MetadataConflict {
                        field: label,
                        first: existing.clone(),
                        first_section,
                        second: value.to_string(),
                        second_section: section,
                    });
                }
                Some(_) => {}
                None => *slot = Some(value.to_string()),
            }
        }
        self.conflicts.extend(conflicts.iter().cloned());
        conflicts
    }
}
