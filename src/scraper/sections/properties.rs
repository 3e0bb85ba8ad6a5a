//! Properties section (`sectionNumber=1`).
//!
//! A single label/value grid describing the measure; it becomes one wide row.

use scraper::ElementRef;

use super::label_value_pairs;
use crate::errors::ExtractError;
use crate::types::{Row, SectionTable};

pub const FIELDS: &[&str] = &[
    "Description",
    "Rationale",
    "Numerator",
    "Denominator",
    "Denominator Exclusions",
    "Measure Steward",
    "Data Sources",
    "Care Setting",
];

pub fn extract(root: ElementRef<'_>) -> Result<SectionTable, ExtractError> {
    let pairs = label_value_pairs(root)?;
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let mut row = Row::with_fields(FIELDS);
    for (label, value) in pairs {
        row.set(&label, value);
    }
    Ok(vec![row])
}
