//! Characteristics section (`sectionNumber=3`).
//!
//! Same label/value grid as Properties, but every pair is its own row so the
//! column set stays fixed no matter which characteristics a measure lists.

use scraper::ElementRef;

use super::label_value_pairs;
use crate::errors::ExtractError;
use crate::types::{Row, SectionTable};

pub const FIELDS: &[&str] = &["Characteristic", "Value"];

pub fn extract(root: ElementRef<'_>) -> Result<SectionTable, ExtractError> {
    let table = label_value_pairs(root)?
        .into_iter()
        .map(|(label, value)| {
            let mut row = Row::with_fields(FIELDS);
            row.set("Characteristic", Some(label));
            row.set("Value", value);
            row
        })
        .collect();
    Ok(table)
}
