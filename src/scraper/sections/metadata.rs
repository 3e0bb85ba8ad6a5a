//! Measure header shown above every section page.
//!
//! The header is a run of loosely structured rows such as
//! `CMIT Measure ID: 00123  CMIT ID: 00123-C-HIQR | Status: Active`, so the
//! labelled values are recovered from the flattened text rather than from
//! individual elements.

use regex::Regex;
use scraper::{Html, Selector};

use super::element_text;
use crate::types::MeasureMetadata;

const NAME_SELECTORS: [&str; 2] = ["div.row.margin-top-10.padding-bottom-15 h1 span", "h1"];
const HEADER_ROWS: &str = "span div.row";

/// Labels read from the header text, in `MeasureMetadata` terms
pub const LABELS: [&str; 7] = [
    "CMIT Measure ID",
    "CMIT ID",
    "Measure Type",
    "Date of Information",
    "Revision",
    "Program",
    "Status",
];

/// Read the measure header of a rendered section page. Missing pieces stay
/// `None`; a page without a header yields empty metadata.
pub fn extract_metadata(document: &Html) -> MeasureMetadata {
    let mut metadata = MeasureMetadata {
        measure_name: measure_name(document),
        ..Default::default()
    };

    let text = header_text(document);
    for (label, value) in labelled_values(&text, &LABELS) {
        if let Some(slot) = metadata.field_mut(label) {
            *slot = Some(value);
        }
    }
    metadata
}

fn measure_name(document: &Html) -> Option<String> {
    for css in NAME_SELECTORS {
        if let Ok(selector) = Selector::parse(css) {
            if let Some(name) = document
                .select(&selector)
                .map(element_text)
                .find(|t| !t.is_empty())
            {
                return Some(name);
            }
        }
    }
    None
}

fn header_text(document: &Html) -> String {
    let mut parts = Vec::new();
    if let Ok(selector) = Selector::parse(HEADER_ROWS) {
        for row in document.select(&selector) {
            let text = element_text(row);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join(" | ")
}

/// Find `Label:` markers in `text` and cut each value at the next marker
/// or `|`, whichever comes first.
fn labelled_values<'l>(text: &str, labels: &[&'l str]) -> Vec<(&'l str, String)> {
    // (marker start, value start, label)
    let mut markers: Vec<(usize, usize, &'l str)> = Vec::new();
    for &label in labels {
        let pattern = format!(r"(?:^|[\s|]){}\s*:", regex::escape(label));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(m) = re.find(text) {
            markers.push((m.start(), m.end(), label));
        }
    }
    markers.sort_by_key(|&(start, _, _)| start);

    let mut values = Vec::new();
    for (i, &(_, value_start, label)) in markers.iter().enumerate() {
        let mut value_end = markers.get(i + 1).map_or(text.len(), |&(next, _, _)| next);
        if let Some(bar) = text[value_start..value_end].find('|') {
            value_end = value_start + bar;
        }
        let value = text[value_start..value_end].trim();
        if !value.is_empty() {
            values.push((label, value.to_string()));
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body>
<div class="row margin-top-10 padding-bottom-15">
  <h1><span>Hospital-Wide All-Cause Unplanned Readmission</span></h1>
</div>
<span>
  <div class="row margin-top-10">
    <div class="col-md-4">CMIT Measure ID: 00123</div>
    <div class="col-md-4">CMIT ID: 00123-C-HIQR</div>
  </div>
  <div class="row">
    <div class="col-md-4">Measure Type: Outcome</div>
    <div class="col-md-4">Program: Hospital Inpatient Quality Reporting</div>
  </div>
  <div class="row">Date of Information: 01/01/2024 | Revision: 2</div>
</span>
</body></html>"#;

    #[test]
    fn test_extract_metadata() {
        let document = Html::parse_document(SAMPLE_HTML);
        let metadata = extract_metadata(&document);

        assert_eq!(
            metadata.measure_name.as_deref(),
            Some("Hospital-Wide All-Cause Unplanned Readmission")
        );
        assert_eq!(metadata.cmit_measure_id.as_deref(), Some("00123"));
        assert_eq!(metadata.cmit_id.as_deref(), Some("00123-C-HIQR"));
        assert_eq!(metadata.measure_type.as_deref(), Some("Outcome"));
        assert_eq!(
            metadata.program.as_deref(),
            Some("Hospital Inpatient Quality Reporting")
        );
        assert_eq!(metadata.date_of_information.as_deref(), Some("01/01/2024"));
        assert_eq!(metadata.revision.as_deref(), Some("2"));
        assert_eq!(metadata.status, None);
    }

    #[test]
    fn test_name_falls_back_to_h1() {
        let document = Html::parse_document("<html><body><h1> Sepsis  Bundle </h1></body></html>");
        let metadata = extract_metadata(&document);
        assert_eq!(metadata.measure_name.as_deref(), Some("Sepsis Bundle"));
        assert_eq!(metadata.cmit_id, None);
    }

    #[test]
    fn test_page_without_header() {
        let document = Html::parse_document("<html><body><p>loading</p></body></html>");
        assert!(extract_metadata(&document).is_empty());
    }

    #[test]
    fn test_empty_value_is_skipped() {
        let values = labelled_values("Revision: | Status: Active", &LABELS);
        assert_eq!(values, vec![("Status", "Active".to_string())]);
    }
}
