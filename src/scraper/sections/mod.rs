//! Section extractors for measure pages.
//!
//! Every measure exposes five section pages. Each has its own DOM layout, so
//! each gets a dedicated extractor, but all of them return the same shape: an
//! ordered list of rows with string keys and nullable values.

pub mod cascade;
pub mod characteristics;
pub mod groups;
pub mod metadata;
pub mod properties;
pub mod reporting_status;

pub use metadata::extract_metadata;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::errors::ExtractError;
use crate::types::SectionTable;

/// The five fixed sections of a measure page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Properties,
    Characteristics,
    Cascade,
    Groups,
    ReportingStatus,
}

impl Section {
    /// Crawl and output order
    pub const ALL: [Section; 5] = [
        Section::Properties,
        Section::Characteristics,
        Section::Cascade,
        Section::Groups,
        Section::ReportingStatus,
    ];

    /// Display name, also used as the column prefix in the flat output
    pub fn name(self) -> &'static str {
        match self {
            Section::Properties => "Properties",
            Section::Characteristics => "Characteristics",
            Section::Cascade => "Cascade of Meaningful Measures",
            Section::Groups => "Groups",
            Section::ReportingStatus => "Reporting Status",
        }
    }

    /// Value of the `sectionNumber` URL parameter
    pub fn number(self) -> u8 {
        match self {
            Section::Properties => 1,
            Section::Characteristics => 3,
            Section::Cascade => 4,
            Section::Groups => 5,
            Section::ReportingStatus => 7,
        }
    }

    /// Container that holds the section's content once rendered
    pub fn root_selector(self) -> &'static str {
        match self {
            Section::Properties => "div.measure-properties",
            Section::Characteristics => "div.measure-characteristics",
            Section::Cascade => "div.measure-cascade",
            Section::Groups => "div.measure-groups",
            Section::ReportingStatus => "div.measure-reporting-status",
        }
    }

    /// Fields every row of this section carries, null when absent
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Section::Properties => properties::FIELDS,
            Section::Characteristics => characteristics::FIELDS,
            Section::Cascade => cascade::FIELDS,
            Section::Groups => groups::FIELDS,
            Section::ReportingStatus => reporting_status::FIELDS,
        }
    }
}

/// Extract `section`'s table from a rendered page.
pub fn extract(html: &str, section: Section) -> Result<SectionTable, ExtractError> {
    let document = Html::parse_document(html);
    extract_from(&document, section)
}

/// Same as [`extract`] for an already parsed document.
///
/// A missing root container is an error, not an empty table: an empty
/// section and a page whose structure changed are different findings.
pub fn extract_from(document: &Html, section: Section) -> Result<SectionTable, ExtractError> {
    let root_selector = parse_selector(section.root_selector())?;
    let root = document
        .select(&root_selector)
        .next()
        .ok_or_else(|| ExtractError::SelectorNotFound {
            section,
            selector: section.root_selector().to_string(),
        })?;

    match section {
        Section::Properties => properties::extract(root),
        Section::Characteristics => characteristics::extract(root),
        Section::Cascade => cascade::extract(root),
        Section::Groups => groups::extract(root),
        Section::ReportingStatus => reporting_status::extract(root),
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Matches of `selector` under `scope` that are not nested inside another
/// match.
pub(crate) fn outermost<'a>(scope: ElementRef<'a>, selector: &Selector) -> Vec<ElementRef<'a>> {
    scope
        .select(selector)
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| a.id() != scope.id())
                .any(|a| selector.matches(&a))
        })
        .collect()
}

/// Child elements of `parent` with tag `name`
pub(crate) fn children_named<'a>(
    parent: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == name)
}

/// Element text with whitespace runs collapsed to single spaces
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value of a data cell: the first link's href if there is one, otherwise
/// the cell text. Empty cells are null.
pub(crate) fn cell_value(cell: ElementRef<'_>) -> Result<Option<String>, ExtractError> {
    let link = parse_selector("a[href]")?;
    if let Some(href) = cell
        .select(&link)
        .next()
        .and_then(|a| a.value().attr("href"))
    {
        let href = href.trim();
        if !href.is_empty() {
            return Ok(Some(href.to_string()));
        }
    }
    let text = element_text(cell);
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Label text with surrounding whitespace and a trailing colon removed
pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().trim_end_matches(':').trim_end().to_string()
}

/// Label/value pairs of a Bootstrap grid: every `div.row` with a
/// `div.col-md-3` label and a `div.col-md-7` value.
pub(crate) fn label_value_pairs(
    scope: ElementRef<'_>,
) -> Result<Vec<(String, Option<String>)>, ExtractError> {
    let row_selector = parse_selector("div.row")?;
    let label_selector = parse_selector("div.col-md-3")?;
    let value_selector = parse_selector("div.col-md-7")?;

    let mut pairs = Vec::new();
    for row in scope.select(&row_selector) {
        let (Some(label), Some(value)) = (
            row.select(&label_selector).next(),
            row.select(&value_selector).next(),
        ) else {
            continue;
        };
        let label = normalize_label(&element_text(label));
        if label.is_empty() {
            continue;
        }
        pairs.push((label, cell_value(value)?));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_numbers() {
        let numbers: Vec<u8> = Section::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 3, 4, 5, 7]);
    }

    #[test]
    fn test_section_order_matches_output_order() {
        let mut sorted = Section::ALL;
        sorted.sort();
        assert_eq!(sorted, Section::ALL);
    }

    #[test]
    fn test_builtin_selectors_parse() {
        for section in Section::ALL {
            assert!(parse_selector(section.root_selector()).is_ok());
            assert!(!section.fields().is_empty());
        }
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = extract("<html><body><p>moved</p></body></html>", Section::Groups).unwrap_err();
        assert_eq!(
            err,
            ExtractError::SelectorNotFound {
                section: Section::Groups,
                selector: "div.measure-groups".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_root_is_an_empty_table() {
        let html = r#"<div class="measure-reporting-status"><table><thead><tr><th>Program</th></tr></thead><tbody></tbody></table></div>"#;
        let table = extract(html, Section::ReportingStatus).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_cell_value_prefers_link() {
        let html = Html::parse_fragment(
            r#"<div class="col-md-7"> See <a href="https://example.org/spec.pdf">spec</a> </div>"#,
        );
        let sel = parse_selector("div.col-md-7").unwrap();
        let cell = html.select(&sel).next().unwrap();
        assert_eq!(
            cell_value(cell).unwrap().as_deref(),
            Some("https://example.org/spec.pdf")
        );
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Numerator: "), "Numerator");
        assert_eq!(normalize_label("Data Source"), "Data Source");
    }
}
