//! Groups section (`sectionNumber=5`).
//!
//! One panel per group. The panel heading is the group name; the body is
//! either a label/value grid or free text.

use scraper::{ElementRef, Selector};

use super::{element_text, label_value_pairs, outermost, parse_selector};
use crate::errors::ExtractError;
use crate::types::{Row, SectionTable};

pub const FIELDS: &[&str] = &["Group Name", "Group Type", "Description"];

pub fn extract(root: ElementRef<'_>) -> Result<SectionTable, ExtractError> {
    let panel_selector = parse_selector("div.panel, div.card")?;
    let heading_selector = parse_selector(".panel-heading, .card-header")?;
    let body_selector = parse_selector(".panel-body, .card-body")?;

    let mut table = Vec::new();
    // A panel nested in another panel's body is content of the outer group
    for panel in outermost(root, &panel_selector) {
        let mut row = Row::with_fields(FIELDS);

        if let Some(heading) = panel
            .select(&heading_selector)
            .find(|h| belongs_to(*h, panel, &panel_selector))
        {
            let name = element_text(heading);
            if !name.is_empty() {
                row.set("Group Name", Some(name));
            }
        }

        let pairs = label_value_pairs(panel)?;
        if pairs.is_empty() {
            if let Some(body) = panel.select(&body_selector).next() {
                let text = element_text(body);
                if !text.is_empty() {
                    row.set("Description", Some(text));
                }
            }
        }
        for (label, value) in pairs {
            row.set(&label, value);
        }

        if !row.is_blank() {
            table.push(row);
        }
    }
    Ok(table)
}

/// `element`'s closest enclosing panel is `panel`
fn belongs_to(element: ElementRef<'_>, panel: ElementRef<'_>, panel_selector: &Selector) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| panel_selector.matches(a))
        .is_some_and(|a| a.id() == panel.id())
}
