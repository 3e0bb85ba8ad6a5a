//! Cascade of Meaningful Measures (`sectionNumber=4`).
//!
//! The page renders the cascade as nested lists. Every root-to-leaf path
//! becomes one row, one column per nesting level.

use scraper::ElementRef;

use super::{element_text, parse_selector};
use crate::errors::ExtractError;
use crate::types::{Row, SectionTable};

pub const FIELDS: &[&str] = &["Priority", "Cascade Goal", "Meaningful Measure Area"];

pub fn extract(root: ElementRef<'_>) -> Result<SectionTable, ExtractError> {
    let item_selector = parse_selector("li")?;

    let mut table = Vec::new();
    for item in root.select(&item_selector) {
        if has_nested_item(item) {
            continue;
        }

        let mut path: Vec<String> = item
            .ancestors()
            .take_while(|node| node.id() != root.id())
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "li")
            .map(own_label)
            .collect();
        path.reverse();
        path.push(own_label(item));

        let mut row = Row::with_fields(FIELDS);
        for (depth, label) in path.into_iter().enumerate() {
            let value = if label.is_empty() { None } else { Some(label) };
            match FIELDS.get(depth) {
                Some(field) => row.set(field, value),
                None => row.set(&format!("Level {}", depth + 1), value),
            }
        }
        if !row.is_blank() {
            table.push(row);
        }
    }
    Ok(table)
}

fn has_nested_item(item: ElementRef<'_>) -> bool {
    item.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().name() == "li")
}

/// Text of a list item without the text of its nested lists
fn own_label(item: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for child in item.children() {
        if let Some(text) = child.value().as_text() {
            parts.extend(text.split_whitespace().map(str::to_string));
        } else if let Some(el) = ElementRef::wrap(child) {
            if matches!(el.value().name(), "ul" | "ol") {
                continue;
            }
            let text = element_text(el);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use crate::scraper::sections::{extract, Section};

    const SAMPLE_HTML: &str = r#"<html><body>
<div class="measure-cascade">
  <ul>
    <li><span>Person-Centered Care</span>
      <ul>
        <li>Seamless Care Coordination
          <ul>
            <li>Admissions and Readmissions</li>
            <li>Transfer of Health Information</li>
          </ul>
        </li>
      </ul>
    </li>
    <li>Safety
      <ul>
        <li>Healthcare-Associated Infections</li>
      </ul>
    </li>
  </ul>
</div>
</body></html>"#;

    #[test]
    fn test_one_row_per_leaf_path() {
        let table = extract(SAMPLE_HTML, Section::Cascade).unwrap();
        assert_eq!(table.len(), 3);

        assert_eq!(table[0].get("Priority"), Some("Person-Centered Care"));
        assert_eq!(table[0].get("Cascade Goal"), Some("Seamless Care Coordination"));
        assert_eq!(
            table[0].get("Meaningful Measure Area"),
            Some("Admissions and Readmissions")
        );
        assert_eq!(
            table[1].get("Meaningful Measure Area"),
            Some("Transfer of Health Information")
        );

        // Shorter path leaves deeper levels null
        assert_eq!(table[2].get("Priority"), Some("Safety"));
        assert_eq!(table[2].get("Cascade Goal"), Some("Healthcare-Associated Infections"));
        assert_eq!(table[2].get("Meaningful Measure Area"), None);
    }

    #[test]
    fn test_deep_nesting_adds_level_columns() {
        let html = r#"<div class="measure-cascade"><ul><li>A<ul><li>B<ul><li>C<ul><li>D</li></ul></li></ul></li></ul></li></ul></div>"#;
        let table = extract(html, Section::Cascade).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].get("Level 4"), Some("D"));
    }

    #[test]
    fn test_empty_cascade() {
        let table = extract(r#"<div class="measure-cascade"><ul></ul></div>"#, Section::Cascade).unwrap();
        assert!(table.is_empty());
    }
}
