//! Reporting Status section (`sectionNumber=7`).
//!
//! A plain HTML table. Header cells give the keys, each body row is a row.

use scraper::ElementRef;

use super::{cell_value, children_named, element_text, normalize_label, outermost, parse_selector};
use crate::errors::ExtractError;
use crate::types::{Row, SectionTable};

pub const FIELDS: &[&str] = &["Program", "Reporting Status", "Start Date", "End Date"];

pub fn extract(root: ElementRef<'_>) -> Result<SectionTable, ExtractError> {
    let table_selector = parse_selector("table")?;

    let mut table = Vec::new();
    // Tables nested in a cell are part of that cell's value
    for element in outermost(root, &table_selector) {
        let rows = table_rows(element);
        let headers: Vec<String> = rows
            .iter()
            .flat_map(|tr| children_named(*tr, "th"))
            .map(|th| normalize_label(&element_text(th)))
            .collect();

        for tr in rows {
            let cells: Vec<ElementRef<'_>> = children_named(tr, "td").collect();
            if cells.is_empty() || is_placeholder(&cells) {
                continue;
            }

            let mut row = Row::with_fields(FIELDS);
            for (i, cell) in cells.into_iter().enumerate() {
                let key = match headers.get(i) {
                    Some(h) if !h.is_empty() => h.clone(),
                    _ => format!("Column {}", i + 1),
                };
                row.set(&key, cell_value(cell)?);
            }
            if !row.is_blank() {
                table.push(row);
            }
        }
    }
    Ok(table)
}

/// Rows that belong to `table` itself
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(children_named(child, "tr")),
            _ => {}
        }
    }
    rows
}

/// "No data" rows are a single cell spanning the whole table
fn is_placeholder(cells: &[ElementRef<'_>]) -> bool {
    cells.len() == 1
        && cells[0]
            .value()
            .attr("colspan")
            .and_then(|span| span.trim().parse::<u32>().ok())
            .is_some_and(|span| span > 1)
}

#[cfg(test)]
mod tests {
    use crate::scraper::sections::{extract, Section};

    const SAMPLE_HTML: &str = r#"<html><body>
<div class="measure-reporting-status">
  <table class="table">
    <thead>
      <tr><th>Program</th><th>Reporting Status</th><th>Start Date</th><th>End Date</th></tr>
    </thead>
    <tbody>
      <tr><td>Hospital IQR</td><td>Active</td><td>10/01/2012</td><td></td></tr>
      <tr><td>Hospital VBP</td><td>Retired</td><td>10/01/2014</td><td>09/30/2019</td></tr>
    </tbody>
  </table>
</div>
</body></html>"#;

    #[test]
    fn test_parse_reporting_status() {
        let table = extract(SAMPLE_HTML, Section::ReportingStatus).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].get("Program"), Some("Hospital IQR"));
        assert_eq!(table[0].get("Reporting Status"), Some("Active"));
        assert_eq!(table[0].get("End Date"), None);
        assert_eq!(table[1].get("End Date"), Some("09/30/2019"));
    }

    #[test]
    fn test_placeholder_row_is_skipped() {
        let html = r#"<div class="measure-reporting-status"><table>
            <thead><tr><th>Program</th><th>Reporting Status</th></tr></thead>
            <tbody><tr><td colspan="2">No reporting status available</td></tr></tbody>
        </table></div>"#;
        let table = extract(html, Section::ReportingStatus).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_unheaded_columns() {
        let html = r#"<div class="measure-reporting-status"><table>
            <tr><th>Program</th></tr>
            <tr><td>MIPS</td><td>Extra</td></tr>
        </table></div>"#;
        let table = extract(html, Section::ReportingStatus).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].get("Program"), Some("MIPS"));
        assert_eq!(table[0].get("Column 2"), Some("Extra"));
    }

    #[test]
    fn test_nested_table_stays_in_its_cell() {
        let html = r#"<div class="measure-reporting-status"><table>
            <thead><tr><th>Program</th><th>Reporting Status</th></tr></thead>
            <tbody>
              <tr><td>Hospital IQR</td><td><table><tr><td>Active</td></tr></table></td></tr>
            </tbody>
        </table></div>"#;
        let table = extract(html, Section::ReportingStatus).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].get("Program"), Some("Hospital IQR"));
        assert_eq!(table[0].get("Reporting Status"), Some("Active"));
        assert_eq!(table[0].get("Column 3"), None);
    }
}
