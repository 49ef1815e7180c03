//! Table extraction: sanitized markdown → ordered `(header, rows)` tables.
//!
//! Rather than hand-parse pipe syntax, the markdown is rendered to HTML with
//! pulldown-cmark's GFM table extension and the resulting `<table>` elements
//! are read back with scraper. This buys the full table grammar (escaped
//! pipes, inline formatting, alignment rows) and also picks up raw HTML tables
//! that OCR engines sometimes emit instead of pipe tables.

use crate::config::RowArity;
use crate::pipeline::sanitize::sanitize;
use pulldown_cmark::{html, Options, Parser};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A table parsed from one page: a header and its data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// A table is worth keeping only with a header and at least one row.
    pub fn is_usable(&self) -> bool {
        !self.header.is_empty() && !self.rows.is_empty()
    }

    /// Apply a [`RowArity`] policy. Returns `None` when no rows survive.
    pub fn conform(mut self, policy: RowArity) -> Option<Table> {
        let width = self.header.len();
        match policy {
            RowArity::Keep => {}
            RowArity::Normalize => {
                for row in &mut self.rows {
                    row.resize(width, String::new());
                }
            }
            RowArity::Drop => {
                let before = self.rows.len();
                self.rows.retain(|r| r.len() == width);
                if self.rows.len() != before {
                    debug!(
                        "Dropped {} rows not matching header width {}",
                        before - self.rows.len(),
                        width
                    );
                }
            }
        }
        self.is_usable().then_some(self)
    }
}

/// Sanitize a page's raw OCR markdown, then extract its tables.
pub fn extract_page_tables(raw_markdown: &str) -> Vec<Table> {
    extract_tables(&sanitize(raw_markdown))
}

/// Extract every usable table from (already sanitized) markdown, in document order.
///
/// Tables without a header or without data rows are dropped. Malformed input
/// yields an empty list, never an error.
pub fn extract_tables(markdown: &str) -> Vec<Table> {
    let html = markdown_to_html(markdown);
    parse_html_tables(&html)
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}

fn parse_html_tables(html: &str) -> Vec<Table> {
    let (Ok(table_sel), Ok(row_sel), Ok(th_sel), Ok(td_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let doc = Html::parse_fragment(html);
    let mut tables = Vec::new();

    for table in doc.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(first) = rows.next() else {
            continue;
        };
        let header: Vec<String> = first.select(&th_sel).map(cell_text).collect();
        let data: Vec<Vec<String>> = rows
            .map(|tr| tr.select(&td_sel).map(cell_text).collect::<Vec<_>>())
            .filter(|cells| !cells.is_empty())
            .collect();

        let t = Table::new(header, data);
        if t.is_usable() {
            tables.push(t);
        } else {
            debug!(
                "Skipping table with {} header cells and {} rows",
                t.header.len(),
                t.rows.len()
            );
        }
    }

    tables
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let raw: String = cell.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn single_pipe_table() {
        let md = "| Date | Amount |\n| --- | --- |\n| 01/01 | 100 |\n";
        let tables = extract_tables(md);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].header, strings(&["Date", "Amount"]));
        assert_eq!(tables[0].rows, vec![strings(&["01/01", "100"])]);
    }

    #[test]
    fn header_only_table_is_dropped() {
        let md = "| Date | Amount |\n| --- | --- |\n";
        assert!(extract_tables(md).is_empty());
    }

    #[test]
    fn tables_in_document_order() {
        let md = "| A | B |\n| - | - |\n| 1 | 2 |\n\nsome text\n\n| C |\n| - |\n| 3 |\n";
        let tables = extract_tables(md);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].header, strings(&["A", "B"]));
        assert_eq!(tables[1].header, strings(&["C"]));
        assert_eq!(tables[1].rows, vec![strings(&["3"])]);
    }

    #[test]
    fn malformed_markdown_yields_nothing() {
        assert!(extract_tables("| not | a table\njust words").is_empty());
        assert!(extract_tables("").is_empty());
    }

    #[test]
    fn inline_formatting_flattened() {
        let md = "| **Date** | *Narration* |\n| --- | --- |\n| 02/01 | UPI  to `shop` |\n";
        let t = &extract_tables(md)[0];
        assert_eq!(t.header, strings(&["Date", "Narration"]));
        assert_eq!(t.rows[0], strings(&["02/01", "UPI to shop"]));
    }

    #[test]
    fn raw_html_table_is_read() {
        let md = "<table><tr><th>Date</th><th>Amount</th></tr><tr><td>1/1</td><td>5</td></tr></table>\n";
        let tables = extract_tables(md);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![strings(&["1/1", "5"])]);
    }

    #[test]
    fn page_tables_are_sanitized_first() {
        let md = "Txns\n| Date | Amount |\n| --- | --- |\n| 01/01 | $$1,200.00$$<br> |\n";
        let tables = extract_page_tables(md);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[0], strings(&["01/01", "1,200.00"]));
    }

    #[test]
    fn conform_policies() {
        let t = Table::new(
            strings(&["A", "B"]),
            vec![strings(&["1"]), strings(&["1", "2"]), strings(&["1", "2", "3"])],
        );
        let kept = t.clone().conform(RowArity::Keep).unwrap();
        assert_eq!(kept, t);

        let norm = t.clone().conform(RowArity::Normalize).unwrap();
        assert!(norm.rows.iter().all(|r| r.len() == 2));
        assert_eq!(norm.rows[0], strings(&["1", ""]));

        let dropped = t.conform(RowArity::Drop).unwrap();
        assert_eq!(dropped.rows, vec![strings(&["1", "2"])]);

        let none = Table::new(strings(&["A", "B"]), vec![strings(&["x"])]).conform(RowArity::Drop);
        assert!(none.is_none());
    }
}
