//! Multi-page table merging and per-page markup rendering.
//!
//! Statement tables routinely run across page boundaries, with the OCR engine
//! repeating the column header on each page. The merger walks every table of
//! the document in order and keeps one "open" logical table: a fragment whose
//! header equals the open table's header (element-wise, order-sensitive)
//! extends it; any other header closes it and opens a new one. Pages without
//! tables leave the open table untouched.
//!
//! ## Page markup policy
//!
//! Merged rows are tracked in [`MergedTable`]s for reporting, but each page's
//! markup is rendered from that page's own fragments only. Extraction runs per
//! page and results are concatenated, so re-emitting carried-over rows on a
//! continuation page would make the model return those transactions twice.

use crate::pipeline::tables::Table;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The table fragments parsed from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTables {
    /// 1-indexed page number.
    pub page_num: usize,
    pub tables: Vec<Table>,
}

impl PageTables {
    pub fn new(page_num: usize, tables: Vec<Table>) -> Self {
        Self { page_num, tables }
    }

    /// Render this page's fragments as the markup fed to extraction.
    pub fn markup(&self) -> String {
        render_page_markup(&self.tables)
    }
}

/// A logical table assembled from consecutive fragments sharing a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTable {
    /// Header of the first fragment.
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub first_page: usize,
    pub last_page: usize,
    /// Number of fragments folded into this table.
    pub fragments: usize,
}

impl MergedTable {
    fn open(page_num: usize, table: &Table) -> Self {
        Self {
            header: table.header.clone(),
            rows: table.rows.clone(),
            first_page: page_num,
            last_page: page_num,
            fragments: 1,
        }
    }
}

/// Per-page fragments (to render) plus the logical tables they form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub pages: Vec<PageTables>,
    pub merged: Vec<MergedTable>,
}

/// Merge tables across pages. Pages must be supplied in page order.
pub fn merge_across_pages(pages: Vec<PageTables>) -> MergeOutcome {
    let mut merged: Vec<MergedTable> = Vec::new();
    let mut current: Option<MergedTable> = None;

    for page in &pages {
        for table in &page.tables {
            match current.as_mut() {
                Some(open) if open.header == table.header => {
                    open.rows.extend(table.rows.iter().cloned());
                    open.last_page = page.page_num;
                    open.fragments += 1;
                    debug!(
                        "Page {}: continued table from page {} (+{} rows)",
                        page.page_num,
                        open.first_page,
                        table.rows.len()
                    );
                }
                _ => {
                    if let Some(closed) = current.replace(MergedTable::open(page.page_num, table)) {
                        merged.push(closed);
                    }
                }
            }
        }
    }
    if let Some(closed) = current {
        merged.push(closed);
    }

    MergeOutcome { pages, merged }
}

/// Serialise one table as plain `<table>` markup with escaped cell text.
pub fn render_table_markup(table: &Table) -> String {
    let mut html = String::from("<table>\n<thead><tr>");
    for h in &table.header {
        html.push_str("<th>");
        html.push_str(&html_escape::encode_text(h));
        html.push_str("</th>");
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&html_escape::encode_text(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody></table>\n");
    html
}

/// Concatenate a page's tables into one markup string (empty when no tables).
pub fn render_page_markup(tables: &[Table]) -> String {
    tables
        .iter()
        .map(render_table_markup)
        .collect::<Vec<_>>()
        .join("\n")
}
