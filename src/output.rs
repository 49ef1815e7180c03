//! Result types and export helpers.
//!
//! [`ProcessingResult`] is what a request produces: the flattened
//! [`TransactionRecord`]s in page order, plus per-page outcomes and timing so
//! callers can see which pages were skipped or degraded instead of guessing
//! from a short record list.

use crate::error::{DegradeReason, StatementError};
use crate::pipeline::merge::MergedTable;
use crate::schema::ColumnSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;

/// One transaction: column name → scalar value (string, number or null).
///
/// Keys are always drawn from the request's [`ColumnSchema`] and appear in
/// schema order. Built only by [`crate::pipeline::extract`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRecord(Map<String, Value>);

impl TransactionRecord {
    pub(crate) fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Cell text for CSV output: strings verbatim, numbers formatted, null/missing empty.
    pub fn cell(&self, column: &str) -> String {
        match self.0.get(column) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<TransactionRecord> for Value {
    fn from(r: TransactionRecord) -> Self {
        Value::Object(r.0)
    }
}

/// Why a page never reached the extraction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No table survived reconstruction on this page.
    NoTableMarkup,
    /// The renderer produced fewer pages than OCR.
    NoImage,
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Extracted { records: usize },
    Skipped { reason: SkipReason },
    Degraded { reason: DegradeReason },
}

/// Per-page report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Table fragments reconstructed on this page.
    pub tables: usize,
    pub outcome: PageOutcome,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// A logical table after cross-page merging, without its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTableSummary {
    pub header: Vec<String>,
    pub rows: usize,
    pub first_page: usize,
    pub last_page: usize,
}

impl From<&MergedTable> for MergedTableSummary {
    fn from(t: &MergedTable) -> Self {
        Self {
            header: t.header.clone(),
            rows: t.rows.len(),
            first_page: t.first_page,
            last_page: t.last_page,
        }
    }
}

/// Aggregate statistics for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_pages: usize,
    pub extracted_pages: usize,
    pub skipped_pages: usize,
    pub degraded_pages: usize,
    pub total_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub ocr_duration_ms: u64,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a request produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub columns: ColumnSchema,
    /// Records in page order, then model order within a page.
    pub records: Vec<TransactionRecord>,
    pub pages: Vec<PageReport>,
    pub merged_tables: Vec<MergedTableSummary>,
    pub stats: ProcessingStats,
}

impl ProcessingResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record-oriented JSON with a summary envelope.
    pub fn to_json(&self) -> Value {
        if self.records.is_empty() {
            return json!({
                "message": "No transaction data found in the PDF",
                "data": [],
            });
        }
        json!({
            "message": "Processing completed successfully",
            "total_transactions": self.records.len(),
            "columns": self.columns.names(),
            "data": self.records,
        })
    }

    /// Records with a synthetic `id` field numbered from 1, wrapped as
    /// `{"transactions": [...]}`.
    pub fn with_sequential_ids(&self) -> Value {
        let numbered: Vec<Value> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut fields = r.0.clone();
                fields.insert("id".to_string(), Value::from(i + 1));
                Value::Object(fields)
            })
            .collect();
        json!({ "transactions": numbered })
    }

    /// CSV with the schema as header. Missing or null cells are empty.
    pub fn to_csv(&self) -> Result<String, StatementError> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::<u8>::new());
        writer.write_record(self.columns.names())?;
        for record in &self.records {
            writer.write_record(self.columns.names().iter().map(|c| record.cell(c)))?;
        }
        writer.flush().map_err(|e| StatementError::Export(e.to_string()))?;

        let bytes = writer
            .into_inner()
            .map_err(|e| StatementError::Export(e.into_error().to_string()))?;
        String::from_utf8(bytes)
            .map_err(|e| StatementError::Export(format!("invalid utf-8 csv output: {e}")))
    }
}

/// Write `contents` to `path` atomically (temp file in the same directory, then rename).
pub fn write_output(path: &Path, contents: &str) -> Result<(), StatementError> {
    let write_err = |source: std::io::Error| StatementError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> TransactionRecord {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        TransactionRecord::from_fields(m)
    }

    fn result(records: Vec<TransactionRecord>) -> ProcessingResult {
        ProcessingResult {
            columns: ColumnSchema::new(["Date", "Narration", "Amount"]).unwrap(),
            records,
            pages: vec![],
            merged_tables: vec![],
            stats: ProcessingStats::default(),
        }
    }

    #[test]
    fn csv_uses_schema_order_and_blanks() {
        let r = result(vec![
            record(&[("Amount", json!(10.5)), ("Date", json!("1/1"))]),
            record(&[("Date", json!("2/1")), ("Narration", json!("ATM, Main St")), ("Amount", Value::Null)]),
        ]);
        let csv = r.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Narration,Amount");
        assert_eq!(lines[1], "1/1,,10.5");
        assert_eq!(lines[2], "2/1,\"ATM, Main St\",");
    }

    #[test]
    fn sequential_ids_start_at_one() {
        let r = result(vec![
            record(&[("Date", json!("1/1"))]),
            record(&[("Date", json!("2/1"))]),
        ]);
        let v = r.with_sequential_ids();
        assert_eq!(v["transactions"][0]["id"], json!(1));
        assert_eq!(v["transactions"][1]["id"], json!(2));
        assert_eq!(v["transactions"][1]["Date"], json!("2/1"));
    }

    #[test]
    fn json_envelope_for_empty_result() {
        let v = result(vec![]).to_json();
        assert_eq!(v["data"], json!([]));
        assert!(v.get("total_transactions").is_none());
    }

    #[test]
    fn write_output_is_atomic_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_output(&path, "Date\n1/1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Date\n1/1\n");
    }
}
