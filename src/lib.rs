//! # edgequake-statement
//!
//! Extract transaction records from scanned bank statements into a
//! caller-chosen column layout.
//!
//! ## Why this crate?
//!
//! Statement PDFs are mostly images. OCR gets the characters right but the
//! structure wrong: tables split across pages, amounts wrapped in LaTeX, cells
//! broken by `<br>`. This crate rebuilds the tables from OCR markdown, then
//! lets a vision model map each page's table onto your columns while looking
//! at the page image, so misread digits can be cross-checked.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. OCR       whole document → markdown per page (Mistral OCR)
//!  ├─ 2. Tables    sanitize, parse pipe/HTML tables, merge across pages
//!  ├─ 3. Render    one PNG per page via pdfium (spawn_blocking)
//!  ├─ 4. Extract   page markup + image + columns → JSON records (VLM)
//!  └─ 5. Output    records in page order, CSV / JSON, per-page stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_statement::{ColumnSchema, ExtractionConfig, StatementProcessor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs MISTRAL_API_KEY for OCR and the default chat provider.
//!     let processor = StatementProcessor::from_config(ExtractionConfig::default())?;
//!     let columns = ColumnSchema::new(["Date", "Narration", "Withdrawal", "Deposit", "Balance"])?;
//!     let result = processor.process_file("statement.pdf", &columns).await?;
//!     print!("{}", result.to_csv()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `statement2csv` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, RowArity};
pub use error::{DegradeReason, ModelError, StatementError};
pub use output::{
    write_output, MergedTableSummary, PageOutcome, PageReport, ProcessingResult, ProcessingStats,
    SkipReason, TransactionRecord,
};
pub use pipeline::extract::{
    parse_model_response, CompletionSettings, ExtractionModel, LlmExtractionModel, ModelReply,
    ModelResponse,
};
pub use pipeline::input::Document;
pub use pipeline::merge::{merge_across_pages, MergedTable, PageTables};
pub use pipeline::ocr::{MistralOcr, OcrPage, OcrService};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use pipeline::sanitize::sanitize;
pub use pipeline::tables::{extract_tables, Table};
pub use process::StatementProcessor;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{is_known_bank, known_banks, suggested_columns, ColumnKind, ColumnSchema};
