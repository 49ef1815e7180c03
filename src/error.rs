//! Error types for the edgequake-statement library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StatementError`] is **fatal**: the request cannot produce a result at
//!   all (bad column schema, OCR service down, PDF cannot be rasterised,
//!   extraction model unreachable). Returned as `Err(StatementError)` from the
//!   top-level `process*` functions. No partial records accompany it.
//!
//! * [`DegradeReason`] is **local**: the extraction model answered, but its
//!   reply was not usable for one page (invalid JSON, wrong shape). The page
//!   contributes zero records and the request carries on. It is recorded in
//!   [`crate::output::PageOutcome::Degraded`] and never returned as an error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-statement library.
#[derive(Debug, Error)]
pub enum StatementError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The column schema is empty, not a list, or has blank/duplicate names.
    #[error("Invalid columns: {reason}")]
    InvalidColumns { reason: String },

    /// Input file was not found at the given path.
    #[error("Statement file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PDF.
    #[error("Document '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    /// The document is larger than `max_file_size`.
    #[error("Document '{name}' is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { name: String, size: usize, limit: usize },

    /// The document has no bytes at all.
    #[error("Document '{name}' is empty")]
    EmptyDocument { name: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR service failed; the whole request is aborted.
    #[error("OCR processing failed: {detail}")]
    OcrFailed { detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The extraction model call itself failed (network, auth, quota).
    #[error("Extraction model call failed on page {page}: {source}")]
    ExtractionFailed {
        page: usize,
        #[source]
        source: ModelError,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising records to CSV or JSON failed.
    #[error("Failed to export records: {0}")]
    Export(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<csv::Error> for StatementError {
    fn from(e: csv::Error) -> Self {
        StatementError::Export(e.to_string())
    }
}

/// A failed call to the extraction model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Error raised by the underlying LLM provider.
    #[error(transparent)]
    Provider(Box<dyn std::error::Error + Send + Sync>),

    /// Failure reported without an underlying error value.
    #[error("{0}")]
    Service(String),
}

impl ModelError {
    pub fn provider<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ModelError::Provider(Box::new(err))
    }
}

/// Why a page's model reply was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// The reply was not parseable JSON.
    #[error("model reply is not valid JSON: {detail}")]
    InvalidJson { detail: String },

    /// The reply parsed but is neither a list nor an object.
    #[error("model reply has unexpected shape: {found}")]
    UnexpectedShape { found: String },

    /// The reply is an object without any list-valued field.
    #[error("model reply object has no list of records")]
    NoListInObject,
}
