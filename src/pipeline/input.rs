//! Input resolution: turn a path, URL or byte buffer into a validated [`Document`].
//!
//! Both the OCR service and pdfium take the document as bytes, so URL inputs
//! are downloaded straight into memory. Validation (non-empty, `%PDF` magic,
//! size limit) happens here so callers get a meaningful error before any
//! external service is contacted.

use crate::config::ExtractionConfig;
use crate::error::StatementError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A statement document: immutable bytes plus a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    bytes: Vec<u8>,
    name: String,
}

impl Document {
    /// Validate and wrap document bytes.
    pub fn new(
        bytes: Vec<u8>,
        name: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, StatementError> {
        let name = name.into();
        if bytes.is_empty() {
            return Err(StatementError::EmptyDocument { name });
        }
        if bytes.len() > max_size {
            return Err(StatementError::FileTooLarge {
                name,
                size: bytes.len(),
                limit: max_size,
            });
        }
        if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(StatementError::NotAPdf { name, magic });
        }
        Ok(Self { bytes, name })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP(S) URL.
pub async fn load_document(
    input: &str,
    config: &ExtractionConfig,
) -> Result<Document, StatementError> {
    if is_url(input) {
        download_url(input, config).await
    } else {
        read_local(input, config).await
    }
}

async fn read_local(path_str: &str, config: &ExtractionConfig) -> Result<Document, StatementError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(StatementError::PermissionDenied { path });
        }
        Err(_) => return Err(StatementError::FileNotFound { path }),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());

    Document::new(bytes, name, config.max_file_size)
}

async fn download_url(url: &str, config: &ExtractionConfig) -> Result<Document, StatementError> {
    info!("Downloading statement from: {}", url);
    let timeout_secs = config.download_timeout_secs;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StatementError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            StatementError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StatementError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(StatementError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| StatementError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Document::new(bytes.to_vec(), filename_from_url(url), config.max_file_size)
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "statement.pdf".to_string()
}
