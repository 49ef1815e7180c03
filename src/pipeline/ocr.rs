//! OCR stage: document bytes → per-page markdown.
//!
//! The OCR engine is a black box behind [`OcrService`]. The production
//! implementation, [`MistralOcr`], posts the whole PDF as a base64 data URI to
//! Mistral's `/v1/ocr` endpoint, which returns one markdown string per page.
//! Any failure here is fatal for the request.

use crate::error::StatementError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Default Mistral API base URL.
pub const MISTRAL_API_BASE: &str = "https://api.mistral.ai";

/// One OCR'd page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPage {
    /// 0-indexed page position reported by the engine.
    pub index: usize,
    pub markdown: String,
}

/// Converts a whole document into ordered per-page markdown.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Pages are returned in page order.
    async fn ocr(&self, document: &[u8], filename: &str) -> Result<Vec<OcrPage>, StatementError>;
}

/// [`OcrService`] backed by the Mistral OCR API.
#[derive(Debug, Clone)]
pub struct MistralOcr {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl MistralOcr {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, StatementError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StatementError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: MISTRAL_API_BASE.to_string(),
            model: model.into(),
        })
    }

    /// Build from `MISTRAL_API_KEY` (and optional `MISTRAL_API_BASE`).
    pub fn from_env(model: impl Into<String>, timeout_secs: u64) -> Result<Self, StatementError> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StatementError::ProviderNotConfigured {
                provider: "mistral-ocr".to_string(),
                hint: "MISTRAL_API_KEY is required for OCR. Set it in the environment.".to_string(),
            })?;
        let mut ocr = Self::new(api_key, model, timeout_secs)?;
        if let Ok(base) = std::env::var("MISTRAL_API_BASE") {
            if !base.is_empty() {
                ocr = ocr.with_base_url(base);
            }
        }
        Ok(ocr)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    pages: Vec<OcrResponsePage>,
}

#[derive(Debug, Deserialize)]
struct OcrResponsePage {
    index: usize,
    #[serde(default)]
    markdown: String,
}

fn parse_response(body: &str) -> Result<Vec<OcrPage>, StatementError> {
    let response: OcrResponse =
        serde_json::from_str(body).map_err(|e| StatementError::OcrFailed {
            detail: format!("unreadable OCR response: {e}"),
        })?;
    let mut pages: Vec<OcrPage> = response
        .pages
        .into_iter()
        .map(|p| OcrPage {
            index: p.index,
            markdown: p.markdown,
        })
        .collect();
    pages.sort_by_key(|p| p.index);
    Ok(pages)
}

#[async_trait]
impl OcrService for MistralOcr {
    async fn ocr(&self, document: &[u8], filename: &str) -> Result<Vec<OcrPage>, StatementError> {
        info!("OCR: sending '{}' ({} bytes) to {}", filename, document.len(), self.model);

        let body = json!({
            "model": self.model,
            "document": {
                "type": "document_url",
                "document_url": format!("data:application/pdf;base64,{}", STANDARD.encode(document)),
                "document_name": filename,
            },
            "include_image_base64": false,
        });

        let response = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StatementError::OcrFailed {
                detail: if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StatementError::OcrFailed {
                detail: format!("reading response body: {e}"),
            })?;

        if !status.is_success() {
            let snippet: String = text.chars().take(300).collect();
            return Err(StatementError::OcrFailed {
                detail: format!("HTTP {status}: {snippet}"),
            });
        }

        let pages = parse_response(&text)?;
        debug!("OCR returned {} pages", pages.len());
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_sorts_pages() {
        let body = r#"{
            "pages": [
                {"index": 1, "markdown": "second", "images": [], "dimensions": null},
                {"index": 0, "markdown": "first"}
            ],
            "model": "mistral-ocr-latest",
            "usage_info": {"pages_processed": 2}
        }"#;
        let pages = parse_response(body).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].markdown, "first");
        assert_eq!(pages[1].index, 1);
    }

    #[test]
    fn parse_response_rejects_garbage() {
        let err = parse_response("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, StatementError::OcrFailed { .. }));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let ocr = MistralOcr::new("k", "mistral-ocr-latest", 5)
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(ocr.base_url, "http://localhost:9000");
        assert_eq!(ocr.model(), "mistral-ocr-latest");
    }
}
