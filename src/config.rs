//! Configuration types for statement extraction.
//!
//! All processing behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is an explicit value handed
//! to [`crate::process::StatementProcessor`] at construction: model ids, the
//! rate-limit delay and size limits all live here rather than in process-wide
//! state, so two processors with different settings can run side by side.

use crate::error::StatementError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default extraction model (vision capable).
pub const DEFAULT_CHAT_MODEL: &str = "pixtral-12b-latest";

/// Default OCR model.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";

/// Default provider name passed to `ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "mistral";

/// Configuration for a statement extraction request.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_statement::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .rate_limit_delay_ms(500)
///     .chat_model("pixtral-large-latest")
///     .build()
///     .unwrap();
/// assert_eq!(config.rate_limit_delay_ms, 500);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Extraction model identifier. Default: `pixtral-12b-latest`.
    pub chat_model: String,

    /// LLM provider name (e.g. "mistral", "openai"). Default: `mistral`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// OCR model identifier. Default: `mistral-ocr-latest`.
    pub ocr_model: String,

    /// Pause before every extraction call except the first, in milliseconds.
    /// Default: 1000.
    ///
    /// Pages are processed strictly one after another. Skipped pages make no
    /// call and so add no pause, and nothing waits after the last call.
    pub rate_limit_delay_ms: u64,

    /// Sampling temperature for the extraction call. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Largest accepted document, in bytes. Default: 50 MiB.
    pub max_file_size: usize,

    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// What to do with rows whose cell count differs from the header.
    pub row_arity: RowArity,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for a single OCR HTTP request in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            provider_name: Some(DEFAULT_PROVIDER.to_string()),
            provider: None,
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            rate_limit_delay_ms: 1000,
            temperature: 0.0,
            max_tokens: 4096,
            max_file_size: 50 * 1024 * 1024,
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            row_arity: RowArity::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("chat_model", &self.chat_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("ocr_model", &self.ocr_model)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_file_size", &self.max_file_size)
            .field("dpi", &self.dpi)
            .field("row_arity", &self.row_arity)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The inter-page delay as a [`Duration`].
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn rate_limit_delay_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_delay_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn row_arity(mut self, policy: RowArity) -> Self {
        self.config.row_arity = policy;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, StatementError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(StatementError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_file_size == 0 {
            return Err(StatementError::InvalidConfig(
                "max_file_size must be > 0".into(),
            ));
        }
        if c.chat_model.trim().is_empty() {
            return Err(StatementError::InvalidConfig(
                "chat_model must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for table rows whose cell count differs from the header's.
///
/// OCR output regularly splits or merges cells. None of the policies is
/// right for every statement layout, so the choice is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowArity {
    /// Pass rows through unchanged (default). The model sees the raw shape
    /// and can realign against the page image.
    #[default]
    Keep,
    /// Pad short rows with empty cells, truncate long rows to the header width.
    Normalize,
    /// Discard rows that do not match the header width.
    Drop,
}
