//! Statement orchestration: document + column schema → transaction records.
//!
//! [`StatementProcessor`] owns the three external collaborators (OCR, page
//! renderer, extraction model) behind trait objects and drives one request
//! strictly page by page:
//!
//! ```text
//! bytes ─▶ OCR ─▶ sanitize+tables (per page) ─▶ merge ─▶ page markup ─┐
//!   └────▶ render (one image per page) ───────────────────────────────┴─▶ extract ─▶ records
//! ```
//!
//! Pages are processed sequentially because a fixed delay separates
//! consecutive extraction calls to stay under the model's rate limit.

use crate::config::ExtractionConfig;
use crate::error::StatementError;
use crate::output::{
    MergedTableSummary, PageOutcome, PageReport, ProcessingResult, ProcessingStats, SkipReason,
};
use crate::pipeline::extract::{
    extract_records, CompletionSettings, ExtractionModel, LlmExtractionModel, ModelResponse,
};
use crate::pipeline::input::{load_document, Document};
use crate::pipeline::merge::{merge_across_pages, PageTables};
use crate::pipeline::ocr::{MistralOcr, OcrService};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::tables::extract_page_tables;
use crate::schema::ColumnSchema;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives OCR, table reconstruction, rendering and extraction for a request.
///
/// The processor holds no per-request state and can be shared across
/// concurrent requests.
pub struct StatementProcessor {
    config: ExtractionConfig,
    ocr: Arc<dyn OcrService>,
    renderer: Arc<dyn PageRenderer>,
    model: Arc<dyn ExtractionModel>,
}

impl StatementProcessor {
    /// Build from explicit collaborators.
    pub fn new(
        config: ExtractionConfig,
        ocr: Arc<dyn OcrService>,
        renderer: Arc<dyn PageRenderer>,
        model: Arc<dyn ExtractionModel>,
    ) -> Self {
        Self {
            config,
            ocr,
            renderer,
            model,
        }
    }

    /// Build the production stack: Mistral OCR, pdfium rendering and the
    /// configured edgequake-llm provider.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, StatementError> {
        let provider = resolve_provider(&config)?;
        let ocr = MistralOcr::from_env(config.ocr_model.clone(), config.api_timeout_secs)?;
        let renderer = PdfiumRenderer::from_config(&config);
        Ok(Self::new(
            config,
            Arc::new(ocr),
            Arc::new(renderer),
            Arc::new(LlmExtractionModel::new(provider)),
        ))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract transactions from raw document bytes.
    ///
    /// The column schema is checked before any external call. OCR, rendering
    /// and model-service failures abort the request; a page whose model reply
    /// is malformed contributes zero records and is reported as degraded.
    pub async fn process(
        &self,
        bytes: &[u8],
        filename: &str,
        columns: &ColumnSchema,
    ) -> Result<ProcessingResult, StatementError> {
        check_columns(columns)?;
        let document = Document::new(bytes.to_vec(), filename, self.config.max_file_size)?;
        self.process_document(&document, columns).await
    }

    /// Load a local path or HTTP(S) URL, then [`process`](Self::process) it.
    pub async fn process_file(
        &self,
        input: &str,
        columns: &ColumnSchema,
    ) -> Result<ProcessingResult, StatementError> {
        check_columns(columns)?;
        let document = load_document(input, &self.config).await?;
        self.process_document(&document, columns).await
    }

    /// Blocking wrapper around [`process_file`](Self::process_file).
    ///
    /// Creates a temporary tokio runtime internally; do not call from async code.
    pub fn process_sync(
        &self,
        input: &str,
        columns: &ColumnSchema,
    ) -> Result<ProcessingResult, StatementError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| StatementError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process_file(input, columns))
    }

    /// Run the full pipeline over an already validated document.
    pub async fn process_document(
        &self,
        document: &Document,
        columns: &ColumnSchema,
    ) -> Result<ProcessingResult, StatementError> {
        check_columns(columns)?;
        let total_start = Instant::now();
        info!(
            "Processing '{}' ({} bytes) for {} columns",
            document.name(),
            document.len(),
            columns.len()
        );

        // ── Step 1: OCR ──────────────────────────────────────────────────
        let ocr_start = Instant::now();
        let ocr_pages = self.ocr.ocr(document.bytes(), document.name()).await?;
        let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
        info!("OCR produced {} pages in {}ms", ocr_pages.len(), ocr_duration_ms);

        // ── Step 2: Sanitize + tables, page by page ──────────────────────
        let page_tables: Vec<PageTables> = ocr_pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let tables: Vec<_> = extract_page_tables(&page.markdown)
                    .into_iter()
                    .filter_map(|t| t.conform(self.config.row_arity))
                    .collect();
                debug!("Page {}: {} tables", i + 1, tables.len());
                PageTables::new(i + 1, tables)
            })
            .collect();

        // ── Step 3: Merge across pages ───────────────────────────────────
        let merged = merge_across_pages(page_tables);
        debug!(
            "{} table fragments form {} logical tables",
            merged.pages.iter().map(|p| p.tables.len()).sum::<usize>(),
            merged.merged.len()
        );

        // ── Step 4: Render page images ───────────────────────────────────
        let render_start = Instant::now();
        let images = self
            .renderer
            .render_pages(document.bytes(), document.name())
            .await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        if images.len() != merged.pages.len() {
            warn!(
                "OCR found {} pages but rendering produced {} images; pairing the first {}",
                merged.pages.len(),
                images.len(),
                merged.pages.len().min(images.len())
            );
        }

        // ── Step 5: Per-page extraction ──────────────────────────────────
        let total_pages = merged.pages.len();
        let settings = CompletionSettings::from_config(&self.config);
        let delay = self.config.rate_limit_delay();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_start(total_pages);
        }

        let mut stats = ProcessingStats {
            total_pages,
            ocr_duration_ms,
            render_duration_ms,
            ..Default::default()
        };
        let mut records = Vec::new();
        let mut reports = Vec::with_capacity(total_pages);
        let mut called_model = false;
        let extraction_start = Instant::now();

        for page in &merged.pages {
            let page_num = page.page_num;
            let markup = page.markup();
            let image = images.get(page_num - 1);

            let skip = if markup.trim().is_empty() {
                Some(SkipReason::NoTableMarkup)
            } else if image.is_none() {
                Some(SkipReason::NoImage)
            } else {
                None
            };

            let (Some(image), None) = (image, skip) else {
                let reason = skip.unwrap_or(SkipReason::NoImage);
                debug!("Page {}: skipped ({:?})", page_num, reason);
                stats.skipped_pages += 1;
                if let Some(cb) = cb {
                    cb.on_page_skipped(page_num, total_pages);
                }
                reports.push(PageReport {
                    page_num,
                    tables: page.tables.len(),
                    outcome: PageOutcome::Skipped { reason },
                    input_tokens: 0,
                    output_tokens: 0,
                    duration_ms: 0,
                });
                continue;
            };

            if called_model && !delay.is_zero() {
                debug!("Rate limit: waiting {:?} before page {}", delay, page_num);
                tokio::time::sleep(delay).await;
            }
            called_model = true;

            if let Some(cb) = cb {
                cb.on_page_start(page_num, total_pages);
            }

            let extraction = extract_records(
                self.model.as_ref(),
                page_num,
                &markup,
                image,
                columns,
                &settings,
            )
            .await?;

            stats.total_input_tokens += extraction.input_tokens as u64;
            stats.total_output_tokens += extraction.output_tokens as u64;

            let outcome = match extraction.response {
                ModelResponse::Records(page_records) => {
                    stats.extracted_pages += 1;
                    let count = page_records.len();
                    records.extend(page_records);
                    PageOutcome::Extracted { records: count }
                }
                ModelResponse::Degraded(reason) => {
                    stats.degraded_pages += 1;
                    PageOutcome::Degraded { reason }
                }
            };

            if let Some(cb) = cb {
                let count = match outcome {
                    PageOutcome::Extracted { records } => records,
                    _ => 0,
                };
                cb.on_page_complete(page_num, total_pages, count);
            }

            reports.push(PageReport {
                page_num,
                tables: page.tables.len(),
                outcome,
                input_tokens: extraction.input_tokens,
                output_tokens: extraction.output_tokens,
                duration_ms: extraction.duration_ms,
            });
        }

        // ── Step 6: Assemble ─────────────────────────────────────────────
        stats.extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
        stats.total_records = records.len();
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Extraction complete: {} records from {}/{} pages ({} skipped, {} degraded), {}ms total",
            stats.total_records,
            stats.extracted_pages,
            total_pages,
            stats.skipped_pages,
            stats.degraded_pages,
            stats.total_duration_ms
        );

        if let Some(cb) = cb {
            cb.on_complete(records.len());
        }

        Ok(ProcessingResult {
            columns: columns.clone(),
            records,
            pages: reports,
            merged_tables: merged.merged.iter().map(MergedTableSummary::from).collect(),
            stats,
        })
    }
}

fn check_columns(columns: &ColumnSchema) -> Result<(), StatementError> {
    columns.validate()
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Pick the chat provider for extraction.
///
/// 1. An explicit `provider` on the config.
/// 2. `provider_name` + `chat_model` through [`ProviderFactory::create_llm_provider`],
///    which reads the provider's API key from the environment.
/// 3. Full auto-detection with [`ProviderFactory::from_env`].
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, StatementError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return ProviderFactory::create_llm_provider(name, &config.chat_model).map_err(|e| {
            StatementError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        });
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StatementError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set MISTRAL_API_KEY or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_check_accepts_valid_schema() {
        assert!(check_columns(&ColumnSchema::new(["Date", "Amount"]).unwrap()).is_ok());
    }

    #[test]
    fn duplicate_columns_never_reach_the_pipeline() {
        let err = serde_json::from_str::<ColumnSchema>(r#"{"names": ["Date", "Date"]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }
}
