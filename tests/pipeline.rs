//! Orchestrator integration tests with in-memory OCR, renderer and model.
//!
//! No network and no pdfium: every external collaborator is a mock that
//! counts its calls, so the tests can assert which services were reached.

use async_trait::async_trait;
use edgequake_llm::ImageData;
use edgequake_statement::{
    ColumnSchema, CompletionSettings, DegradeReason, ExtractionConfig, ExtractionModel,
    ExtractionProgressCallback, ModelError, ModelReply, OcrPage, OcrService, PageOutcome,
    PageRenderer, SkipReason, StatementError, StatementProcessor,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const PDF: &[u8] = b"%PDF-1.7\nfake statement body\n";

const PAGE_1: &str = "# Statement of Account\nAccount 1234\n\
| Date | Narration | Amount |\n|---|---|---|\n| 01/01 | Opening credit | 10 |\n";
const PAGE_2: &str = "| Date | Narration | Amount |\n|---|---|---|\n| 02/01 | ATM cash | 20 |\n";
const NO_TABLE: &str = "Continued overleaf.\n\nThis page is intentionally left blank.\n";

// ── Mocks ────────────────────────────────────────────────────────────────────

struct MockOcr {
    pages: Result<Vec<String>, String>,
    calls: AtomicUsize,
}

impl MockOcr {
    fn pages(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            pages: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OcrService for MockOcr {
    async fn ocr(&self, _document: &[u8], _filename: &str) -> Result<Vec<OcrPage>, StatementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.pages {
            Ok(pages) => Ok(pages
                .iter()
                .enumerate()
                .map(|(index, markdown)| OcrPage {
                    index,
                    markdown: markdown.clone(),
                })
                .collect()),
            Err(detail) => Err(StatementError::OcrFailed {
                detail: detail.clone(),
            }),
        }
    }
}

struct MockRenderer {
    images: Result<usize, String>,
    calls: AtomicUsize,
}

impl MockRenderer {
    fn with_images(images: usize) -> Arc<Self> {
        Arc::new(Self {
            images: Ok(images),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            images: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render_pages(
        &self,
        _document: &[u8],
        _name: &str,
    ) -> Result<Vec<ImageData>, StatementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.images {
            Ok(count) => Ok((0..*count)
                .map(|i| ImageData::new(format!("cGFnZS{i}"), "image/png"))
                .collect()),
            Err(detail) => Err(StatementError::RasterisationFailed {
                page: 2,
                detail: detail.clone(),
            }),
        }
    }
}

/// Replies are handed out in call order; `[]` once they run out.
struct MockModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockModel {
    fn replying(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ExtractionModel for MockModel {
    async fn complete(
        &self,
        prompt: &str,
        _image: &ImageData,
        _settings: &CompletionSettings,
    ) -> Result<ModelReply, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()));
        next.map(|content| ModelReply {
            content,
            prompt_tokens: 100,
            completion_tokens: 20,
        })
        .map_err(ModelError::Service)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .rate_limit_delay_ms(0)
        .build()
        .unwrap()
}

fn columns() -> ColumnSchema {
    ColumnSchema::new(["Date", "Amount"]).unwrap()
}

fn processor(
    config: ExtractionConfig,
    ocr: &Arc<MockOcr>,
    renderer: &Arc<MockRenderer>,
    model: &Arc<MockModel>,
) -> StatementProcessor {
    StatementProcessor::new(config, ocr.clone(), renderer.clone(), model.clone())
}

fn values(result: &edgequake_statement::ProcessingResult) -> Vec<Value> {
    result.records.iter().cloned().map(Value::from).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_page_statement_keeps_page_order() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![
        Ok(r#"[{"Date":"1/1","Amount":"10"}]"#),
        Ok(r#"[{"Date":"2/1","Amount":"20"}]"#),
    ]);

    let result = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(
        values(&result),
        vec![
            json!({"Date": "1/1", "Amount": "10"}),
            json!({"Date": "2/1", "Amount": "20"}),
        ]
    );
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.stats.extracted_pages, 2);
    assert_eq!(result.stats.total_input_tokens, 200);

    // One logical table spanning both pages.
    assert_eq!(result.merged_tables.len(), 1);
    let merged = &result.merged_tables[0];
    assert_eq!((merged.first_page, merged.last_page, merged.rows), (1, 2, 2));

    // Continuation page markup carries only its own rows.
    assert!(model.prompt(0).contains("<td>01/01</td>"));
    assert!(model.prompt(1).contains("<td>02/01</td>"));
    assert!(!model.prompt(1).contains("01/01"));
}

#[tokio::test]
async fn ocr_failure_aborts_before_any_model_call() {
    let ocr = MockOcr::failing("503 service unavailable");
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![]);

    let err = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap_err();

    assert!(matches!(err, StatementError::OcrFailed { .. }));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn render_failure_aborts_without_partial_results() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::failing("bitmap allocation failed");
    let model = MockModel::replying(vec![Ok(r#"[{"Date":"1/1"}]"#)]);

    let err = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap_err();

    assert!(matches!(err, StatementError::RasterisationFailed { page: 2, .. }));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn page_without_tables_is_never_sent_to_the_model() {
    let ocr = MockOcr::pages(&[PAGE_1, NO_TABLE, PAGE_2]);
    let renderer = MockRenderer::with_images(3);
    let model = MockModel::replying(vec![
        Ok(r#"[{"Date":"1/1"}]"#),
        Ok(r#"[{"Date":"2/1"}]"#),
    ]);

    let result = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.records.len(), 2);
    assert_eq!(
        result.pages[1].outcome,
        PageOutcome::Skipped {
            reason: SkipReason::NoTableMarkup
        }
    );
    assert_eq!(result.stats.skipped_pages, 1);
    // The blank page does not split the running table.
    assert_eq!(result.merged_tables.len(), 1);
}

#[test]
fn invalid_column_lists_rejected_before_ocr() {
    assert!(serde_json::from_value::<ColumnSchema>(json!({"names": []})).is_err());
    assert!(serde_json::from_value::<ColumnSchema>(json!({"names": ["Date", "Date"]})).is_err());
    assert!(ColumnSchema::from_json(r#"{"Date": 1}"#).is_err());
    assert!(matches!(
        ColumnSchema::from_json(r#"["Date", "Amount", "Date"]"#),
        Err(StatementError::InvalidColumns { .. })
    ));
}

#[tokio::test]
async fn non_pdf_bytes_rejected_before_ocr() {
    let ocr = MockOcr::pages(&[PAGE_1]);
    let renderer = MockRenderer::with_images(1);
    let model = MockModel::replying(vec![]);

    let err = processor(config(), &ocr, &renderer, &model)
        .process(b"PK\x03\x04zip", "may.zip", &columns())
        .await
        .unwrap_err();

    assert!(matches!(err, StatementError::NotAPdf { .. }));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_reply_degrades_only_that_page() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![
        Ok("Sorry, I cannot read this page."),
        Ok(r#"{"transactions": [{"Date":"2/1","Amount":20}]}"#),
    ]);

    let result = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(values(&result), vec![json!({"Date": "2/1", "Amount": 20})]);
    assert!(matches!(
        result.pages[0].outcome,
        PageOutcome::Degraded {
            reason: DegradeReason::InvalidJson { .. }
        }
    ));
    assert_eq!(result.pages[1].outcome, PageOutcome::Extracted { records: 1 });
    assert_eq!(result.stats.degraded_pages, 1);
}

#[tokio::test]
async fn pairing_stops_at_the_shorter_sequence() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::with_images(1);
    let model = MockModel::replying(vec![Ok(r#"[{"Date":"1/1"}]"#)]);

    let result = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        result.pages[1].outcome,
        PageOutcome::Skipped {
            reason: SkipReason::NoImage
        }
    );
}

#[tokio::test]
async fn model_service_error_is_fatal() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![Err("401 invalid api key")]);

    let err = processor(config(), &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap_err();

    assert!(matches!(err, StatementError::ExtractionFailed { page: 1, .. }));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delay_separates_consecutive_model_calls() {
    let ocr = MockOcr::pages(&[PAGE_1, PAGE_2]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![]);
    let config = ExtractionConfig::builder()
        .rate_limit_delay_ms(40)
        .build()
        .unwrap();

    let start = Instant::now();
    processor(config, &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_delay_after_the_last_model_call() {
    let ocr = MockOcr::pages(&[PAGE_1, NO_TABLE]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![]);
    let config = ExtractionConfig::builder()
        .rate_limit_delay_ms(5_000)
        .build()
        .unwrap();

    let start = Instant::now();
    processor(config, &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ExtractionProgressCallback for Events {
    fn on_start(&self, total_pages: usize) {
        self.0.lock().unwrap().push(format!("start {total_pages}"));
    }
    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.0.lock().unwrap().push(format!("page {page_num}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, records: usize) {
        self.0.lock().unwrap().push(format!("done {page_num} {records}"));
    }
    fn on_page_skipped(&self, page_num: usize, _total: usize) {
        self.0.lock().unwrap().push(format!("skip {page_num}"));
    }
    fn on_complete(&self, total_records: usize) {
        self.0.lock().unwrap().push(format!("complete {total_records}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let ocr = MockOcr::pages(&[PAGE_1, NO_TABLE]);
    let renderer = MockRenderer::with_images(2);
    let model = MockModel::replying(vec![Ok(r#"[{"Date":"1/1"},{"Date":"1/2"}]"#)]);
    let events = Arc::new(Events::default());
    let config = ExtractionConfig::builder()
        .rate_limit_delay_ms(0)
        .progress_callback(events.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();

    processor(config, &ocr, &renderer, &model)
        .process(PDF, "may.pdf", &columns())
        .await
        .unwrap();

    assert_eq!(
        *events.0.lock().unwrap(),
        vec!["start 2", "page 1", "done 1 2", "skip 2", "complete 2"]
    );
}

#[test]
fn process_sync_reads_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statement.pdf");
    std::fs::write(&path, PDF).unwrap();

    let ocr = MockOcr::pages(&[PAGE_2]);
    let renderer = MockRenderer::with_images(1);
    let model = MockModel::replying(vec![Ok(r#"[{"Date":"2/1","Amount":20}]"#)]);

    let result = processor(config(), &ocr, &renderer, &model)
        .process_sync(path.to_str().unwrap(), &columns())
        .unwrap();

    assert_eq!(result.to_csv().unwrap(), "Date,Amount\n2/1,20\n");
    assert_eq!(result.with_sequential_ids()["transactions"][0]["id"], json!(1));
}
