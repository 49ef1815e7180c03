//! Schema mapping: table markup + page image → validated transaction records.
//!
//! The model is asked for a bare JSON list, but what comes back is treated as
//! untrusted text. [`parse_model_response`] turns it into a tagged
//! [`ModelResponse`]: either records that only use schema columns, or a
//! [`DegradeReason`] explaining why the page yields nothing. A bad reply never
//! becomes an `Err`; only a failed service call does.

use crate::config::ExtractionConfig;
use crate::error::{DegradeReason, ModelError, StatementError};
use crate::output::TransactionRecord;
use crate::prompts::extraction_prompt;
use crate::schema::ColumnSchema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ── Model seam ───────────────────────────────────────────────────────────────

/// Decoding settings for one extraction call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the provider for a JSON-typed response.
    pub json_response: bool,
}

impl CompletionSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_response: true,
        }
    }
}

/// Raw reply from the extraction model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A vision model that answers a prompt about one page image.
///
/// Errors are service-level failures (network, auth, quota) and are fatal for
/// the request. Malformed content is not an error at this layer.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        image: &ImageData,
        settings: &CompletionSettings,
    ) -> Result<ModelReply, ModelError>;
}

/// [`ExtractionModel`] backed by an edgequake-llm provider.
pub struct LlmExtractionModel {
    provider: Arc<dyn LLMProvider>,
}

impl LlmExtractionModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

fn build_options(settings: &CompletionSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        response_format: settings
            .json_response
            .then(|| "json_object".to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ExtractionModel for LlmExtractionModel {
    async fn complete(
        &self,
        prompt: &str,
        image: &ImageData,
        settings: &CompletionSettings,
    ) -> Result<ModelReply, ModelError> {
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image.clone()])];
        let options = build_options(settings);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(ModelError::provider)?;

        Ok(ModelReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// The model's reply after shape validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Records(Vec<TransactionRecord>),
    Degraded(DegradeReason),
}

impl ModelResponse {
    /// Records for this page; empty when degraded.
    pub fn into_records(self) -> Vec<TransactionRecord> {
        match self {
            ModelResponse::Records(r) => r,
            ModelResponse::Degraded(_) => Vec::new(),
        }
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap());

/// Take the body of the first code fence in the reply, if there is one.
///
/// The fence may sit on a single line or follow a sentence of chatter.
fn strip_code_fence(raw: &str) -> &str {
    match RE_JSON_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parse and validate a raw model reply against the column schema.
///
/// - a JSON list is taken as the record list
/// - a JSON object yields its first list-valued field (`NoListInObject` otherwise)
/// - invalid JSON or any other value degrades
///
/// List elements that are not objects are dropped. Keys outside the schema
/// are dropped, fields are reordered to schema order, and records left
/// without any schema field are dropped.
pub fn parse_model_response(raw: &str, schema: &ColumnSchema) -> ModelResponse {
    let body = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return ModelResponse::Degraded(DegradeReason::InvalidJson {
                detail: e.to_string(),
            })
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            match map.into_iter().find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            }) {
                Some(items) => items,
                None => return ModelResponse::Degraded(DegradeReason::NoListInObject),
            }
        }
        other => {
            return ModelResponse::Degraded(DegradeReason::UnexpectedShape {
                found: json_kind(&other).to_string(),
            })
        }
    };

    let total = items.len();
    let records: Vec<TransactionRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => to_record(fields, schema),
            other => {
                debug!("Dropping non-object list element ({})", json_kind(&other));
                None
            }
        })
        .collect();

    if records.len() != total {
        debug!("Kept {} of {} model list elements", records.len(), total);
    }
    ModelResponse::Records(records)
}

fn to_record(mut fields: Map<String, Value>, schema: &ColumnSchema) -> Option<TransactionRecord> {
    let mut out = Map::new();
    for column in schema.names() {
        if let Some(value) = fields.remove(column) {
            out.insert(column.clone(), to_scalar(value));
        }
    }
    (!out.is_empty()).then(|| TransactionRecord::from_fields(out))
}

fn to_scalar(value: Value) -> Value {
    match value {
        Value::Null | Value::String(_) | Value::Number(_) => value,
        Value::Bool(b) => Value::String(b.to_string()),
        nested => Value::String(nested.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Per-page extraction ──────────────────────────────────────────────────────

/// Result of one page's extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub response: ModelResponse,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Run the schema-mapping step for one page.
///
/// Only a failed model call is returned as `Err` (as
/// [`StatementError::ExtractionFailed`]); malformed replies come back as
/// [`ModelResponse::Degraded`].
pub async fn extract_records(
    model: &dyn ExtractionModel,
    page_num: usize,
    table_markup: &str,
    image: &ImageData,
    schema: &ColumnSchema,
    settings: &CompletionSettings,
) -> Result<PageExtraction, StatementError> {
    let start = Instant::now();
    let prompt = extraction_prompt(schema, table_markup);

    let reply = model
        .complete(&prompt, image, settings)
        .await
        .map_err(|source| StatementError::ExtractionFailed {
            page: page_num,
            source,
        })?;

    let response = parse_model_response(&reply.content, schema);
    match &response {
        ModelResponse::Records(records) => debug!(
            "Page {}: {} records ({} in / {} out tokens)",
            page_num,
            records.len(),
            reply.prompt_tokens,
            reply.completion_tokens
        ),
        ModelResponse::Degraded(reason) => {
            warn!("Page {}: model reply unusable, {}", page_num, reason)
        }
    }

    Ok(PageExtraction {
        response,
        input_tokens: reply.prompt_tokens,
        output_tokens: reply.completion_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ColumnSchema {
        ColumnSchema::new(["Date", "Narration", "Amount"]).unwrap()
    }

    fn records(resp: ModelResponse) -> Vec<Value> {
        match resp {
            ModelResponse::Records(r) => r.into_iter().map(Value::from).collect(),
            ModelResponse::Degraded(reason) => panic!("unexpected degrade: {reason}"),
        }
    }

    #[test]
    fn empty_list_is_empty() {
        assert!(records(parse_model_response("[]", &schema())).is_empty());
    }

    #[test]
    fn object_wrapping_list_is_unwrapped() {
        let out = records(parse_model_response(
            r#"{"transactions": [{"Date":"1/1"}]}"#,
            &schema(),
        ));
        assert_eq!(out, vec![json!({"Date": "1/1"})]);
    }

    #[test]
    fn invalid_json_degrades() {
        let resp = parse_model_response("not json", &schema());
        assert!(matches!(
            resp,
            ModelResponse::Degraded(DegradeReason::InvalidJson { .. })
        ));
        assert!(resp.into_records().is_empty());
    }

    #[test]
    fn object_without_list_degrades() {
        assert_eq!(
            parse_model_response(r#"{"count": 0}"#, &schema()),
            ModelResponse::Degraded(DegradeReason::NoListInObject)
        );
    }

    #[test]
    fn scalar_degrades() {
        assert_eq!(
            parse_model_response("42", &schema()),
            ModelResponse::Degraded(DegradeReason::UnexpectedShape {
                found: "number".to_string()
            })
        );
    }

    #[test]
    fn fenced_reply_is_parsed() {
        let raw = "```json\n[{\"Date\": \"3/1\", \"Amount\": 12.5}]\n```";
        let out = records(parse_model_response(raw, &schema()));
        assert_eq!(out, vec![json!({"Date": "3/1", "Amount": 12.5})]);
    }

    #[test]
    fn single_line_fence_is_parsed() {
        let raw = r#"```json [{"Date":"1/1"}]```"#;
        let out = records(parse_model_response(raw, &schema()));
        assert_eq!(out, vec![json!({"Date": "1/1"})]);
    }

    #[test]
    fn fence_after_leading_sentence_is_parsed() {
        let raw = "Here are the transactions:\n```json\n[{\"Date\": \"2/1\"}]\n```\nLet me know.";
        let out = records(parse_model_response(raw, &schema()));
        assert_eq!(out, vec![json!({"Date": "2/1"})]);
    }

    #[test]
    fn records_keep_schema_keys_in_schema_order() {
        let raw = r#"[{"Amount": 5, "Extra": "x", "Date": "1/1", "Narration": true}]"#;
        let out = records(parse_model_response(raw, &schema()));
        let keys: Vec<&String> = out[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["Date", "Narration", "Amount"]);
        assert_eq!(out[0]["Narration"], json!("true"));
    }

    #[test]
    fn non_objects_and_empty_records_dropped() {
        let raw = r#"[1, "x", {"Other": 1}, {"Date": "1/1", "Amount": null}]"#;
        let out = records(parse_model_response(raw, &schema()));
        assert_eq!(out, vec![json!({"Date": "1/1", "Amount": null})]);
    }

    #[test]
    fn options_request_json() {
        let settings = CompletionSettings {
            temperature: 0.0,
            max_tokens: 1024,
            json_response: true,
        };
        let opts = build_options(&settings);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1024));
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
    }

    struct CannedModel(Result<&'static str, &'static str>);

    #[async_trait]
    impl ExtractionModel for CannedModel {
        async fn complete(
            &self,
            _prompt: &str,
            _image: &ImageData,
            _settings: &CompletionSettings,
        ) -> Result<ModelReply, ModelError> {
            self.0
                .map(|content| ModelReply {
                    content: content.to_string(),
                    prompt_tokens: 10,
                    completion_tokens: 5,
                })
                .map_err(|e| ModelError::Service(e.to_string()))
        }
    }

    fn settings() -> CompletionSettings {
        CompletionSettings {
            temperature: 0.0,
            max_tokens: 256,
            json_response: true,
        }
    }

    #[tokio::test]
    async fn extract_records_counts_tokens() {
        let model = CannedModel(Ok(r#"[{"Date":"1/1"}]"#));
        let image = ImageData::new("AAAA".to_string(), "image/png");
        let page = extract_records(&model, 1, "<table></table>", &image, &schema(), &settings())
            .await
            .unwrap();
        assert_eq!(page.input_tokens, 10);
        assert_eq!(page.response.into_records().len(), 1);
    }

    #[tokio::test]
    async fn service_failure_is_fatal() {
        let model = CannedModel(Err("401 unauthorized"));
        let image = ImageData::new("AAAA".to_string(), "image/png");
        let err = extract_records(&model, 3, "<table></table>", &image, &schema(), &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, StatementError::ExtractionFailed { page: 3, .. }));
    }
}
