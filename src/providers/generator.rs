//! Text generation.
//!
//! The generator seam accepts a structured prompt and either returns free
//! text or a record validated against a declared [`OutputSchema`]. Schema
//! validation happens at this boundary with a single-retry policy: one
//! corrective reminder is appended to the prompt before the call fails.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProviderError, Result};

/// A structured prompt: fixed system instructions plus the user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions defining the step's behavior.
    pub system: String,
    /// The user-turn content (query, evidence, feedback).
    pub user: String,
}

impl Prompt {
    /// Builds a prompt from system and user parts.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Appends a corrective schema reminder after a validation failure.
    #[must_use]
    pub fn with_reminder(&self, schema: &OutputSchema, reason: &str) -> Self {
        let reminder = format!(
            "\n\nREMINDER: your previous answer was rejected ({reason}). \
             Respond with ONLY a JSON object matching the '{}' schema: {}.",
            schema.name,
            schema.describe()
        );
        Self {
            system: self.system.clone(),
            user: format!("{}{reminder}", self.user),
        }
    }
}

/// Kind of a declared output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array (element shape is validated downstream by serde).
    Array,
    /// JSON object.
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared field of an output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Expected JSON kind.
    pub kind: FieldKind,
    /// Whether the field must be present.
    pub required: bool,
}

/// A declared output schema for structured generation.
///
/// Validation is shallow by design: field presence and JSON kind are
/// checked here, element shapes are checked by serde when steps
/// deserialize the record into domain types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// Schema name, used in error messages and reminders.
    pub name: &'static str,
    /// Declared fields.
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    /// Creates a schema with no fields.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Declares a required field. Builder-style.
    #[must_use]
    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    /// Declares an optional field. Builder-style.
    #[must_use]
    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    /// Validates a parsed value against the schema.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason on mismatch.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        let Some(object) = value.as_object() else {
            return Err("expected a JSON object".to_string());
        };
        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
                Some(present) => {
                    if !field.kind.matches(present) {
                        return Err(format!(
                            "field '{}' must be a {}",
                            field.name,
                            field.kind.label()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// One-line field listing for prompt reminders.
    #[must_use]
    pub fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let req = if f.required { "" } else { "?" };
                format!("{}{req}: {}", f.name, f.kind.label())
            })
            .collect();
        format!("{{{}}}", fields.join(", "))
    }
}

/// Extracts the first JSON object or array from generator output,
/// tolerating markdown code fences and prose preambles.
fn extract_json(text: &str) -> std::result::Result<Value, String> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed
        .find(['{', '['])
        .ok_or_else(|| "no JSON found in response".to_string())?;
    let open = trimmed.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let end = trimmed
        .bytes()
        .rposition(|b| b == close)
        .ok_or_else(|| "unterminated JSON in response".to_string())?;
    if end <= start {
        return Err("unterminated JSON in response".to_string());
    }
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| format!("invalid JSON: {e}"))
}

fn parse_and_validate(text: &str, schema: &OutputSchema) -> std::result::Result<Value, String> {
    let value = extract_json(text)?;
    schema.validate(&value)?;
    Ok(value)
}

/// Trait for text generators.
///
/// Implementations wrap a language model. `generate_structured` carries
/// the boundary validation and single-retry policy, so implementations
/// only provide raw generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates free text for a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails after the provider's own
    /// retry policy.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Generates a record matching `schema`.
    ///
    /// On a validation failure the call is retried once with a reminder
    /// appended to the prompt; a second failure raises
    /// [`ProviderError::SchemaValidation`].
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails or both attempts produce
    /// schema-invalid output.
    async fn generate_structured(&self, prompt: &Prompt, schema: &OutputSchema) -> Result<Value> {
        let first = self.generate(prompt).await?;
        let reason = match parse_and_validate(&first, schema) {
            Ok(value) => return Ok(value),
            Err(reason) => reason,
        };

        tracing::warn!(schema = schema.name, %reason, "structured output rejected, retrying");
        let second = self.generate(&prompt.with_reminder(schema, &reason)).await?;
        parse_and_validate(&second, schema).map_err(|reason| {
            ProviderError::SchemaValidation {
                schema: schema.name.to_string(),
                reason,
            }
            .into()
        })
    }
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
///
/// Serves both the hosted primary provider and local endpoints (the base
/// URL is the only difference). Transport failures are retried once with
/// exponential backoff before surfacing.
pub struct ApiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ApiGenerator {
    /// Creates a generator against the given endpoint.
    #[must_use]
    pub fn new(api_key: Option<&str>, base_url: Option<&str>, model: &str) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.system.clone())
                    .build()
                    .map_err(|e| ProviderError::Generator(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.user.clone())
                    .build()
                    .map_err(|e| ProviderError::Generator(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| ProviderError::Generator(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ProviderError::Generator(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Generator("empty completion".to_string()).into())
    }
}

#[async_trait]
impl TextGenerator for ApiGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        match self.complete(prompt).await {
            Ok(text) => Ok(text),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "generator call failed, retrying once");
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.complete(prompt).await
            }
        }
    }
}

/// Deterministic generator driven by a queue of canned responses.
///
/// Used by tests and offline demos: each `generate` call pops the next
/// scripted response and records the prompt it answered.
#[doc(hidden)]
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    /// Creates a generator with a fixed response script.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Appends a response to the script.
    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response.into());
        }
    }

    /// Prompts answered so far, in call order.
    #[must_use]
    pub fn seen_prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of unconsumed scripted responses.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        response.ok_or_else(|| {
            ProviderError::Generator("scripted generator exhausted".to_string()).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict_schema() -> OutputSchema {
        OutputSchema::new("evaluation_verdict")
            .required("sufficient", FieldKind::Boolean)
            .required("reason", FieldKind::String)
            .optional("recommended_follow_ups", FieldKind::Array)
    }

    #[test]
    fn test_extract_json_plain() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_extract_json_array() {
        let value = extract_json("prefix [1, 2, 3] suffix").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn test_schema_validation() {
        let schema = verdict_schema();
        assert!(
            schema
                .validate(&json!({"sufficient": true, "reason": "ok"}))
                .is_ok()
        );
        assert!(schema.validate(&json!({"sufficient": true})).is_err());
        assert!(
            schema
                .validate(&json!({"sufficient": "yes", "reason": "ok"}))
                .is_err()
        );
        assert!(schema.validate(&json!([1])).is_err());
    }

    #[test]
    fn test_schema_optional_null_ok() {
        let schema = verdict_schema();
        let value = json!({"sufficient": false, "reason": "thin", "recommended_follow_ups": null});
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_schema_describe() {
        let schema = verdict_schema();
        let described = schema.describe();
        assert!(described.contains("sufficient: boolean"));
        assert!(described.contains("recommended_follow_ups?: array"));
    }

    #[tokio::test]
    async fn test_structured_first_try() {
        let generator =
            ScriptedGenerator::new(vec![r#"{"sufficient": true, "reason": "ok"}"#.to_string()]);
        let value = generator
            .generate_structured(&Prompt::new("sys", "user"), &verdict_schema())
            .await
            .unwrap();
        assert_eq!(value["sufficient"], json!(true));
        assert_eq!(generator.remaining(), 0);
    }

    #[tokio::test]
    async fn test_structured_retry_with_reminder() {
        let generator = ScriptedGenerator::new(vec![
            "not json at all".to_string(),
            r#"{"sufficient": false, "reason": "thin"}"#.to_string(),
        ]);
        let value = generator
            .generate_structured(&Prompt::new("sys", "user"), &verdict_schema())
            .await
            .unwrap();
        assert_eq!(value["reason"], json!("thin"));

        let prompts = generator.seen_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].user.contains("REMINDER"));
        assert!(prompts[1].user.contains("evaluation_verdict"));
    }

    #[tokio::test]
    async fn test_structured_fails_after_second_invalid() {
        let generator = ScriptedGenerator::new(vec![
            "garbage".to_string(),
            r#"{"wrong": 1}"#.to_string(),
        ]);
        let err = generator
            .generate_structured(&Prompt::new("sys", "user"), &verdict_schema())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[tokio::test]
    async fn test_scripted_exhaustion() {
        let generator = ScriptedGenerator::new(vec![]);
        let err = generator
            .generate(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }
}
