//! Schema-constrained generation on top of a chat `Provider`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::message::Message;
use crate::provider::{CompletionRequest, Provider};
use crate::schema::{ObjectSchema, Schema};

/// One structured generation call: system preamble, prompt and optional deadline.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub timeout: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Returns a JSON object conforming to a schema.
///
/// Implementations only produce the raw value. Typed access, validation and
/// the request deadline are applied by `generate` on `dyn StructuredGenerator`.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_value(
        &self,
        request: &GenerationRequest,
        name: &str,
        schema: &ObjectSchema,
    ) -> Result<Value, Error>;
}

impl dyn StructuredGenerator {
    /// Generate a value and deserialize it into `T`.
    ///
    /// Fails with `Error::Timeout` when the request deadline elapses first.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
        schema: &Schema<T>,
    ) -> Result<T, Error> {
        let call = self.generate_value(request, &schema.name, &schema.object);
        let value = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                Error::timeout(format!(
                    "{} generation exceeded {}s",
                    schema.name,
                    limit.as_secs_f32()
                ))
            })??,
            None => call.await?,
        };

        schema
            .object
            .validate(&value)
            .map_err(|message| Error::schema(&schema.name, message))?;

        serde_json::from_value(value).map_err(|e| Error::schema(&schema.name, e.to_string()))
    }
}

/// Structured generator backed by a chat-completion provider using JSON-schema
/// response formatting.
pub struct ProviderGenerator {
    provider: Arc<dyn Provider>,
    model: Option<String>,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl StructuredGenerator for ProviderGenerator {
    async fn generate_value(
        &self,
        request: &GenerationRequest,
        name: &str,
        schema: &ObjectSchema,
    ) -> Result<Value, Error> {
        let response_format = json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "strict": true,
                "schema": schema,
            }
        });

        let mut completion = CompletionRequest::new(vec![
            Message::system(request.system.as_str()),
            Message::user(request.prompt.as_str()),
        ])
        .with_extra("response_format", response_format);

        if let Some(model) = &self.model {
            completion = completion.with_model(model.as_str());
        }

        debug!(
            schema = name,
            provider = self.provider.name(),
            prompt_chars = request.prompt.len(),
            "Requesting structured output"
        );

        let response = self.provider.complete(completion).await?;
        parse_json_payload(&response.message.content)
    }
}

/// Parse a model reply as JSON, tolerating markdown fences and surrounding prose.
pub fn parse_json_payload(text: &str) -> Result<Value, Error> {
    let trimmed = strip_code_fence(text.trim());

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| Error::serialization(format!("Invalid JSON in model output: {}", e))),
        _ => Err(Error::serialization("Model output contained no JSON object")),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line (e.g. "json")
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertySchema;
    use crate::testing::{MockGenerator, MockProvider};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Answer {
        #[serde(rename = "exactAnswer")]
        exact_answer: String,
    }

    fn answer_schema() -> Schema<Answer> {
        Schema::new(
            "final_answer",
            ObjectSchema::new().add_property(
                "exactAnswer",
                PropertySchema::string("The final answer"),
                true,
            ),
        )
    }

    #[test]
    fn test_parse_json_payload_plain_and_fenced() {
        let value = parse_json_payload(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);

        let value = parse_json_payload("```json\n{\"a\": 2}\n```").unwrap();
        assert_eq!(value["a"], 2);

        let value = parse_json_payload("Here you go: {\"a\": 3} hope it helps").unwrap();
        assert_eq!(value["a"], 3);
    }

    #[test]
    fn test_parse_json_payload_rejects_prose() {
        let err = parse_json_payload("no json here").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_provider_generator_sends_schema_and_parses() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response(r#"{"exactAnswer": "42"}"#);

        let generator: Arc<dyn StructuredGenerator> =
            Arc::new(ProviderGenerator::new(provider.clone()).with_model("test-model"));
        let request = GenerationRequest::new("system text", "what is the answer?");

        let answer = generator.generate(&request, &answer_schema()).await.unwrap();
        assert_eq!(answer.exact_answer, "42");

        let sent = provider.last_request().unwrap();
        assert_eq!(sent.model.as_deref(), Some("test-model"));
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].content, "system text");
        let format = &sent.extra["response_format"];
        assert_eq!(format["json_schema"]["name"], "final_answer");
        assert_eq!(format["json_schema"]["strict"], true);
    }

    #[tokio::test]
    async fn test_provider_error_propagates_without_retry() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::rate_limit("slow down"));

        let generator: Arc<dyn StructuredGenerator> = Arc::new(ProviderGenerator::new(provider.clone()));
        let request = GenerationRequest::new("sys", "prompt");

        let err = generator.generate(&request, &answer_schema()).await.unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_rejects_missing_field() {
        let generator: Arc<dyn StructuredGenerator> =
            Arc::new(MockGenerator::new(|_, _| Ok(json!({"somethingElse": "x"}))));
        let request = GenerationRequest::new("sys", "prompt");

        let err = generator.generate(&request, &answer_schema()).await.unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let generator: Arc<dyn StructuredGenerator> = Arc::new(
            MockGenerator::new(|_, _| Ok(json!({"exactAnswer": "late"})))
                .with_delay(Duration::from_millis(500)),
        );
        let request =
            GenerationRequest::new("sys", "prompt").with_timeout(Duration::from_millis(20));

        let err = generator.generate(&request, &answer_schema()).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
