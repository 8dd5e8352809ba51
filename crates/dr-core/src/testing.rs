//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Error;
use crate::message::{Message, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::schema::ObjectSchema;
use crate::structured::{GenerationRequest, StructuredGenerator};

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
    pub default_model: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
            default_model: None,
        }
    }

    /// Queue a response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        let response = CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        };
        self.responses.lock().unwrap().insert(0, Ok(response));
    }

    /// Queue an error for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => response,
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A recorded call to [`MockGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratedCall {
    pub schema: String,
    pub system: String,
    pub prompt: String,
}

type Handler = Box<dyn Fn(&str, &GenerationRequest) -> Result<Value, Error> + Send + Sync>;

/// A structured generator that answers through a closure.
///
/// The closure receives the schema name and the request, so one mock can serve
/// every kind of call a component makes, in whatever order concurrent callers
/// reach it.
pub struct MockGenerator {
    handler: Handler,
    delay: Option<Duration>,
    /// Captured calls (for assertion).
    pub calls: Mutex<Vec<GeneratedCall>>,
}

impl MockGenerator {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &GenerationRequest) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls made with the given schema name, in arrival order.
    pub fn calls_for(&self, schema: &str) -> Vec<GeneratedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.schema == schema)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StructuredGenerator for MockGenerator {
    async fn generate_value(
        &self,
        request: &GenerationRequest,
        name: &str,
        _schema: &ObjectSchema,
    ) -> Result<Value, Error> {
        self.calls.lock().unwrap().push(GeneratedCall {
            schema: name.to_string(),
            system: request.system.clone(),
            prompt: request.prompt.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(name, request)
    }
}
