//! dr-core: Core types and traits for deep-research
//!
//! This crate provides the foundational types shared by the research engine,
//! the model providers and the content sources: the error taxonomy, the chat
//! `Provider` trait and the typed structured-generation boundary.

pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod structured;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use message::{Message, Role, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use schema::{ObjectSchema, PropertySchema, Schema};
pub use structured::{parse_json_payload, GenerationRequest, ProviderGenerator, StructuredGenerator};

pub type Result<T> = std::result::Result<T, Error>;
