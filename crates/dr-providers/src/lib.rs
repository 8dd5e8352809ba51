//! dr-providers: LLM provider implementations for deep-research
//!
//! This crate provides implementations of the Provider trait for chat
//! completion APIs.

pub mod openai;

pub use openai::OpenAIProvider;
