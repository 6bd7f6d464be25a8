//! Inference Client: the generative-model boundary of the orchestration loop.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming completions with a tool catalog attached
//! - Anthropic Messages and OpenAI Chat Completions wire formats
//! - Normalizing responses to ordered text / tool-use blocks
//!
//! The orchestrator only sees the `LanguageModel` trait, so the provider is
//! a config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use client::{LanguageModel, ModelClient};
pub use config::{ModelConfig, ModelProvider};
pub use errors::InferenceError;
pub use types::{ContentBlock, ModelMessage, ModelRequest, ModelResponse, Role, ToolSchema};
