//! Model client over HTTP.
//!
//! Sends one non-streaming completion per orchestration pass and returns the
//! ordered content blocks. The `LanguageModel` trait is the seam the
//! orchestrator depends on, so tests can substitute a scripted model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{ModelConfig, ModelProvider};
use super::errors::InferenceError;
use super::tool_call_parser::{parse_anthropic_response, parse_openai_response};
use super::types::{
    AnthropicRequest, AnthropicTool, ChatCompletionRequest, ModelRequest, ModelResponse,
    ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `anthropic-version` header value.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

// ─── LanguageModel ───────────────────────────────────────────────────────────

/// Submit a conversation plus tool catalog, receive text and tool requests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError>;

    /// Model identifier for logs.
    fn model_name(&self) -> &str;
}

// ─── ModelClient ─────────────────────────────────────────────────────────────

/// HTTP client for the configured model endpoint.
pub struct ModelClient {
    http: HttpClient,
    config: ModelConfig,
}

impl ModelClient {
    /// Create a client. Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: ModelConfig) -> Result<Self, InferenceError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    // ─── Anthropic ───────────────────────────────────────────────────────

    fn anthropic_body(&self, request: ModelRequest) -> AnthropicRequest {
        let has_tools = !request.tools.is_empty();
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: request.messages,
            tools: has_tools.then(|| request.tools.iter().map(AnthropicTool::from).collect()),
            tool_choice: has_tools.then(|| serde_json::json!({ "type": "auto" })),
        }
    }

    async fn complete_anthropic(
        &self,
        request: ModelRequest,
    ) -> Result<ModelResponse, InferenceError> {
        if self.config.api_key.is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "no API key configured for the anthropic provider (set model.api_key or ANTHROPIC_API_KEY)".into(),
            });
        }

        let url = format!("{}/v1/messages", self.config.endpoint_root());
        let builder = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&self.anthropic_body(request));

        let body = self.send(&url, builder).await?;
        parse_anthropic_response(&body)
    }

    // ─── OpenAI ──────────────────────────────────────────────────────────

    fn openai_body(&self, request: ModelRequest) -> ChatCompletionRequest {
        let has_tools = !request.tools.is_empty();
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: request.messages,
            tools: has_tools.then(|| request.tools.iter().map(ToolDefinition::from).collect()),
            tool_choice: has_tools.then(|| "auto".to_string()),
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }

    async fn complete_openai(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        let url = format!("{}/chat/completions", self.config.endpoint_root());
        let mut builder = self.http.post(&url).json(&self.openai_body(request));
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let body = self.send(&url, builder).await?;
        parse_openai_response(&body)
    }

    // ─── Transport ───────────────────────────────────────────────────────

    /// Send the request and return the body of a 2xx response.
    async fn send(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<String, InferenceError> {
        let response = builder.send().await.map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        response.text().await.map_err(|e| self.map_send_error(url, e))
    }

    fn map_send_error(&self, url: &str, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout {
                duration_secs: self.config.timeout_secs,
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl LanguageModel for ModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        tracing::debug!(
            provider = ?self.config.provider,
            model = %self.config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending model request"
        );
        match self.config.provider {
            ModelProvider::Anthropic => self.complete_anthropic(request).await,
            ModelProvider::Openai => self.complete_openai(request).await,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
