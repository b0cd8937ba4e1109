//! HTTP client for an OpenAI-compatible chat completions endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::ModelConfig;

use super::ModelGateway;
use super::error::GatewayError;
use super::types::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse, ToolSchema};

/// Model gateway client.
///
/// Sends the whole conversation and tool list on every call and returns the
/// first choice's message. Cheap to clone.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<GatewayClientInner>,
}

struct GatewayClientInner {
    client: reqwest::Client,
    config: ModelConfig,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the API key is not a valid header
    /// value or the HTTP client cannot be built.
    pub fn new(config: ModelConfig) -> Result<Self, GatewayError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
            .map_err(|_| GatewayError::Config("API key contains invalid header characters".to_string()))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(GatewayClientInner { client, config }),
        })
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.inner.config.model_id
    }

    /// Send one completion request.
    async fn send_once(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatMessage, GatewayError> {
        let config = &self.inner.config;
        let request = ChatRequest {
            model: &config.model_id,
            messages,
            temperature: config.sampling.temperature,
            max_tokens: config.sampling.max_tokens,
            top_p: config.sampling.top_p,
            tools,
            tool_choice: "auto",
            stream: false,
            extra: config.extra_body.as_ref(),
        };

        let response = self
            .inner
            .client
            .post(config.invoke_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        handle_response(response).await
    }
}

#[async_trait]
impl ModelGateway for GatewayClient {
    #[instrument(skip(self, messages, tools), fields(model = %self.inner.config.model_id, messages = messages.len()))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatMessage, GatewayError> {
        let mut attempt = 0_u8;
        loop {
            match self.send_once(messages, tools).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_transient() && attempt < self.inner.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "Model request failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Http(e)
    }
}

/// Decode a successful body or map an error status.
async fn handle_response(response: reqwest::Response) -> Result<ChatMessage, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(handle_error_status(status, response).await);
    }

    let body = response.text().await.map_err(map_transport_error)?;
    parse_completion(&body)
}

fn parse_completion(body: &str) -> Result<ChatMessage, GatewayError> {
    serde_json::from_str::<ChatResponse>(body)
        .map_err(|e| GatewayError::Parse(format!("Failed to parse response: {e}")))?
        .into_message()
        .ok_or_else(|| GatewayError::Parse("response contained no choices".to_string()))
}

/// Handle an error status code.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> GatewayError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return GatewayError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return GatewayError::Unauthorized("Invalid API key".to_string());
    }

    match response.text().await {
        Ok(body) => api_error(status.as_u16(), body),
        Err(e) => map_transport_error(e),
    }
}

fn api_error(status: u16, body: String) -> GatewayError {
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    GatewayError::Api { status, message }
}
