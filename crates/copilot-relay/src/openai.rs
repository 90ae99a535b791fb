use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use copilot_core::{Error, Relay, RelayErrorBody, RelayMessage, RelayReply, RelayRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Forwards the conversation straight to a chat-completions API.
pub struct OpenAIRelay {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIRelay {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request<'a>(&'a self, request: &'a RelayRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    fn parse_response(&self, body: &str) -> Result<RelayReply, Error> {
        let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
            warn!("Unexpected chat-completions response: {}", e);
            Error::malformed_response("Invalid response from OpenAI")
        })?;

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| Error::malformed_response("Invalid response from OpenAI"))?;

        Ok(RelayReply::new(message.content.unwrap_or_default()))
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        match serde_json::from_str::<RelayErrorBody>(body) {
            Ok(err) => Error::upstream(err.message()),
            Err(_) => Error::upstream(format!("API Error: {}", status)),
        }
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[async_trait]
impl Relay for OpenAIRelay {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: RelayRequest) -> Result<RelayReply, Error> {
        request.validate()?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::relay_unavailable("OpenAI API key not configured"))?;

        let api_request = self.build_request(&request);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "OpenAI request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        if !status.is_success() {
            return Err(self.parse_error(status.as_u16(), &body));
        }

        self.parse_response(&body)
    }
}

// Chat-completions wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [RelayMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
