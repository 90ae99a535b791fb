use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use copilot_core::{Error, Relay, RelayErrorBody, RelayReply, RelayRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Client of a relay endpoint that accepts `{messages}` and answers
/// `{reply}` or `{error}`.
pub struct HttpRelay {
    client: Client,
    url: String,
}

impl HttpRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: url.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn parse_response(&self, body: &str) -> Result<RelayReply, Error> {
        #[derive(Deserialize)]
        struct ReplyBody {
            reply: Option<String>,
        }

        let parsed: ReplyBody = serde_json::from_str(body)
            .map_err(|e| Error::malformed_response(format!("Invalid relay response: {}", e)))?;
        Ok(RelayReply::new(parsed.reply.unwrap_or_default()))
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        match serde_json::from_str::<RelayErrorBody>(body) {
            Ok(err) if !err.message().is_empty() => Error::upstream(err.message()),
            _ => Error::upstream(format!("API Error: {}", status)),
        }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: RelayRequest) -> Result<RelayReply, Error> {
        request.validate()?;
        debug!(url = %self.url, messages = request.messages.len(), "Relay request");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
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
