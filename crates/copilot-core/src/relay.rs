use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::RelayMessage;

/// One request per user turn: the system prompt followed by the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub messages: Vec<RelayMessage>,
}

impl RelayRequest {
    pub fn new(messages: Vec<RelayMessage>) -> Self {
        Self { messages }
    }

    /// Reject a request with no messages before anything goes on the wire.
    pub fn validate(&self) -> Result<(), Error> {
        if self.messages.is_empty() {
            return Err(Error::RequestMissingMessages);
        }
        Ok(())
    }
}

/// Successful relay response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReply {
    pub reply: String,
}

impl RelayReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

/// Failure payload: `{"error": "..."}` or `{"error": {"message": "..."}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayErrorBody {
    pub error: RelayErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelayErrorDetail {
    Message(String),
    Detailed { message: String },
}

impl RelayErrorBody {
    pub fn message(&self) -> &str {
        match &self.error {
            RelayErrorDetail::Message(message) => message,
            RelayErrorDetail::Detailed { message } => message,
        }
    }
}

/// Forwards a conversation to the model and returns one complete reply.
/// No streaming, no partial results, no retries.
#[async_trait]
pub trait Relay: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: RelayRequest) -> Result<RelayReply, Error>;
}
