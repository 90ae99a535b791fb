use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: messages missing")]
    RequestMissingMessages,

    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("Invalid response from upstream: {0}")]
    UpstreamMalformedResponse(String),

    #[error("Upstream request failed: {0}")]
    NetworkOrUpstreamFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn relay_unavailable(message: impl Into<String>) -> Self {
        Self::RelayUnavailable(message.into())
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::UpstreamMalformedResponse(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::NetworkOrUpstreamFailure(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::upstream("connection reset");
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(
            Error::RequestMissingMessages.to_string(),
            "Invalid request: messages missing"
        );
    }
}
