//! Errors raised by the HTTP collaborator clients.

use http::StatusCode;
use mcpay::error::{
    FundingError, ProofError, ProtoError, SigningError, SinkError, UpstreamError,
};

/// Errors that can occur while talking to a remote collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body was not a valid MCP message.
    #[error("Invalid MCP response: {context}: {source}")]
    Protocol {
        /// Human-readable context.
        context: &'static str,
        /// The underlying protocol error.
        #[source]
        source: ProtoError,
    },
}

impl ClientError {
    /// Returns `true` if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http { source, .. } | Self::ResponseBodyRead { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<ClientError> for UpstreamError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::HttpStatus { status, body, .. } => Self::Status {
                status: status.as_u16(),
                body,
            },
            ClientError::Protocol { source, .. } => Self::Protocol(source),
            other => Self::Transport(Box::new(other)),
        }
    }
}

impl From<ClientError> for SigningError {
    fn from(error: ClientError) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl From<ClientError> for FundingError {
    fn from(error: ClientError) -> Self {
        Self(Box::new(error))
    }
}

impl From<ClientError> for ProofError {
    fn from(error: ClientError) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(Box::new(error))
        }
    }
}

impl From<ClientError> for SinkError {
    fn from(error: ClientError) -> Self {
        Self(Box::new(error))
    }
}
