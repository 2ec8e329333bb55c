//! Error types for the proxy's HTTP surface.
//!
//! Failures that happen before a message reaches the pipeline are answered
//! with a JSON-RPC error envelope and a matching HTTP status. Everything after
//! that point is a JSON-RPC result produced by the pipeline itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mcpay::error::ProtoError;
use mcpay::proto::RpcError;
use mcpay::proto::jsonrpc::JsonRpcResponse;
use serde_json::Value;

/// Errors that can occur before a call enters the pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// No target is configured under the requested id.
    #[error("unknown target `{0}`")]
    UnknownTarget(String),

    /// The `Authorization` header is malformed or names an unknown key.
    #[error("invalid API key")]
    Unauthorized,

    /// The body is not JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The body is JSON but not a valid MCP message.
    #[error("invalid MCP message: {0}")]
    Protocol(#[from] ProtoError),
}

impl ProxyError {
    /// The JSON-RPC error code reported for this failure.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidBody(_) => RpcError::PARSE_ERROR,
            Self::Protocol(_) | Self::UnknownTarget(_) | Self::Unauthorized => {
                RpcError::INVALID_REQUEST
            }
        }
    }

    /// The HTTP status reported for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownTarget(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidBody(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let error = RpcError::new(self.rpc_code(), self.to_string());
        let body = JsonRpcResponse {
            jsonrpc: mcpay::proto::jsonrpc::JSONRPC_VERSION.to_owned(),
            id: Value::Null,
            result: None,
            error: Some(error),
        };
        (self.status(), axum::Json(body)).into_response()
    }
}
