//! Error types for the hook pipeline and its collaborators.
//!
//! None of these errors escape [`Pipeline::handle`](crate::pipeline::Pipeline::handle):
//! upstream failures become a JSON-RPC error result, and every other error is
//! absorbed by the hook that hit it (a hook fault turns that hook into a no-op
//! for the current call).

use crate::proto::MethodFamily;

/// A boxed error from an external collaborator's transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while parsing MCP / JSON-RPC messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtoError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The params of a request were not a JSON object.
    #[error("params for {0} must be an object")]
    InvalidParams(String),

    /// A result did not match the shape of its method family.
    #[error("result for {0} request must be an object")]
    InvalidResult(MethodFamily),

    /// A JSON-RPC message was structurally invalid.
    #[error("invalid JSON-RPC message: {0}")]
    InvalidMessage(&'static str),

    /// An event-stream body carried no JSON-RPC response.
    #[error("event stream contained no JSON-RPC response")]
    EmptyEventStream,
}

/// A fault inside a hook callback.
///
/// The pipeline catches these at its boundary and treats the hook as a no-op
/// for the value it was given.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HookError {
    /// The hook reported a failure.
    #[error("hook failed: {0}")]
    Failed(String),

    /// The hook panicked.
    #[error("hook panicked: {0}")]
    Panicked(String),

    /// JSON error inside the hook.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors dispatching a request to the upstream MCP server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum UpstreamError {
    /// The request could not be delivered or the response not read.
    #[error("upstream transport error: {0}")]
    Transport(#[source] BoxError),

    /// The upstream answered with an unexpected HTTP status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The upstream response was not a valid MCP message.
    #[error("upstream protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

/// Errors obtaining a signed payment authorization.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The signing service declined to sign.
    #[error("signing rejected: {0}")]
    Rejected(String),

    /// The signing service could not be reached.
    #[error("signing transport error: {0}")]
    Transport(#[source] BoxError),
}

/// Errors building a funding (on-ramp) URL.
#[derive(Debug, thiserror::Error)]
#[error("funding URL unavailable: {0}")]
pub struct FundingError(#[source] pub BoxError);

/// Errors generating or validating a web proof.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProofError {
    /// The proof service could not be reached.
    #[error("proof service transport error: {0}")]
    Transport(#[source] BoxError),

    /// A single attempt exceeded its time budget.
    #[error("proof attempt timed out")]
    Timeout,

    /// The envelope failed structural validation.
    #[error("invalid proof envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// The envelope could not be decoded into an HTTP exchange.
    #[error("proof decoding failed: {0}")]
    Decode(String),

    /// The request body exceeds the configured proof payload limit.
    #[error("proof payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Size of the request body.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// JSON error building the proof request.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors delivering an analytics event.
#[derive(Debug, thiserror::Error)]
#[error("analytics sink error: {0}")]
pub struct SinkError(#[source] pub BoxError);
