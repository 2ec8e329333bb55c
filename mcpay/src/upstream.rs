//! Upstream dispatch abstraction.
//!
//! The pipeline sends each request to the upstream MCP server through the
//! [`Upstream`] trait, at most once per pass. Implementations own the
//! transport (HTTP, streamable HTTP, in-process); the pipeline only sees
//! message-level results.

use crate::context::CallContext;
use crate::error::UpstreamError;
use crate::hook::BoxFuture;
use crate::proto::{McpRequest, McpResult};

/// Sends a request to the upstream MCP server.
///
/// An upstream that answers with a JSON-RPC error should return
/// `Ok(McpResult::Error(..))`; `Err` is reserved for failures to get an
/// answer at all.
pub trait Upstream: Send + Sync {
    /// Dispatches `request` to the upstream server.
    fn dispatch<'a>(
        &'a self,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, Result<McpResult, UpstreamError>>;
}
