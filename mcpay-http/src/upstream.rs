//! JSON-RPC dispatch to upstream MCP servers over HTTP.
//!
//! [`HttpUpstream`] posts each request to the call's target URL as a single
//! JSON-RPC message. Streamable MCP servers may answer with a
//! `text/event-stream` body instead of plain JSON; both are accepted.

use mcpay::context::CallContext;
use mcpay::error::UpstreamError;
use mcpay::hook::BoxFuture;
use mcpay::proto::jsonrpc::{JsonRpcRequest, parse_response_body};
use mcpay::proto::{GenericResult, McpRequest, McpResult};
use mcpay::upstream::Upstream;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{JsonClient, record_result_on_span};
use crate::error::ClientError;

const ACCEPT_JSON_OR_STREAM: (&str, &str) = ("accept", "application/json, text/event-stream");

/// Dispatches MCP requests to the target URL carried by each call.
#[derive(Clone, Debug, Default)]
pub struct HttpUpstream {
    client: JsonClient,
}

impl HttpUpstream {
    /// Creates an upstream dispatcher on top of `client`.
    #[must_use]
    pub const fn new(client: JsonClient) -> Self {
        Self { client }
    }

    /// Posts `request` to `ctx.target_url` and parses the JSON-RPC response.
    ///
    /// A `202 Accepted` or empty body (the answer to a notification) yields an
    /// empty generic result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails, the status is not 2xx, or
    /// the body is not a JSON-RPC response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "mcpay.upstream.dispatch",
            skip_all,
            fields(method = request.method(), target = %ctx.target_url),
            err
        )
    )]
    pub async fn dispatch(
        &self,
        request: &McpRequest,
        ctx: &CallContext,
    ) -> Result<McpResult, ClientError> {
        let context = "POST upstream MCP endpoint";
        let message = JsonRpcRequest::from_mcp(Value::String(ctx.request_id.clone()), request);
        let response = self
            .client
            .send_json(&ctx.target_url, context, &message, &[ACCEPT_JSON_OR_STREAM])
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::ResponseBodyRead { context, source: e })?;
        if body.trim().is_empty() {
            return Ok(McpResult::Generic(GenericResult::default()));
        }

        let result = parse_response_body(&body, content_type.as_deref())
            .and_then(|response| response.into_mcp(request.family()))
            .map_err(|source| ClientError::Protocol { context, source });
        record_result_on_span(&result);
        result
    }
}

impl Upstream for HttpUpstream {
    fn dispatch<'a>(
        &'a self,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, Result<McpResult, UpstreamError>> {
        Box::pin(async move { Ok(Self::dispatch(self, request, ctx).await?) })
    }
}
