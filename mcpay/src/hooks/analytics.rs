//! Call analytics.
//!
//! [`AnalyticsHook`] records a snapshot of every call result after the other
//! hooks are done with it, and hands it to an [`AnalyticsSink`] in the
//! background. Passes abandoned for a retry are recorded too, flagged
//! `retried`. Delivery is best effort: sink failures are logged and never
//! affect the call.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
#[cfg(feature = "telemetry")]
use tracing::warn;

use crate::PROOF_META_KEY;
use crate::context::CallContext;
use crate::error::SinkError;
use crate::hook::{
    BoxFuture, CallToolResultAction, GenericResultAction, Hook, HookResult, ResultAction,
};
use crate::proto::payment::{PaymentReceipt, extract_payment_receipt};
use crate::proto::{
    CallToolRequest, CallToolResult, GenericRequest, GenericResult, McpRequest, McpResult,
    MethodFamily, RpcError,
};
use crate::timestamp::UnixTimestamp;

/// Receives analytics events.
pub trait AnalyticsSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: AnalyticsEvent) -> BoxFuture<'_, Result<(), SinkError>>;
}

/// A self-contained record of one settled call (or one pass of it).
///
/// Holds its own copies of the request and result, so later changes to
/// either cannot reach an event that was already emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Inbound request id.
    pub request_id: String,
    /// Upstream endpoint.
    pub target_url: String,
    /// JSON-RPC method name.
    pub method: String,
    /// Method family label.
    pub family: &'static str,
    /// Authenticated user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request params as dispatched.
    pub request: Value,
    /// Result value, or the JSON-RPC error object.
    pub result: Value,
    /// Whether the call ended in an error.
    pub is_error: bool,
    /// Whether the request carried a payment token.
    pub paid: bool,
    /// Settlement receipt returned by the upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PaymentReceipt>,
    /// Whether the result carries a web proof.
    pub proven: bool,
    /// Whether this pass was abandoned for a retry.
    pub retried: bool,
    /// When the call entered the proxy.
    pub started_at: UnixTimestamp,
    /// When this event was recorded.
    pub finished_at: UnixTimestamp,
    /// `finished_at - started_at`, in milliseconds.
    pub duration_ms: u64,
}

impl AnalyticsEvent {
    fn new(ctx: &CallContext, method: &str, family: MethodFamily, request: Value) -> Self {
        let finished_at = UnixTimestamp::now();
        Self {
            request_id: ctx.request_id.clone(),
            target_url: ctx.target_url.to_string(),
            method: method.to_owned(),
            family: family.as_str(),
            user_id: ctx.session.as_ref().map(|s| s.user_id.clone()),
            request,
            result: Value::Null,
            is_error: false,
            paid: false,
            receipt: None,
            proven: false,
            retried: false,
            started_at: ctx.started_at,
            finished_at,
            duration_ms: finished_at.millis_since(ctx.started_at),
        }
    }

    /// Snapshots a tool call.
    #[must_use]
    pub fn tool_call(ctx: &CallContext, request: &CallToolRequest, result: &CallToolResult) -> Self {
        Self {
            result: serde_json::to_value(result).unwrap_or(Value::Null),
            is_error: result.is_error,
            paid: request.payment_token().is_some(),
            receipt: extract_payment_receipt(&result.meta),
            proven: result.meta.contains_key(PROOF_META_KEY),
            ..Self::new(
                ctx,
                "tools/call",
                MethodFamily::CallTool,
                serde_json::to_value(request).unwrap_or(Value::Null),
            )
        }
    }

    /// Snapshots a call of any other family.
    #[must_use]
    pub fn generic(
        ctx: &CallContext,
        family: MethodFamily,
        request: &GenericRequest,
        result: &GenericResult,
    ) -> Self {
        Self {
            result: Value::Object(result.0.clone()),
            ..Self::new(
                ctx,
                &request.method,
                family,
                Value::Object(request.params.clone()),
            )
        }
    }

    /// Snapshots a call that ended in a JSON-RPC error.
    #[must_use]
    pub fn error(ctx: &CallContext, request: &McpRequest, error: &RpcError) -> Self {
        Self {
            result: serde_json::to_value(error).unwrap_or(Value::Null),
            is_error: true,
            paid: request
                .as_call_tool()
                .is_some_and(|call| call.payment_token().is_some()),
            ..Self::new(ctx, request.method(), request.family(), request.params())
        }
    }

    /// Snapshots any request/result pair.
    #[must_use]
    pub fn snapshot(ctx: &CallContext, request: &McpRequest, result: &McpResult) -> Self {
        let base = || Self::new(ctx, request.method(), request.family(), request.params());
        match (request, result) {
            (McpRequest::CallTool(call), McpResult::CallTool(result)) => {
                Self::tool_call(ctx, call, result)
            }
            (_, McpResult::Error(error)) => Self::error(ctx, request, error),
            (_, McpResult::Generic(result)) => Self {
                result: Value::Object(result.0.clone()),
                ..base()
            },
            (_, McpResult::CallTool(result)) => Self {
                result: serde_json::to_value(result).unwrap_or(Value::Null),
                is_error: result.is_error,
                ..base()
            },
        }
    }
}

/// Emits an [`AnalyticsEvent`] for every result it sees.
///
/// Put it first in the hook list so it runs last on the way out.
pub struct AnalyticsHook {
    sink: Arc<dyn AnalyticsSink>,
}

impl fmt::Debug for AnalyticsHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsHook").finish_non_exhaustive()
    }
}

impl AnalyticsHook {
    /// Creates a hook emitting to `sink`.
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }

    /// Hands `event` to the sink without waiting for delivery.
    fn record(&self, event: AnalyticsEvent) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            #[cfg(feature = "telemetry")]
            let request_id = event.request_id.clone();
            if let Err(error) = sink.emit(event).await {
                #[cfg(feature = "telemetry")]
                warn!(%request_id, %error, "analytics sink failed");
                #[cfg(not(feature = "telemetry"))]
                let _ = error;
            }
        });
    }

    fn record_generic(
        &self,
        family: MethodFamily,
        result: GenericResult,
        request: &GenericRequest,
        ctx: &CallContext,
    ) -> BoxFuture<'static, HookResult<GenericResultAction>> {
        self.record(AnalyticsEvent::generic(ctx, family, request, &result));
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }
}

impl Hook for AnalyticsHook {
    fn name(&self) -> &'static str {
        "analytics"
    }

    fn process_call_tool_result<'a>(
        &'a self,
        result: CallToolResult,
        request: &'a CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolResultAction>> {
        Box::pin(async move {
            self.record(AnalyticsEvent::tool_call(ctx, request, &result));
            Ok(ResultAction::Continue(result))
        })
    }

    fn process_initialize_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::Initialize, result, request, ctx)
    }

    fn process_list_tools_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::ListTools, result, request, ctx)
    }

    fn process_list_resources_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::ListResources, result, request, ctx)
    }

    fn process_list_prompts_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::ListPrompts, result, request, ctx)
    }

    fn process_read_resource_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::ReadResource, result, request, ctx)
    }

    fn process_other_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        self.record_generic(MethodFamily::Other, result, request, ctx)
    }

    fn process_error<'a>(
        &'a self,
        error: &'a RpcError,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<()>> {
        Box::pin(async move {
            self.record(AnalyticsEvent::error(ctx, request, error));
            Ok(())
        })
    }

    fn process_retried<'a>(
        &'a self,
        result: &'a McpResult,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<()>> {
        Box::pin(async move {
            let event = AnalyticsEvent {
                retried: true,
                ..AnalyticsEvent::snapshot(ctx, request, result)
            };
            self.record(event);
            Ok(())
        })
    }
}
