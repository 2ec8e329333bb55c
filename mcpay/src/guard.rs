//! Reconciliation logging for paid dispatches that never finish.
//!
//! A request carrying a payment token may settle on-chain as soon as the
//! upstream sees it. If the caller drops the call while that request is in
//! flight, the proxy loses the result of a paid call. [`PaidDispatchGuard`]
//! records such drops so they can be reconciled later.

#[cfg(feature = "telemetry")]
use tracing::warn;

use crate::context::CallContext;
use crate::proto::McpRequest;

/// Request ids of guards that fired, for tests to assert on.
#[cfg(test)]
static FIRED: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

/// Armed around a token-carrying dispatch; logs on drop unless completed.
#[derive(Debug)]
pub(crate) struct PaidDispatchGuard {
    armed: Option<PaidDispatch>,
}

#[derive(Debug)]
#[cfg_attr(not(feature = "telemetry"), allow(dead_code))]
struct PaidDispatch {
    via: &'static str,
    request_id: String,
    tool: String,
    target: String,
}

impl PaidDispatchGuard {
    /// Arms a guard if `request` is a tool call carrying a payment token.
    ///
    /// `via` names the path the request is sent through (`"upstream"` or
    /// `"proof"`).
    pub(crate) fn arm(via: &'static str, request: &McpRequest, ctx: &CallContext) -> Self {
        let armed = request
            .as_call_tool()
            .filter(|call| call.payment_token().is_some())
            .map(|call| PaidDispatch {
                via,
                request_id: ctx.request_id.clone(),
                tool: call.name.clone(),
                target: ctx.target_url.to_string(),
            });
        Self { armed }
    }

    /// Returns `true` if the guarded request carries a payment token.
    pub(crate) const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Marks the dispatch as completed (successfully or not).
    pub(crate) fn complete(mut self) {
        self.armed = None;
    }
}

impl Drop for PaidDispatchGuard {
    fn drop(&mut self) {
        if let Some(dispatch) = self.armed.take() {
            #[cfg(test)]
            if let Ok(mut fired) = FIRED.lock() {
                fired.push(dispatch.request_id.clone());
            }
            #[cfg(feature = "telemetry")]
            warn!(
                via = dispatch.via,
                request_id = %dispatch.request_id,
                tool = %dispatch.tool,
                target = %dispatch.target,
                "paid dispatch dropped before completion; payment may have settled without a delivered result"
            );
            #[cfg(not(feature = "telemetry"))]
            let _ = dispatch;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::hook::BoxFuture;
    use crate::pipeline::Pipeline;
    use crate::proto::{CallToolRequest, CallToolResult, McpResult};
    use crate::upstream::Upstream;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx() -> CallContext {
        CallContext::new("req-1", "https://tools.example/mcp".parse().unwrap())
    }

    fn fired(request_id: &str) -> bool {
        FIRED.lock().unwrap().iter().any(|id| id == request_id)
    }

    /// Accepts the request and never answers.
    struct HangingUpstream;

    impl Upstream for HangingUpstream {
        fn dispatch<'a>(
            &'a self,
            _request: &'a McpRequest,
            _ctx: &'a CallContext,
        ) -> BoxFuture<'a, Result<McpResult, UpstreamError>> {
            Box::pin(std::future::pending())
        }
    }

    struct AnsweringUpstream;

    impl Upstream for AnsweringUpstream {
        fn dispatch<'a>(
            &'a self,
            _request: &'a McpRequest,
            _ctx: &'a CallContext,
        ) -> BoxFuture<'a, Result<McpResult, UpstreamError>> {
            Box::pin(async { Ok(McpResult::CallTool(CallToolResult::text("done"))) })
        }
    }

    fn paid_call() -> McpRequest {
        McpRequest::CallTool(
            CallToolRequest::new("weather", Default::default()).with_payment_token("tok"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_paid_dispatch_fires() {
        let pipeline = Pipeline::builder(Arc::new(HangingUpstream)).build();
        let ctx = CallContext::new("req-dropped", "https://tools.example/mcp".parse().unwrap());

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), pipeline.handle(paid_call(), &ctx)).await;

        assert!(outcome.is_err(), "upstream never answers");
        assert!(fired("req-dropped"));
    }

    #[tokio::test]
    async fn test_completed_paid_dispatch_does_not_fire() {
        let pipeline = Pipeline::builder(Arc::new(AnsweringUpstream)).build();
        let ctx = CallContext::new("req-completed", "https://tools.example/mcp".parse().unwrap());

        let result = pipeline.handle(paid_call(), &ctx).await;

        assert!(result.as_call_tool().is_some());
        assert!(!fired("req-completed"));
    }

    #[test]
    fn test_unarmed_guard_does_not_fire() {
        let unpaid = McpRequest::CallTool(CallToolRequest::new("weather", Default::default()));
        let ctx = CallContext::new("req-unpaid", "https://tools.example/mcp".parse().unwrap());
        drop(PaidDispatchGuard::arm("upstream", &unpaid, &ctx));
        assert!(!fired("req-unpaid"));
    }

    #[test]
    fn test_arms_only_for_token_carrying_tool_calls() {
        let unpaid = McpRequest::CallTool(CallToolRequest::new("weather", Default::default()));
        assert!(!PaidDispatchGuard::arm("upstream", &unpaid, &ctx()).is_armed());

        let paid = McpRequest::CallTool(
            CallToolRequest::new("weather", Default::default()).with_payment_token("tok"),
        );
        let guard = PaidDispatchGuard::arm("upstream", &paid, &ctx());
        assert!(guard.is_armed());
        guard.complete();

        let listing = McpRequest::from_parts("tools/list", None).unwrap();
        assert!(!PaidDispatchGuard::arm("upstream", &listing, &ctx()).is_armed());
    }
}
