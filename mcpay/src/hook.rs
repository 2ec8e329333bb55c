//! The [`Hook`] trait and its control-flow outcomes.
//!
//! A hook intercepts messages of one or more method families. Every callback
//! has a default implementation that lets the value through unchanged, so a
//! hook only overrides the families and phases it cares about.
//!
//! Request-phase callbacks return a [`RequestAction`]: keep going with a
//! (possibly new) request, or answer the call directly. Result-phase callbacks
//! return a [`ResultAction`]: keep going with a (possibly new) result, stop the
//! reverse pass with a final result, or ask the pipeline to run the whole call
//! again with a new request.
//!
//! Hooks are shared across concurrent calls. Per-call state belongs in the
//! [`CallContext`], never on the hook.

use std::future::Future;
use std::pin::Pin;

use crate::context::CallContext;
use crate::error::HookError;
use crate::proto::{
    CallToolRequest, CallToolResult, GenericRequest, GenericResult, McpRequest, McpResult,
    RpcError,
};

/// A boxed, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of a hook callback.
pub type HookResult<T> = Result<T, HookError>;

/// Outcome of a request-phase callback.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestAction<Q, R> {
    /// Pass this request to the next hook.
    Continue(Q),
    /// Skip the remaining hooks and the upstream dispatch; answer with this result.
    Respond(R),
}

impl<Q, R> RequestAction<Q, R> {
    /// Maps both payloads.
    pub fn map<Q2, R2>(
        self,
        on_continue: impl FnOnce(Q) -> Q2,
        on_respond: impl FnOnce(R) -> R2,
    ) -> RequestAction<Q2, R2> {
        match self {
            Self::Continue(request) => RequestAction::Continue(on_continue(request)),
            Self::Respond(result) => RequestAction::Respond(on_respond(result)),
        }
    }
}

/// Outcome of a result-phase callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultAction<R, Q> {
    /// Pass this result to the next hook in the reverse pass.
    Continue(R),
    /// Stop the reverse pass and return this result to the caller.
    Respond(R),
    /// Abandon this pass and run the call again with this request.
    Retry(Q),
}

impl<R, Q> ResultAction<R, Q> {
    /// Maps both payloads.
    pub fn map<R2, Q2>(
        self,
        on_result: impl FnOnce(R) -> R2,
        on_retry: impl FnOnce(Q) -> Q2,
    ) -> ResultAction<R2, Q2> {
        match self {
            Self::Continue(result) => ResultAction::Continue(on_result(result)),
            Self::Respond(result) => ResultAction::Respond(on_result(result)),
            Self::Retry(request) => ResultAction::Retry(on_retry(request)),
        }
    }
}

/// Request-phase outcome for a tool call.
pub type CallToolRequestAction = RequestAction<CallToolRequest, CallToolResult>;
/// Result-phase outcome for a tool call.
pub type CallToolResultAction = ResultAction<CallToolResult, CallToolRequest>;
/// Request-phase outcome for any other family.
pub type GenericRequestAction = RequestAction<GenericRequest, GenericResult>;
/// Result-phase outcome for any other family.
pub type GenericResultAction = ResultAction<GenericResult, GenericRequest>;

/// A unit of interception in the pipeline.
///
/// # Examples
///
/// ```rust
/// use mcpay::context::CallContext;
/// use mcpay::hook::{BoxFuture, CallToolResultAction, Hook, HookResult, ResultAction};
/// use mcpay::proto::{CallToolRequest, CallToolResult};
///
/// /// Tags every tool result with the proxy's name.
/// struct Stamp;
///
/// impl Hook for Stamp {
///     fn name(&self) -> &'static str {
///         "stamp"
///     }
///
///     fn process_call_tool_result<'a>(
///         &'a self,
///         mut result: CallToolResult,
///         _request: &'a CallToolRequest,
///         _ctx: &'a CallContext,
///     ) -> BoxFuture<'a, HookResult<CallToolResultAction>> {
///         Box::pin(async move {
///             result.meta.insert("via".into(), "mcpay".into());
///             Ok(ResultAction::Continue(result))
///         })
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Hook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Intercepts a `tools/call` request.
    fn process_call_tool_request<'a>(
        &'a self,
        request: CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a `tools/call` result.
    fn process_call_tool_result<'a>(
        &'a self,
        result: CallToolResult,
        request: &'a CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts an `initialize` request.
    fn process_initialize_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts an `initialize` result.
    fn process_initialize_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts a `tools/list` request.
    fn process_list_tools_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a `tools/list` result.
    fn process_list_tools_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts a `resources/list` request.
    fn process_list_resources_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a `resources/list` result.
    fn process_list_resources_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts a `prompts/list` request.
    fn process_list_prompts_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a `prompts/list` result.
    fn process_list_prompts_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts a `resources/read` request.
    fn process_read_resource_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a `resources/read` result.
    fn process_read_resource_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Intercepts a request of any other method.
    fn process_other_request<'a>(
        &'a self,
        request: GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericRequestAction>> {
        Box::pin(async move { Ok(RequestAction::Continue(request)) })
    }

    /// Intercepts a result of any other method.
    fn process_other_result<'a>(
        &'a self,
        result: GenericResult,
        request: &'a GenericRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<GenericResultAction>> {
        Box::pin(async move { Ok(ResultAction::Continue(result)) })
    }

    /// Observes a JSON-RPC error result.
    ///
    /// Called in the reverse pass when the upstream failed, and once per hook
    /// (in reverse order) when the call ends because its retry budget ran out.
    /// Error results cannot be rewritten or retried.
    fn process_error<'a>(
        &'a self,
        error: &'a RpcError,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Observes a pass that was abandoned because a hook closer to the
    /// upstream asked for a retry.
    ///
    /// Only the hooks the abandoned reverse pass never reached are called,
    /// outermost last, with the result as it stood when the retry was
    /// requested.
    fn process_retried<'a>(
        &'a self,
        result: &'a McpResult,
        request: &'a McpRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs the request-phase callback matching the request's family.
pub(crate) async fn on_request(
    hook: &dyn Hook,
    request: McpRequest,
    ctx: &CallContext,
) -> HookResult<RequestAction<McpRequest, McpResult>> {
    let generic = McpResult::Generic;
    Ok(match request {
        McpRequest::CallTool(r) => hook
            .process_call_tool_request(r, ctx)
            .await?
            .map(McpRequest::CallTool, McpResult::CallTool),
        McpRequest::Initialize(r) => hook
            .process_initialize_request(r, ctx)
            .await?
            .map(McpRequest::Initialize, generic),
        McpRequest::ListTools(r) => hook
            .process_list_tools_request(r, ctx)
            .await?
            .map(McpRequest::ListTools, generic),
        McpRequest::ListResources(r) => hook
            .process_list_resources_request(r, ctx)
            .await?
            .map(McpRequest::ListResources, generic),
        McpRequest::ListPrompts(r) => hook
            .process_list_prompts_request(r, ctx)
            .await?
            .map(McpRequest::ListPrompts, generic),
        McpRequest::ReadResource(r) => hook
            .process_read_resource_request(r, ctx)
            .await?
            .map(McpRequest::ReadResource, generic),
        McpRequest::Other(r) => hook
            .process_other_request(r, ctx)
            .await?
            .map(McpRequest::Other, generic),
    })
}

/// Runs the result-phase callback matching the request's family.
///
/// Error results go to [`Hook::process_error`] and pass through unchanged. A
/// result whose shape does not match the request's family also passes through.
pub(crate) async fn on_result(
    hook: &dyn Hook,
    result: McpResult,
    request: &McpRequest,
    ctx: &CallContext,
) -> HookResult<ResultAction<McpResult, McpRequest>> {
    let generic = McpResult::Generic;
    Ok(match (result, request) {
        (McpResult::Error(error), _) => {
            hook.process_error(&error, request, ctx).await?;
            ResultAction::Continue(McpResult::Error(error))
        }
        (McpResult::CallTool(r), McpRequest::CallTool(q)) => hook
            .process_call_tool_result(r, q, ctx)
            .await?
            .map(McpResult::CallTool, McpRequest::CallTool),
        (McpResult::Generic(r), McpRequest::Initialize(q)) => hook
            .process_initialize_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::Initialize),
        (McpResult::Generic(r), McpRequest::ListTools(q)) => hook
            .process_list_tools_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::ListTools),
        (McpResult::Generic(r), McpRequest::ListResources(q)) => hook
            .process_list_resources_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::ListResources),
        (McpResult::Generic(r), McpRequest::ListPrompts(q)) => hook
            .process_list_prompts_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::ListPrompts),
        (McpResult::Generic(r), McpRequest::ReadResource(q)) => hook
            .process_read_resource_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::ReadResource),
        (McpResult::Generic(r), McpRequest::Other(q)) => hook
            .process_other_result(r, q, ctx)
            .await?
            .map(generic, McpRequest::Other),
        (mismatched, _) => ResultAction::Continue(mismatched),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl Hook for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }
    }

    fn ctx() -> CallContext {
        CallContext::new("1", "https://tools.example/mcp".parse().unwrap())
    }

    #[tokio::test]
    async fn test_default_callbacks_continue_unchanged() {
        let request = McpRequest::from_parts(
            "tools/call",
            Some(serde_json::json!({ "name": "weather", "arguments": { "city": "Oslo" } })),
        )
        .unwrap();
        let action = on_request(&Passthrough, request.clone(), &ctx()).await.unwrap();
        assert_eq!(action, RequestAction::Continue(request.clone()));

        let result = McpResult::CallTool(CallToolResult::text("sunny"));
        let action = on_result(&Passthrough, result.clone(), &request, &ctx())
            .await
            .unwrap();
        assert_eq!(action, ResultAction::Continue(result));
    }

    #[tokio::test]
    async fn test_error_results_pass_through() {
        let request = McpRequest::from_parts("tools/list", None).unwrap();
        let error = McpResult::Error(RpcError::new(RpcError::UPSTREAM_ERROR, "down"));
        let action = on_result(&Passthrough, error.clone(), &request, &ctx())
            .await
            .unwrap();
        assert_eq!(action, ResultAction::Continue(error));
    }
}
