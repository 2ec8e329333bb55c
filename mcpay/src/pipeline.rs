//! The engine driving hooks around a single upstream dispatch.
//!
//! [`Pipeline::handle`] runs one logical call:
//!
//! 1. **Forward pass** over the hooks in configured order. A hook may replace
//!    the request, or respond directly, which skips the remaining hooks and
//!    the upstream dispatch.
//! 2. **Upstream dispatch**, exactly once, unless a hook responded.
//! 3. **Reverse pass** over the hooks in reverse order, ending at the hook that
//!    responded (if one did). A hook may replace the result, stop the pass
//!    with a final result, or request a retry.
//! 4. **Retry**: the pass is abandoned and the call restarts at step 1 with
//!    the new request. Hooks the abandoned reverse pass did not reach are
//!    told about it through [`Hook::process_retried`]. After `max_retries` retries, a further retry request
//!    ends the call with a [`RpcError::RETRY_LIMIT_EXCEEDED`] error.
//!
//! A hook that fails or panics is skipped for the value it was given; the
//! pass continues with the unmodified value.

use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::HookError;
use crate::guard::PaidDispatchGuard;
use crate::hook::{self, Hook, HookResult, RequestAction, ResultAction};
use crate::proto::{McpRequest, McpResult, MethodFamily, RpcError};
use crate::upstream::Upstream;

/// Retries allowed per call unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: usize = 2;

/// An ordered chain of hooks in front of one upstream.
///
/// Cheap to share behind an [`Arc`]; `handle` takes `&self` and keeps all
/// per-call state on its own stack.
pub struct Pipeline {
    hooks: Vec<Arc<dyn Hook>>,
    upstream: Arc<dyn Upstream>,
    max_retries: usize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("Pipeline")
            .field("hooks", &names)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
#[must_use]
pub struct PipelineBuilder {
    hooks: Vec<Arc<dyn Hook>>,
    upstream: Arc<dyn Upstream>,
    max_retries: usize,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("hooks", &self.hooks.len())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Appends a hook. Hooks run in the order they are added on the way in,
    /// and in reverse on the way out.
    pub fn hook<H: Hook + 'static>(self, hook: H) -> Self {
        self.shared_hook(Arc::new(hook))
    }

    /// Appends a hook that is shared with other pipelines.
    pub fn shared_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Sets how many times a call may be retried before it fails.
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            hooks: self.hooks,
            upstream: self.upstream,
            max_retries: self.max_retries,
        }
    }
}

/// How a single pass ended.
enum Pass {
    Done(McpResult),
    Retry(McpRequest),
}

impl Pipeline {
    /// Starts building a pipeline in front of `upstream`.
    pub fn builder(upstream: Arc<dyn Upstream>) -> PipelineBuilder {
        PipelineBuilder {
            hooks: Vec::new(),
            upstream,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Returns the configured retry bound.
    #[must_use]
    pub const fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Names of the hooks, in forward-pass order.
    pub fn hook_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.hooks.iter().map(|hook| hook.name())
    }

    /// Runs `request` through the hooks and the upstream.
    ///
    /// Never fails: upstream failures and an exhausted retry budget are
    /// returned as [`McpResult::Error`].
    pub async fn handle(&self, request: McpRequest, ctx: &CallContext) -> McpResult {
        let mut request = request;
        let mut retries = 0usize;
        loop {
            let next = match self.run_pass(request, ctx).await {
                Pass::Done(result) => return result,
                Pass::Retry(next) => next,
            };
            if retries >= self.max_retries {
                #[cfg(feature = "telemetry")]
                warn!(
                    request_id = %ctx.request_id,
                    method = next.method(),
                    max_retries = self.max_retries,
                    "retry limit exceeded"
                );
                let error = RpcError::new(
                    RpcError::RETRY_LIMIT_EXCEEDED,
                    format!("retry limit of {} exceeded", self.max_retries),
                );
                self.observe_error(&error, &next, ctx).await;
                return McpResult::Error(error);
            }
            retries += 1;
            #[cfg(feature = "telemetry")]
            debug!(
                request_id = %ctx.request_id,
                method = next.method(),
                retry = retries,
                "retrying call"
            );
            request = next;
        }
    }

    async fn run_pass(&self, request: McpRequest, ctx: &CallContext) -> Pass {
        let family = request.family();
        let mut request = request;
        let mut responded = None;

        for (index, hook) in self.hooks.iter().enumerate() {
            let unmodified = request.clone();
            let action = guarded(
                hook.name(),
                "request",
                family,
                hook::on_request(hook.as_ref(), request, ctx),
            )
            .await;
            match action {
                Some(RequestAction::Continue(next)) => request = next,
                Some(RequestAction::Respond(result)) => {
                    request = unmodified;
                    responded = Some((index, result));
                    break;
                }
                None => request = unmodified,
            }
        }

        let (end, mut result) = match responded {
            Some((index, result)) => (index + 1, result),
            None => (self.hooks.len(), self.dispatch(&request, ctx).await),
        };

        for (index, hook) in self.hooks[..end].iter().enumerate().rev() {
            let unmodified = result.clone();
            let action = guarded(
                hook.name(),
                "result",
                family,
                hook::on_result(hook.as_ref(), result, &request, ctx),
            )
            .await;
            match action {
                Some(ResultAction::Continue(next)) => result = next,
                Some(ResultAction::Respond(last)) => return Pass::Done(last),
                Some(ResultAction::Retry(next)) => {
                    self.observe_retried(index, &unmodified, &request, ctx).await;
                    return Pass::Retry(next);
                }
                None => result = unmodified,
            }
        }
        Pass::Done(result)
    }

    async fn dispatch(&self, request: &McpRequest, ctx: &CallContext) -> McpResult {
        let guard = PaidDispatchGuard::arm("upstream", request, ctx);
        let outcome = self.upstream.dispatch(request, ctx).await;
        guard.complete();
        match outcome {
            Ok(result) => result,
            Err(error) => {
                #[cfg(feature = "telemetry")]
                warn!(
                    request_id = %ctx.request_id,
                    method = request.method(),
                    error = %error,
                    "upstream dispatch failed"
                );
                McpResult::Error(RpcError::new(RpcError::UPSTREAM_ERROR, error.to_string()))
            }
        }
    }

    /// Lets the hooks outside `retrying` observe the abandoned pass.
    async fn observe_retried(
        &self,
        retrying: usize,
        result: &McpResult,
        request: &McpRequest,
        ctx: &CallContext,
    ) {
        for hook in self.hooks[..retrying].iter().rev() {
            guarded(
                hook.name(),
                "retried",
                request.family(),
                hook.process_retried(result, request, ctx),
            )
            .await;
        }
    }

    /// Lets every hook observe a terminal error, in reverse order.
    async fn observe_error(&self, error: &RpcError, request: &McpRequest, ctx: &CallContext) {
        for hook in self.hooks.iter().rev() {
            guarded(
                hook.name(),
                "error",
                request.family(),
                hook.process_error(error, request, ctx),
            )
            .await;
        }
    }
}

/// Awaits a hook callback, turning errors and panics into `None`.
async fn guarded<T>(
    hook: &'static str,
    phase: &'static str,
    family: MethodFamily,
    callback: impl Future<Output = HookResult<T>>,
) -> Option<T> {
    let fault = match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(error)) => error,
        Err(payload) => HookError::Panicked(panic_message(payload.as_ref())),
    };
    #[cfg(feature = "telemetry")]
    warn!(hook, phase, %family, error = %fault, "hook fault; continuing with unmodified value");
    #[cfg(not(feature = "telemetry"))]
    let _ = (hook, phase, family, fault);
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
