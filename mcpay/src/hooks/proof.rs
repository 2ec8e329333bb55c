//! Web proofs for paid tool calls.
//!
//! When a target has proofs enabled, [`ProofHook`] sends token-carrying tool
//! calls through a proof service instead of the regular upstream path. The
//! service performs the HTTP exchange itself, notarizes it, and hands back
//! the proof envelope together with the HTTP response it attests to. The hook
//! turns that response into the call's result and attaches the envelope under
//! `_meta["proof"]`.
//!
//! Unpaid calls are left alone: the first, unpaid attempt of a call goes to
//! the upstream as usual, and the proof is taken on the retry that carries the
//! payment token.
//!
//! Proof generation is best effort. Attempts are retried with exponential
//! backoff, each bounded by a timeout; when every attempt fails the call
//! proceeds without a proof. A request whose attempts already failed in the
//! request phase is marked under `_meta["mcpay/proof-attempted"]` and is not
//! proven again when its result comes back.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::{PROOF_ATTEMPTED_META_KEY, PROOF_META_KEY};
use crate::context::CallContext;
use crate::error::ProofError;
use crate::guard::PaidDispatchGuard;
use crate::hook::{
    BoxFuture, CallToolRequestAction, CallToolResultAction, Hook, HookResult, RequestAction,
    ResultAction,
};
use crate::proto::jsonrpc::JsonRpcRequest;
use crate::proto::proof::{HttpExchange, ProofEnvelope, ProofRequest, ProvenExchange};
use crate::proto::{CallToolRequest, CallToolResult, McpRequest};

/// A service that performs an HTTP exchange and notarizes it.
pub trait ProofService: Send + Sync {
    /// Executes `request` and returns the proof together with the response it
    /// attests to, when the service decodes it.
    fn execute_and_prove<'a>(
        &'a self,
        request: &'a ProofRequest,
    ) -> BoxFuture<'a, Result<ProvenExchange, ProofError>>;
}

/// Recovers the HTTP exchange a proof envelope attests to.
pub trait ProofDecoder: Send + Sync {
    /// Decodes `envelope`.
    fn decode<'a>(
        &'a self,
        envelope: &'a ProofEnvelope,
    ) -> BoxFuture<'a, Result<HttpExchange, ProofError>>;
}

/// Settings for [`ProofHook`].
///
/// A paid call waits on the proof service for at most
/// [`ProofConfig::worst_case_delay`] before it falls back to the upstream.
/// With the defaults that is 3 attempts of 20 s plus 1.5 s of backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ProofConfig {
    /// Only targets on these domains (or their subdomains) get proofs. Empty
    /// means every domain.
    pub include_domains: Vec<String>,
    /// Targets on these domains (or their subdomains) never get proofs.
    pub exclude_domains: Vec<String>,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Time budget of a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    /// Largest request body sent through the proof service.
    pub max_payload_bytes: usize,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            initial_backoff: Duration::from_millis(500),
            max_payload_bytes: 16 * 1024,
        }
    }
}

impl ProofConfig {
    /// Restricts proofs to the given domains.
    pub fn with_include_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Excludes the given domains from proofs.
    pub fn with_exclude_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attempt count (at least one attempt is always made).
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the per-attempt timeout.
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the initial backoff.
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the request body limit.
    pub const fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Longest time a call can spend on failing attempts: every attempt runs
    /// into its timeout, plus the backoff sleeps between them.
    #[must_use]
    pub fn worst_case_delay(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let mut total = self.attempt_timeout.saturating_mul(attempts);
        let mut backoff = self.initial_backoff;
        for _ in 1..attempts {
            total = total.saturating_add(backoff);
            backoff = backoff.saturating_mul(2);
        }
        total
    }

    /// Returns `true` if proofs apply to `host`.
    #[must_use]
    pub fn covers_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let matches = |domain: &String| {
            let domain = domain.trim().trim_start_matches("*.").to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        };
        if self.exclude_domains.iter().any(matches) {
            return false;
        }
        self.include_domains.is_empty() || self.include_domains.iter().any(matches)
    }
}

/// Routes paid tool calls through a proof service.
pub struct ProofHook {
    service: Arc<dyn ProofService>,
    decoder: Option<Arc<dyn ProofDecoder>>,
    config: ProofConfig,
}

impl fmt::Debug for ProofHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofHook")
            .field("decoder", &self.decoder.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProofHook {
    /// Creates a proof hook backed by `service`.
    pub fn new(service: Arc<dyn ProofService>, config: ProofConfig) -> Self {
        Self {
            service,
            decoder: None,
            config,
        }
    }

    /// Decodes envelopes the service returns without a decoded response.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn ProofDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Returns `true` if this call is a candidate for a proof.
    fn applies(&self, request: &CallToolRequest, ctx: &CallContext) -> bool {
        ctx.flags.proof_enabled
            && request.payment_token().is_some()
            && ctx
                .target_host()
                .is_some_and(|host| self.config.covers_host(host))
    }

    /// Builds the HTTP request the proof service replays against the target.
    fn proof_request(
        &self,
        request: &CallToolRequest,
        ctx: &CallContext,
    ) -> Result<ProofRequest, ProofError> {
        let message = JsonRpcRequest::from_mcp(
            Value::String(ctx.request_id.clone()),
            &McpRequest::CallTool(request.clone()),
        );
        let body = serde_json::to_string(&message)?;
        if body.len() > self.config.max_payload_bytes {
            return Err(ProofError::PayloadTooLarge {
                size: body.len(),
                limit: self.config.max_payload_bytes,
            });
        }
        Ok(ProofRequest {
            url: ctx.target_url.to_string(),
            method: "POST".to_owned(),
            headers: vec![
                "Content-Type: application/json".to_owned(),
                "Accept: application/json, text/event-stream".to_owned(),
            ],
            body: Some(body),
        })
    }

    /// Runs execute+prove with retries, returning the validated envelope and
    /// the decoded exchange, or `None` if no attempt succeeded.
    async fn prove(
        &self,
        request: &CallToolRequest,
        ctx: &CallContext,
    ) -> Option<(ProofEnvelope, HttpExchange)> {
        let proof_request = match self.proof_request(request, ctx) {
            Ok(proof_request) => proof_request,
            Err(error) => {
                #[cfg(feature = "telemetry")]
                warn!(request_id = %ctx.request_id, %error, "skipping proof");
                #[cfg(not(feature = "telemetry"))]
                let _ = error;
                return None;
            }
        };

        let paid = McpRequest::CallTool(request.clone());
        let guard = PaidDispatchGuard::arm("proof", &paid, ctx);
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut proven = None;
        for attempt in 1..=attempts {
            match self.attempt(&proof_request).await {
                Ok(exchange) => {
                    proven = Some(exchange);
                    break;
                }
                Err(error) => {
                    #[cfg(feature = "telemetry")]
                    debug!(request_id = %ctx.request_id, attempt, %error, "proof attempt failed");
                    #[cfg(not(feature = "telemetry"))]
                    let _ = error;
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }
        guard.complete();

        #[cfg(feature = "telemetry")]
        if proven.is_none() {
            warn!(request_id = %ctx.request_id, attempts, "proof attempts exhausted; continuing without proof");
        }
        proven
    }

    async fn attempt(
        &self,
        proof_request: &ProofRequest,
    ) -> Result<(ProofEnvelope, HttpExchange), ProofError> {
        let proven = tokio::time::timeout(
            self.config.attempt_timeout,
            self.service.execute_and_prove(proof_request),
        )
        .await
        .map_err(|_| ProofError::Timeout)??;
        proven.envelope.validate()?;
        let exchange = match (proven.response, &self.decoder) {
            (Some(exchange), _) => exchange,
            (None, Some(decoder)) => decoder.decode(&proven.envelope).await?,
            (None, None) => {
                return Err(ProofError::Decode(
                    "service returned no response and no decoder is configured".into(),
                ));
            }
        };
        Ok((proven.envelope, exchange))
    }
}

impl Hook for ProofHook {
    fn name(&self) -> &'static str {
        "proof"
    }

    fn process_call_tool_request<'a>(
        &'a self,
        request: CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolRequestAction>> {
        Box::pin(async move {
            let mut request = request;
            request.meta.remove(PROOF_ATTEMPTED_META_KEY);
            if !self.applies(&request, ctx) {
                return Ok(RequestAction::Continue(request));
            }
            let Some((envelope, exchange)) = self.prove(&request, ctx).await else {
                let attempted = request.with_meta(PROOF_ATTEMPTED_META_KEY, Value::Bool(true));
                return Ok(RequestAction::Continue(attempted));
            };
            let mut result = exchange.into_call_tool_result();
            result
                .meta
                .insert(PROOF_META_KEY.to_owned(), serde_json::to_value(envelope)?);
            Ok(RequestAction::Respond(result))
        })
    }

    fn process_call_tool_result<'a>(
        &'a self,
        mut result: CallToolResult,
        request: &'a CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolResultAction>> {
        Box::pin(async move {
            if result.meta.contains_key(PROOF_META_KEY)
                || request.meta.contains_key(PROOF_ATTEMPTED_META_KEY)
                || !self.applies(request, ctx)
            {
                return Ok(ResultAction::Continue(result));
            }
            let Some((envelope, exchange)) = self.prove(request, ctx).await else {
                return Ok(ResultAction::Continue(result));
            };
            let proven = exchange.into_call_tool_result();
            for (key, value) in proven.meta {
                result.meta.entry(key).or_insert(value);
            }
            result
                .meta
                .entry(PROOF_META_KEY)
                .or_insert(serde_json::to_value(envelope)?);
            Ok(ResultAction::Continue(result))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TargetFlags;
    use crate::error::UpstreamError;
    use crate::pipeline::Pipeline;
    use crate::proto::McpResult;
    use crate::proto::proof::ProofMeta;
    use crate::upstream::Upstream;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn envelope() -> ProofEnvelope {
        ProofEnvelope {
            success: true,
            data: "deadbeef".into(),
            version: "0.1.0-alpha.12".into(),
            meta: ProofMeta {
                notary_url: "https://notary.example".into(),
            },
        }
    }

    fn exchange() -> HttpExchange {
        HttpExchange {
            status: 200,
            status_text: "OK".into(),
            headers: BTreeMap::from([("content-type".into(), "application/json".into())]),
            body: json!({
                "jsonrpc": "2.0", "id": "req-1",
                "result": {
                    "content": [{ "type": "text", "text": "proven weather" }],
                    "_meta": { "x402/payment-response": { "success": true, "transaction": "0xfeed" } }
                }
            })
            .to_string(),
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyService {
        failures: usize,
        decoded: bool,
        calls: AtomicUsize,
        bodies: Mutex<Vec<String>>,
    }

    impl FlakyService {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                decoded: true,
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProofService for FlakyService {
        fn execute_and_prove<'a>(
            &'a self,
            request: &'a ProofRequest,
        ) -> BoxFuture<'a, Result<ProvenExchange, ProofError>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                self.bodies
                    .lock()
                    .unwrap()
                    .push(request.body.clone().unwrap_or_default());
                if n < self.failures {
                    return Err(ProofError::Transport("notary busy".into()));
                }
                Ok(ProvenExchange {
                    envelope: envelope(),
                    response: self.decoded.then(exchange),
                })
            })
        }
    }

    struct StaticDecoder;

    impl ProofDecoder for StaticDecoder {
        fn decode<'a>(
            &'a self,
            _envelope: &'a ProofEnvelope,
        ) -> BoxFuture<'a, Result<HttpExchange, ProofError>> {
            Box::pin(async { Ok(exchange()) })
        }
    }

    fn ctx() -> CallContext {
        CallContext::new("req-1", "https://api.tools.example/mcp".parse().unwrap())
            .with_flags(TargetFlags { proof_enabled: true })
    }

    fn config() -> ProofConfig {
        ProofConfig::default()
            .with_initial_backoff(Duration::from_millis(1))
            .with_attempt_timeout(Duration::from_secs(5))
    }

    fn paid_request() -> CallToolRequest {
        CallToolRequest::new("weather", serde_json::Map::new()).with_payment_token("tok")
    }

    #[test]
    fn test_domain_filters() {
        let config = ProofConfig::default()
            .with_include_domains(["tools.example"])
            .with_exclude_domains(["private.tools.example"]);
        assert!(config.covers_host("tools.example"));
        assert!(config.covers_host("api.tools.example"));
        assert!(!config.covers_host("private.tools.example"));
        assert!(!config.covers_host("a.private.tools.example"));
        assert!(!config.covers_host("othertools.example"));
        assert!(ProofConfig::default().covers_host("anything.example"));
    }

    #[tokio::test]
    async fn test_unpaid_request_is_not_proven() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config());
        let request = CallToolRequest::new("weather", serde_json::Map::new());

        let action = hook
            .process_call_tool_request(request.clone(), &ctx())
            .await
            .unwrap();

        assert_eq!(action, RequestAction::Continue(request));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_target_is_not_proven() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config());
        let ctx = ctx().with_flags(TargetFlags::default());

        let action = hook
            .process_call_tool_request(paid_request(), &ctx)
            .await
            .unwrap();

        assert!(matches!(action, RequestAction::Continue(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_paid_request_responds_with_proven_result() {
        let service = Arc::new(FlakyService::new(1));
        let hook = ProofHook::new(service.clone(), config());

        let action = hook
            .process_call_tool_request(paid_request(), &ctx())
            .await
            .unwrap();

        let RequestAction::Respond(result) = action else {
            panic!("expected proven response, got {action:?}");
        };
        assert_eq!(result.content[0].as_text(), Some("proven weather"));
        assert_eq!(result.meta[PROOF_META_KEY]["data"], json!("deadbeef"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);

        let body: Value = serde_json::from_str(&service.bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(body["method"], json!("tools/call"));
        assert_eq!(body["params"]["_meta"]["payment-token"], json!("tok"));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_continue_without_proof() {
        let service = Arc::new(FlakyService::new(usize::MAX));
        let hook = ProofHook::new(service.clone(), config().with_max_attempts(2));

        let action = hook
            .process_call_tool_request(paid_request(), &ctx())
            .await
            .unwrap();

        assert!(matches!(action, RequestAction::Continue(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_payload_skips_proof() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config().with_max_payload_bytes(8));

        let action = hook
            .process_call_tool_request(paid_request(), &ctx())
            .await
            .unwrap();

        assert!(matches!(action, RequestAction::Continue(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecoded_envelope_uses_decoder() {
        let service = Arc::new(FlakyService {
            decoded: false,
            ..FlakyService::new(0)
        });
        let without_decoder = ProofHook::new(service.clone(), config().with_max_attempts(1));
        let action = without_decoder
            .process_call_tool_request(paid_request(), &ctx())
            .await
            .unwrap();
        assert!(matches!(action, RequestAction::Continue(_)));

        let with_decoder =
            ProofHook::new(service, config().with_max_attempts(1)).with_decoder(Arc::new(StaticDecoder));
        let action = with_decoder
            .process_call_tool_request(paid_request(), &ctx())
            .await
            .unwrap();
        assert!(matches!(action, RequestAction::Respond(_)));
    }

    #[tokio::test]
    async fn test_result_fallback_merges_meta_and_keeps_existing_keys() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config());
        let mut result = CallToolResult::text("upstream weather");
        result.meta.insert(
            "x402/payment-response".into(),
            json!({ "success": true, "transaction": "0xorig" }),
        );

        let action = hook
            .process_call_tool_result(result, &paid_request(), &ctx())
            .await
            .unwrap();

        let ResultAction::Continue(merged) = action else {
            panic!("expected continue, got {action:?}");
        };
        assert_eq!(merged.content[0].as_text(), Some("upstream weather"));
        assert_eq!(
            merged.meta["x402/payment-response"]["transaction"],
            json!("0xorig")
        );
        assert!(merged.meta.contains_key(PROOF_META_KEY));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_with_proof_is_left_alone() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config());
        let mut result = CallToolResult::text("proven");
        result.meta.insert(PROOF_META_KEY.into(), json!({ "data": "00" }));

        let action = hook
            .process_call_tool_result(result.clone(), &paid_request(), &ctx())
            .await
            .unwrap();

        assert_eq!(action, ResultAction::Continue(result));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Default)]
    struct RecordingUpstream {
        requests: Mutex<Vec<McpRequest>>,
    }

    impl Upstream for RecordingUpstream {
        fn dispatch<'a>(
            &'a self,
            request: &'a McpRequest,
            _ctx: &'a CallContext,
        ) -> BoxFuture<'a, Result<McpResult, UpstreamError>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request.clone());
                Ok(McpResult::CallTool(CallToolResult::text("upstream weather")))
            })
        }
    }

    #[tokio::test]
    async fn test_failed_request_phase_is_not_proven_again_on_result() {
        // Enough failures to exhaust the request phase; a further attempt would succeed.
        let service = Arc::new(FlakyService::new(3));
        let upstream = Arc::new(RecordingUpstream::default());
        let pipeline = Pipeline::builder(upstream.clone())
            .hook(ProofHook::new(service.clone(), config().with_max_attempts(3)))
            .build();

        let result = pipeline
            .handle(McpRequest::CallTool(paid_request()), &ctx())
            .await;

        let result = result.as_call_tool().unwrap();
        assert_eq!(result.content[0].as_text(), Some("upstream weather"));
        assert!(!result.meta.contains_key(PROOF_META_KEY));
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);

        let requests = upstream.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let dispatched = requests[0].as_call_tool().unwrap();
        assert_eq!(dispatched.payment_token(), Some("tok"));
        assert_eq!(dispatched.meta[PROOF_ATTEMPTED_META_KEY], json!(true));
    }

    #[tokio::test]
    async fn test_attempted_marker_is_cleared_for_a_fresh_request_phase() {
        let service = Arc::new(FlakyService::new(0));
        let hook = ProofHook::new(service.clone(), config());
        let marked = paid_request().with_meta(PROOF_ATTEMPTED_META_KEY, json!(true));

        let action = hook.process_call_tool_request(marked, &ctx()).await.unwrap();

        assert!(matches!(action, RequestAction::Respond(_)));
        let body: Value = serde_json::from_str(&service.bodies.lock().unwrap()[0]).unwrap();
        assert!(body["params"]["_meta"].get(PROOF_ATTEMPTED_META_KEY).is_none());
    }

    #[test]
    fn test_worst_case_delay() {
        assert_eq!(
            ProofConfig::default().worst_case_delay(),
            Duration::from_millis(61_500)
        );
        let single = ProofConfig::default()
            .with_max_attempts(0)
            .with_attempt_timeout(Duration::from_secs(2));
        assert_eq!(single.worst_case_delay(), Duration::from_secs(2));
    }
}
