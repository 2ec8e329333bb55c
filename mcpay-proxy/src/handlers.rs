//! Axum route handlers for the proxy.
//!
//! - `POST /mcp/{target}` - one JSON-RPC message in, one JSON-RPC message out
//! - `GET /health` - liveness probe

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use mcpay::context::{CallContext, TargetFlags};
use mcpay::pipeline::Pipeline;
use mcpay::proto::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use mcpay::timestamp::UnixTimestamp;
use serde_json::Value;
use url::Url;

use crate::error::ProxyError;
use crate::session::SessionStore;

/// A proxied MCP server and the pipeline its calls run through.
#[derive(Debug)]
pub struct Target {
    /// Upstream MCP endpoint.
    pub url: Url,
    /// Feature flags handed to the hooks.
    pub flags: TargetFlags,
    /// The hook pipeline for this target.
    pub pipeline: Pipeline,
}

/// Everything the handlers need: targets and sessions.
#[derive(Debug, Default)]
pub struct Proxy {
    targets: HashMap<String, Target>,
    sessions: SessionStore,
    next_id: AtomicU64,
}

impl Proxy {
    /// Creates a proxy with no targets.
    #[must_use]
    pub fn new(sessions: SessionStore) -> Self {
        Self {
            targets: HashMap::new(),
            sessions,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a target under `id`.
    #[must_use]
    pub fn with_target(mut self, id: impl Into<String>, target: Target) -> Self {
        self.targets.insert(id.into(), target);
        self
    }

    /// Looks up a target.
    #[must_use]
    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    /// Ids of all registered targets.
    pub fn target_ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// The session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn generate_request_id(&self) -> String {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("mcpay-{}-{seq}", UnixTimestamp::now().as_millis())
    }
}

/// Shared application state for the proxy.
pub type ProxyState = Arc<Proxy>;

fn request_id_of(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `POST /mcp/{target}` - Runs one JSON-RPC message through the target's
/// pipeline.
///
/// Requests get a JSON-RPC response carrying their id. Notifications get
/// `202 Accepted` with an empty body.
///
/// # Errors
///
/// Returns 404 for an unknown target, 401 for a bad API key, and 400 for a
/// body that is not a valid MCP message.
pub async fn post_mcp(
    State(proxy): State<ProxyState>,
    Path(target_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let target = proxy
        .target(&target_id)
        .ok_or_else(|| ProxyError::UnknownTarget(target_id.clone()))?;
    let session = proxy.sessions().resolve(&headers)?;

    let message: JsonRpcRequest = serde_json::from_slice(&body)?;
    let id = message.id.clone();
    let request = message.into_mcp()?;

    let request_id = id
        .as_ref()
        .and_then(request_id_of)
        .unwrap_or_else(|| proxy.generate_request_id());
    let ctx = CallContext::new(request_id, target.url.clone())
        .with_session(session)
        .with_flags(target.flags);

    tracing::debug!(
        target_id = %target_id,
        request_id = %ctx.request_id,
        method = request.method(),
        user = ctx.session.as_ref().map(|s| s.user_id.as_str()),
        "Proxying MCP message"
    );

    let result = target.pipeline.handle(request, &ctx).await;

    Ok(match id {
        Some(id) => Json(JsonRpcResponse::from_mcp(id, result)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

/// `GET /health` - Health check endpoint.
pub async fn health(State(proxy): State<ProxyState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "targets": proxy.targets.len(),
    }))
}

/// Creates an Axum [`axum::Router`] with all proxy endpoints.
pub fn proxy_router(state: ProxyState) -> axum::Router {
    axum::Router::new()
        .route("/mcp/{target}", axum::routing::post(post_mcp))
        .route("/health", axum::routing::get(health))
        .with_state(state)
}
