//! Fakes shared by the pipeline scenario tests.

#![allow(dead_code, missing_docs)]

use mcpay::context::{CallContext, Session, TargetFlags};
use mcpay::error::{ProofError, SigningError, SinkError, UpstreamError};
use mcpay::hook::BoxFuture;
use mcpay::hooks::{AnalyticsEvent, AnalyticsSink, PaymentSigner, ProofService};
use mcpay::proto::payment::PaymentRequirement;
use mcpay::proto::proof::{
    HttpExchange, ProofEnvelope, ProofMeta, ProofRequest, ProvenExchange,
};
use mcpay::proto::{CallToolRequest, CallToolResult, ContentItem, McpRequest, McpResult};
use mcpay::upstream::Upstream;
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Answers dispatches from a script; repeats the last entry once exhausted.
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<McpResult>>,
    last: Mutex<Option<McpResult>>,
    pub requests: Mutex<Vec<McpRequest>>,
}

impl ScriptedUpstream {
    pub fn new(script: impl IntoIterator<Item = McpResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatches(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> CallToolRequest {
        self.requests.lock().unwrap()[index]
            .as_call_tool()
            .cloned()
            .expect("tool call request")
    }
}

impl Upstream for ScriptedUpstream {
    fn dispatch<'a>(
        &'a self,
        request: &'a McpRequest,
        _ctx: &'a CallContext,
    ) -> BoxFuture<'a, Result<McpResult, UpstreamError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            Ok(last.clone().expect("non-empty upstream script"))
        })
    }
}

/// Signs every requirement with a deterministic token.
#[derive(Default)]
pub struct FakeSigner {
    pub calls: Mutex<Vec<PaymentRequirement>>,
}

impl PaymentSigner for FakeSigner {
    fn sign<'a>(
        &'a self,
        requirement: &'a PaymentRequirement,
        session: &'a Session,
    ) -> BoxFuture<'a, Result<String, SigningError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(requirement.clone());
            Ok(format!("token-for-{}", session.user_id))
        })
    }
}

/// Forwards events into a channel the test drains.
pub struct ChannelSink(pub mpsc::UnboundedSender<AnalyticsEvent>);

impl AnalyticsSink for ChannelSink {
    fn emit(&self, event: AnalyticsEvent) -> BoxFuture<'_, Result<(), SinkError>> {
        let sent = self
            .0
            .send(event)
            .map_err(|e| SinkError(e.to_string().into()));
        Box::pin(async move { sent })
    }
}

/// A proof service that always proves a fixed upstream answer.
#[derive(Default)]
pub struct FakeProofService {
    pub requests: Mutex<Vec<ProofRequest>>,
}

impl FakeProofService {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ProofService for FakeProofService {
    fn execute_and_prove<'a>(
        &'a self,
        request: &'a ProofRequest,
    ) -> BoxFuture<'a, Result<ProvenExchange, ProofError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            let body = json!({
                "jsonrpc": "2.0",
                "id": "req-1",
                "result": {
                    "content": [{ "type": "text", "text": "proven forecast" }],
                    "_meta": { "x402/payment-response": receipt() }
                }
            });
            Ok(ProvenExchange {
                envelope: ProofEnvelope {
                    success: true,
                    data: "c0ffee".into(),
                    version: "0.1.0-alpha.12".into(),
                    meta: ProofMeta {
                        notary_url: "https://notary.example".into(),
                    },
                },
                response: Some(HttpExchange {
                    status: 200,
                    status_text: "OK".into(),
                    headers: BTreeMap::from([(
                        "content-type".into(),
                        "application/json".into(),
                    )]),
                    body: body.to_string(),
                }),
            })
        })
    }
}

pub fn receipt() -> Value {
    json!({
        "network": "base-sepolia",
        "transaction": "0xabc123",
        "payer": "0xpayer",
        "success": true
    })
}

pub fn payment_signal(code: &str) -> McpResult {
    McpResult::CallTool(CallToolResult {
        content: vec![ContentItem::text("This tool requires payment.")],
        is_error: true,
        meta: json!({
            "error": {
                "code": code,
                "accepts": [{
                    "scheme": "exact",
                    "network": "base-sepolia",
                    "maxAmountRequired": "10000",
                    "payTo": "0xmerchant",
                    "asset": "0xusdc"
                }],
                "payer": "0xpayer"
            }
        })
        .as_object()
        .cloned()
        .unwrap(),
        structured_content: None,
    })
}

pub fn paid_success() -> McpResult {
    let mut result = CallToolResult::text("forecast: sunny");
    result
        .meta
        .insert("x402/payment-response".into(), receipt());
    McpResult::CallTool(result)
}

pub fn weather_request() -> McpRequest {
    McpRequest::from_parts(
        "tools/call",
        Some(json!({ "name": "weather", "arguments": { "city": "Lisbon" } })),
    )
    .unwrap()
}

pub fn ctx(session: Option<Session>, proof_enabled: bool) -> CallContext {
    CallContext::new("req-1", "https://weather.tools.example/mcp".parse().unwrap())
        .with_session(session)
        .with_flags(TargetFlags { proof_enabled })
}

pub fn alice() -> Option<Session> {
    Some(Session::new("alice").with_wallet_address("0xalice"))
}
