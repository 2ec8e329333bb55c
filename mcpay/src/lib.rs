#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Hook-pipeline engine for pay-per-call MCP proxies.
//!
//! This crate sits between an MCP caller and an upstream MCP tool server. Every
//! message is run through an ordered chain of [`Hook`](hook::Hook)s: a forward
//! pass over the request, a single upstream dispatch, and a reverse pass over
//! the result. A result-phase hook may ask for the whole call to be retried
//! with a new request, which is how x402 payment negotiation resumes a call
//! with a signed payment token attached.
//!
//! # Modules
//!
//! - [`proto`] - Message model: tool calls, results, JSON-RPC framing, payment and proof payloads
//! - [`context`] - Per-call context threaded through every hook callback
//! - [`hook`] - The [`Hook`](hook::Hook) trait and its control-flow outcomes
//! - [`pipeline`] - The engine driving forward/reverse passes and the retry loop
//! - [`hooks`] - Built-in payment, proof and analytics hooks
//! - [`upstream`] - Upstream dispatch abstraction
//! - [`networks`] - Registry of well-known payment networks
//!
//! # Example
//!
//! ```rust,ignore
//! use mcpay::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::builder(upstream)
//!     .hook(analytics_hook)
//!     .hook(payment_hook)
//!     .hook(proof_hook)
//!     .max_retries(2)
//!     .build();
//!
//! let result = pipeline.handle(request, &ctx).await;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` (default) - Enables tracing instrumentation, including the
//!   reconciliation log for paid dispatches that are dropped mid-flight

pub mod context;
pub mod error;
mod guard;
pub mod hook;
pub mod hooks;
pub mod networks;
pub mod pipeline;
pub mod proto;
pub mod timestamp;
pub mod upstream;

/// MCP `_meta` key carrying the signed payment token on a retried tool call.
pub const PAYMENT_TOKEN_META_KEY: &str = "payment-token";

/// MCP `_meta` key for settlement receipts returned by the upstream.
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// MCP `_meta` key for the x402 error envelope.
///
/// Upstreams built on the x402 MCP SDKs wrap payment errors as:
/// ```json
/// { "x402/error": { "code": 402, "data": { "error": "payment_required", "accepts": [] } } }
/// ```
pub const PAYMENT_ERROR_KEY: &str = "x402/error";

/// MCP `_meta` key for plain payment error payloads (`{ code, accepts, payer }`).
pub const ERROR_META_KEY: &str = "error";

/// MCP `_meta` key under which the proof hook attaches the web-proof envelope.
pub const PROOF_META_KEY: &str = "proof";

/// MCP `_meta` key the proof hook sets on a paid request whose request-phase
/// proof attempts all failed. The result phase does not prove such a request
/// again.
pub const PROOF_ATTEMPTED_META_KEY: &str = "mcpay/proof-attempted";
