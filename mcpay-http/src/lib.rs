#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP clients for the collaborators of the [`mcpay`] hook pipeline.
//!
//! Each client talks JSON over HTTP with `reqwest` and implements the matching
//! `mcpay` trait, so it can be plugged straight into a pipeline:
//!
//! - [`HttpUpstream`] - dispatches JSON-RPC requests to the target MCP server
//!   ([`mcpay::upstream::Upstream`]); understands plain JSON and event-stream
//!   responses
//! - [`RemoteSigner`] - obtains signed payment tokens
//!   ([`mcpay::hooks::PaymentSigner`])
//! - [`FundingClient`] - builds on-ramp links
//!   ([`mcpay::hooks::FundingUrlBuilder`])
//! - [`ProofClient`] - requests web proofs ([`mcpay::hooks::ProofService`])
//! - [`HttpAnalyticsSink`] - posts analytics events
//!   ([`mcpay::hooks::AnalyticsSink`])
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing spans around every outbound request

pub mod analytics;
pub mod client;
pub mod error;
pub mod funding;
pub mod proof;
pub mod signer;
pub mod upstream;

pub use analytics::HttpAnalyticsSink;
pub use client::JsonClient;
pub use error::ClientError;
pub use funding::FundingClient;
pub use proof::ProofClient;
pub use signer::RemoteSigner;
pub use upstream::HttpUpstream;
