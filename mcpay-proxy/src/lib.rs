//! Pay-per-call MCP proxy server.
//!
//! Fronts one or more upstream MCP servers. Each inbound JSON-RPC message is
//! run through the target's [`mcpay`] hook pipeline, so tool calls that the
//! upstream wants paid for are signed and retried on the caller's behalf.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment expansion
//! - [`handlers`] - Axum handlers and router
//! - [`session`] - API-key sessions
//! - [`wiring`] - Pipeline construction from configuration
//! - [`error`] - HTTP-level error responses

pub mod config;
pub mod error;
pub mod handlers;
pub mod session;
pub mod wiring;
