//! Built-in hooks.
//!
//! - [`analytics::AnalyticsHook`] - snapshots every settled call for an external sink
//! - [`payment::PaymentHook`] - answers x402 payment signals by signing and retrying
//! - [`proof::ProofHook`] - routes paid tool calls through a web-proof service
//!
//! The usual order is analytics, payment, proof. Analytics goes first so that
//! it runs last on the way out and sees what the other hooks added.

pub mod analytics;
pub mod payment;
pub mod proof;

pub use analytics::{AnalyticsEvent, AnalyticsHook, AnalyticsSink};
pub use payment::{FundingUrlBuilder, PaymentHook, PaymentHookConfig, PaymentSigner};
pub use proof::{ProofConfig, ProofDecoder, ProofHook, ProofService};
