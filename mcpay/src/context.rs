//! Per-call context threaded through every hook callback.
//!
//! A [`CallContext`] is created once per inbound message and passed by
//! reference to each hook. Hooks are shared across concurrent calls, so any
//! state that belongs to one call lives here and never on the hook itself.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::timestamp::UnixTimestamp;

/// The authenticated identity a call runs on behalf of.
///
/// Supplied by the session provider; handed to the signing service when a
/// payment has to be authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable user identifier.
    pub user_id: String,
    /// The user's managed wallet address, if provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl Session {
    /// Creates a session for `user_id` with no wallet address.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            wallet_address: None,
        }
    }

    /// Sets the wallet address.
    #[must_use]
    pub fn with_wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }
}

/// Feature flags configured for the proxied target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFlags {
    /// Whether web proofs are generated for this target.
    #[serde(default)]
    pub proof_enabled: bool,
}

/// Read-mostly context for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Identifier of the inbound request (the JSON-RPC id, or a generated one).
    pub request_id: String,
    /// The upstream MCP endpoint this call is proxied to.
    pub target_url: Url,
    /// The authenticated session, if any.
    pub session: Option<Session>,
    /// Target feature flags.
    pub flags: TargetFlags,
    /// When the call entered the proxy.
    pub started_at: UnixTimestamp,
}

impl CallContext {
    /// Creates a context with no session and default flags, stamped now.
    pub fn new(request_id: impl Into<String>, target_url: Url) -> Self {
        Self {
            request_id: request_id.into(),
            target_url,
            session: None,
            flags: TargetFlags::default(),
            started_at: UnixTimestamp::now(),
        }
    }

    /// Sets the authenticated session.
    #[must_use]
    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    /// Sets the target flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: TargetFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns the host of the target URL, if it has one.
    #[must_use]
    pub fn target_host(&self) -> Option<&str> {
        self.target_url.host_str()
    }
}
