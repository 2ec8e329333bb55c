//! Web-proof payloads exchanged with the proof service.
//!
//! A proof envelope is an opaque, versioned notarization blob. When it
//! encodes a full HTTP exchange, decoding it yields an [`HttpExchange`]; that
//! decoding is done by the proof service itself or by an external
//! [`ProofDecoder`](crate::hooks::proof::ProofDecoder).

use alloy_primitives::hex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ProofError;
use crate::proto::jsonrpc::parse_response_body;
use crate::proto::{CallToolResult, MethodFamily, McpResult};

/// Request sent to the proof service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    /// The URL to fetch and notarize.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers as `"Name: value"` lines.
    pub headers: Vec<String>,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Metadata reported by the notary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofMeta {
    /// The notary that signed the proof.
    #[serde(default)]
    pub notary_url: String,
}

/// A proof envelope as returned by the proof service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    /// Whether the service reports success.
    #[serde(default)]
    pub success: bool,
    /// Hex-encoded proof blob.
    #[serde(default)]
    pub data: String,
    /// Proof format version.
    #[serde(default)]
    pub version: String,
    /// Notary metadata.
    #[serde(default)]
    pub meta: ProofMeta,
}

impl ProofEnvelope {
    /// Checks the envelope's self-reported fields before it is trusted.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError::InvalidEnvelope`] naming the first failed check.
    pub fn validate(&self) -> Result<(), ProofError> {
        if !self.success {
            return Err(ProofError::InvalidEnvelope("success is false"));
        }
        if self.version.trim().is_empty() {
            return Err(ProofError::InvalidEnvelope("missing version"));
        }
        if self.meta.notary_url.trim().is_empty() {
            return Err(ProofError::InvalidEnvelope("missing meta.notaryUrl"));
        }
        match hex::decode(&self.data) {
            Ok(bytes) if !bytes.is_empty() => Ok(()),
            Ok(_) => Err(ProofError::InvalidEnvelope("empty data")),
            Err(_) => Err(ProofError::InvalidEnvelope("data is not hex")),
        }
    }
}

/// The HTTP exchange a proof attests to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpExchange {
    /// HTTP status code.
    pub status: u16,
    /// HTTP reason phrase.
    #[serde(default)]
    pub status_text: String,
    /// Response headers (lower-cased names).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

impl HttpExchange {
    /// Returns the `content-type` header, matched case-insensitively.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Converts the notarized HTTP response into a tool call result.
    ///
    /// A body holding a JSON-RPC tool result (plain or event-stream) becomes
    /// that result; anything else is surfaced as text, flagged as an error
    /// when the status is not 2xx.
    #[must_use]
    pub fn into_call_tool_result(self) -> CallToolResult {
        let parsed = parse_response_body(&self.body, self.content_type())
            .ok()
            .and_then(|response| response.into_mcp(MethodFamily::CallTool).ok());
        match parsed {
            Some(McpResult::CallTool(result)) => result,
            Some(McpResult::Error(error)) => CallToolResult::error(error.message),
            _ if (200..300).contains(&self.status) => CallToolResult::text(self.body),
            _ => CallToolResult::error(format!(
                "HTTP {} {}: {}",
                self.status, self.status_text, self.body
            )),
        }
    }
}

/// Output of the combined execute+prove call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenExchange {
    /// The proof envelope.
    pub envelope: ProofEnvelope,
    /// The decoded HTTP response, when the service decoded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpExchange>,
}
