//! x402 payment payloads carried in MCP tool results.
//!
//! An upstream that wants to be paid answers a tool call with a result whose
//! `_meta` (or body) names a payment error code and lists the payment options
//! it accepts. These helpers find that signal wherever the upstream put it:
//!
//! 1. `_meta.error` - `{ "code": "payment_required", "accepts": [...], "payer": "0x..." }`
//! 2. `_meta["x402/error"]` - `{ "code": 402, "data": { "error": "...", "accepts": [...] } }`
//! 3. An x402 `PaymentRequired` body in `structuredContent` or in the text of
//!    an error result (`{ "x402Version": 1, "error": "...", "accepts": [...] }`)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::proto::{CallToolResult, Meta};
use crate::{ERROR_META_KEY, PAYMENT_ERROR_KEY, PAYMENT_RESPONSE_META_KEY};

/// A payment option offered by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme identifier (e.g. `"exact"`).
    #[serde(default)]
    pub scheme: String,
    /// Network name or CAIP-2 identifier (e.g. `"base-sepolia"`).
    #[serde(default)]
    pub network: String,
    /// Maximum amount in atomic token units, as a decimal string.
    #[serde(default)]
    pub max_amount_required: String,
    /// Recipient address.
    #[serde(default)]
    pub pay_to: String,
    /// Token asset address.
    #[serde(default)]
    pub asset: String,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Settlement receipt returned by the upstream after a paid call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Network the payment settled on.
    #[serde(default)]
    pub network: String,
    /// Settlement transaction hash.
    #[serde(default)]
    pub transaction: String,
    /// Paying address.
    #[serde(default)]
    pub payer: String,
    /// Whether settlement succeeded.
    #[serde(default)]
    pub success: bool,
}

/// The payment-related error codes the payment hook recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentErrorCode {
    /// No payment was attached.
    PaymentRequired,
    /// The attached payment was rejected.
    InvalidPayment,
    /// No payment option matched what the client offered.
    UnableToMatchPaymentRequirements,
    /// The upstream failed to price the call.
    PriceComputeFailed,
    /// The payer does not hold enough funds.
    InsufficientFunds,
}

impl PaymentErrorCode {
    /// All recognized codes.
    pub const ALL: [Self; 5] = [
        Self::PaymentRequired,
        Self::InvalidPayment,
        Self::UnableToMatchPaymentRequirements,
        Self::PriceComputeFailed,
        Self::InsufficientFunds,
    ];

    /// Returns the wire spelling of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentRequired => "payment_required",
            Self::InvalidPayment => "invalid_payment",
            Self::UnableToMatchPaymentRequirements => "unable_to_match_payment_requirements",
            Self::PriceComputeFailed => "price_compute_failed",
            Self::InsufficientFunds => "insufficient_funds",
        }
    }

    /// Returns `true` if the call can be resumed by attaching a payment.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::InsufficientFunds)
    }
}

impl fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognized payment error code.
#[derive(Debug, thiserror::Error)]
#[error("unknown payment error code {0}")]
pub struct UnknownPaymentErrorCode(String);

impl FromStr for PaymentErrorCode {
    type Err = UnknownPaymentErrorCode;

    /// Parses a code, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPaymentErrorCode(s.to_owned()))
    }
}

/// A payment signal found in a tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSignal {
    /// The recognized error code.
    pub code: PaymentErrorCode,
    /// Payment options, in the upstream's order of preference.
    pub accepts: Vec<PaymentRequirement>,
    /// The payer address the upstream attributed the shortfall to, if any.
    pub payer: Option<String>,
}

/// Finds a payment signal in a tool result.
///
/// `_meta` payloads are honored whether or not the result is flagged as an
/// error; body payloads are only considered on error results.
#[must_use]
pub fn extract_payment_signal(result: &CallToolResult) -> Option<PaymentSignal> {
    if let Some(signal) = result
        .meta
        .get(ERROR_META_KEY)
        .and_then(parse_signal_object)
    {
        return Some(signal);
    }

    if let Some(signal) = result.meta.get(PAYMENT_ERROR_KEY).and_then(parse_x402_envelope) {
        return Some(signal);
    }

    if !result.is_error {
        return None;
    }

    if let Some(signal) = result.structured_content.as_ref().and_then(|sc| {
        parse_x402_envelope(sc).or_else(|| parse_payment_required_body(sc))
    }) {
        return Some(signal);
    }

    result
        .content
        .iter()
        .filter_map(|item| item.as_text())
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find_map(|value| {
            parse_x402_envelope(&value).or_else(|| parse_payment_required_body(&value))
        })
}

/// Extracts a settlement receipt from a result's `_meta`.
#[must_use]
pub fn extract_payment_receipt(meta: &Meta) -> Option<PaymentReceipt> {
    let value = meta.get(PAYMENT_RESPONSE_META_KEY)?;
    serde_json::from_value(value.clone()).ok()
}

/// Parses `{ code, accepts, payer }`.
fn parse_signal_object(value: &Value) -> Option<PaymentSignal> {
    let obj = value.as_object()?;
    let code = obj.get("code")?.as_str()?.parse().ok()?;
    Some(PaymentSignal {
        code,
        accepts: parse_accepts(obj.get("accepts")),
        payer: obj.get("payer").and_then(Value::as_str).map(str::to_owned),
    })
}

/// Parses the `x402/error` envelope: `{ code: 402 | "<code>", data: { error, accepts, payer } }`.
fn parse_x402_envelope(value: &Value) -> Option<PaymentSignal> {
    let obj = value.get(PAYMENT_ERROR_KEY).unwrap_or(value).as_object()?;
    let data = obj.get("data").and_then(Value::as_object);

    let named = data
        .and_then(|d| d.get("error"))
        .or_else(|| obj.get("code"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());
    let code = match named {
        Some(code) => code,
        None if obj.get("code").and_then(Value::as_u64) == Some(402) => {
            PaymentErrorCode::PaymentRequired
        }
        None => return None,
    };

    Some(PaymentSignal {
        code,
        accepts: parse_accepts(data.and_then(|d| d.get("accepts"))),
        payer: data
            .and_then(|d| d.get("payer"))
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

/// Parses an x402 `PaymentRequired` body: `{ x402Version, error, accepts, payer? }`.
fn parse_payment_required_body(value: &Value) -> Option<PaymentSignal> {
    let obj = value.as_object()?;
    obj.get("x402Version")?.as_u64().filter(|v| *v >= 1)?;
    let code = obj
        .get("error")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(PaymentErrorCode::PaymentRequired);
    Some(PaymentSignal {
        code,
        accepts: parse_accepts(obj.get("accepts")),
        payer: obj.get("payer").and_then(Value::as_str).map(str::to_owned),
    })
}

/// Parses an `accepts` array, skipping entries that are not requirement objects.
fn parse_accepts(value: Option<&Value>) -> Vec<PaymentRequirement> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
