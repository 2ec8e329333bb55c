//! Message model shared by the pipeline and every hook.
//!
//! Requests are grouped into method families. Tool calls get typed
//! [`CallToolRequest`] / [`CallToolResult`] shapes because payment and proof
//! logic operates on them; every other family is carried as JSON objects
//! through [`GenericRequest`] / [`GenericResult`].
//!
//! # Key Types
//!
//! - [`McpRequest`] - A request tagged by [`MethodFamily`]
//! - [`McpResult`] - A typed result, a generic result, or a JSON-RPC [`RpcError`]
//! - [`CallToolRequest`] / [`CallToolResult`] - `tools/call` params and result
//!
//! # Wire Format
//!
//! The `meta` fields serialize as MCP `_meta`; `isError` and
//! `structuredContent` keep their MCP camelCase names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::PAYMENT_TOKEN_META_KEY;
use crate::error::ProtoError;

pub mod jsonrpc;
pub mod payment;
pub mod proof;

/// An MCP `_meta` extension bag.
pub type Meta = serde_json::Map<String, Value>;

/// Protocol method families a [`Hook`](crate::hook::Hook) can intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodFamily {
    /// `tools/call`
    CallTool,
    /// `initialize`
    Initialize,
    /// `tools/list`
    ListTools,
    /// `resources/list`
    ListResources,
    /// `prompts/list`
    ListPrompts,
    /// `resources/read`
    ReadResource,
    /// Any other method.
    Other,
}

impl MethodFamily {
    /// Classifies a JSON-RPC method name.
    #[must_use]
    pub fn from_method(method: &str) -> Self {
        match method {
            "tools/call" => Self::CallTool,
            "initialize" => Self::Initialize,
            "tools/list" => Self::ListTools,
            "resources/list" => Self::ListResources,
            "prompts/list" => Self::ListPrompts,
            "resources/read" => Self::ReadResource,
            _ => Self::Other,
        }
    }

    /// Returns the stable label used in logs and analytics events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallTool => "tool-call",
            Self::Initialize => "initialize",
            Self::ListTools => "list-tools",
            Self::ListResources => "list-resources",
            Self::ListPrompts => "list-prompts",
            Self::ReadResource => "read-resource",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MethodFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of an MCP `tools/call` request.
///
/// Values are never mutated once dispatched: hooks that need a different
/// request (a paid retry, for example) derive a new value with
/// [`CallToolRequest::with_meta`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// The tool name to invoke.
    pub name: String,
    /// Arguments to pass to the tool.
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
    /// Open extension bag; carries the payment token on paid retries.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl CallToolRequest {
    /// Creates a request for `name` with the given arguments and empty `_meta`.
    pub fn new(name: impl Into<String>, arguments: serde_json::Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            meta: Meta::new(),
        }
    }

    /// Returns a copy of this request with `key` set in `_meta`.
    #[must_use]
    pub fn with_meta(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.meta.insert(key.into(), value);
        next
    }

    /// Returns a copy of this request carrying `token` as its payment token.
    #[must_use]
    pub fn with_payment_token(&self, token: impl Into<String>) -> Self {
        self.with_meta(PAYMENT_TOKEN_META_KEY, Value::String(token.into()))
    }

    /// Returns the payment token attached to this request, if any.
    #[must_use]
    pub fn payment_token(&self) -> Option<&str> {
        self.meta
            .get(PAYMENT_TOKEN_META_KEY)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    }
}

/// A single content block in a tool call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ContentItem {
    /// Text content.
    Text {
        /// The text value.
        text: String,
    },
    /// Base64-encoded image content.
    Image {
        /// Base64 image bytes.
        data: String,
        /// Image MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Base64-encoded audio content.
    Audio {
        /// Base64 audio bytes.
        data: String,
        /// Audio MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The resource contents as sent by the server.
        resource: Value,
    },
    /// A link to a resource the client may fetch.
    ResourceLink {
        /// Link fields (`uri`, `name`, ...) as sent by the server.
        #[serde(flatten)]
        fields: serde_json::Map<String, Value>,
    },
}

impl ContentItem {
    /// Creates a new text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text content if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Result of an MCP tool call.
///
/// `meta` carries out-of-band annotations: payment errors, settlement
/// receipts and proof envelopes. Hooks add keys to it rather than replace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content items returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool returned an error.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    /// Out-of-band annotations.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Optional structured content.
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Creates a successful result with a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            ..Default::default()
        }
    }

    /// Creates an error result with a single text item.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: true,
            ..Default::default()
        }
    }
}

/// A request of any non-tool-call family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericRequest {
    /// The JSON-RPC method name.
    pub method: String,
    /// The request params object.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

/// A result of any non-tool-call family, kept as the raw JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericResult(pub serde_json::Map<String, Value>);

impl GenericResult {
    /// Returns the result's `_meta` object, if present.
    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        self.0.get("_meta").and_then(Value::as_object)
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// JSON-RPC "parse error".
    pub const PARSE_ERROR: i64 = -32700;
    /// JSON-RPC "invalid request".
    pub const INVALID_REQUEST: i64 = -32600;
    /// JSON-RPC "internal error".
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Upstream could not be reached or answered with garbage.
    pub const UPSTREAM_ERROR: i64 = -32000;
    /// The pipeline's retry budget was exhausted.
    pub const RETRY_LIMIT_EXCEEDED: i64 = -32001;

    /// Creates an error with no data payload.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An MCP request tagged by method family.
#[derive(Debug, Clone, PartialEq)]
pub enum McpRequest {
    /// `tools/call`
    CallTool(CallToolRequest),
    /// `initialize`
    Initialize(GenericRequest),
    /// `tools/list`
    ListTools(GenericRequest),
    /// `resources/list`
    ListResources(GenericRequest),
    /// `prompts/list`
    ListPrompts(GenericRequest),
    /// `resources/read`
    ReadResource(GenericRequest),
    /// Any other method.
    Other(GenericRequest),
}

impl McpRequest {
    /// Builds a typed request from a JSON-RPC method name and params.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError`] if the params are not an object, or if
    /// `tools/call` params do not describe a tool call.
    pub fn from_parts(method: &str, params: Option<Value>) -> Result<Self, ProtoError> {
        let params = match params {
            None | Some(Value::Null) => serde_json::Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ProtoError::InvalidParams(method.to_owned())),
        };
        let generic = |params| GenericRequest {
            method: method.to_owned(),
            params,
        };
        Ok(match MethodFamily::from_method(method) {
            MethodFamily::CallTool => {
                Self::CallTool(serde_json::from_value(Value::Object(params))?)
            }
            MethodFamily::Initialize => Self::Initialize(generic(params)),
            MethodFamily::ListTools => Self::ListTools(generic(params)),
            MethodFamily::ListResources => Self::ListResources(generic(params)),
            MethodFamily::ListPrompts => Self::ListPrompts(generic(params)),
            MethodFamily::ReadResource => Self::ReadResource(generic(params)),
            MethodFamily::Other => Self::Other(generic(params)),
        })
    }

    /// Returns the method family of this request.
    #[must_use]
    pub const fn family(&self) -> MethodFamily {
        match self {
            Self::CallTool(_) => MethodFamily::CallTool,
            Self::Initialize(_) => MethodFamily::Initialize,
            Self::ListTools(_) => MethodFamily::ListTools,
            Self::ListResources(_) => MethodFamily::ListResources,
            Self::ListPrompts(_) => MethodFamily::ListPrompts,
            Self::ReadResource(_) => MethodFamily::ReadResource,
            Self::Other(_) => MethodFamily::Other,
        }
    }

    /// Returns the JSON-RPC method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::CallTool(_) => "tools/call",
            Self::Initialize(r)
            | Self::ListTools(r)
            | Self::ListResources(r)
            | Self::ListPrompts(r)
            | Self::ReadResource(r)
            | Self::Other(r) => &r.method,
        }
    }

    /// Returns the params as a JSON value.
    #[must_use]
    pub fn params(&self) -> Value {
        match self {
            Self::CallTool(r) => serde_json::to_value(r).unwrap_or(Value::Null),
            Self::Initialize(r)
            | Self::ListTools(r)
            | Self::ListResources(r)
            | Self::ListPrompts(r)
            | Self::ReadResource(r)
            | Self::Other(r) => Value::Object(r.params.clone()),
        }
    }

    /// Returns the tool call, if this is a `tools/call` request.
    #[must_use]
    pub const fn as_call_tool(&self) -> Option<&CallToolRequest> {
        match self {
            Self::CallTool(r) => Some(r),
            _ => None,
        }
    }
}

/// The outcome of an MCP request.
#[derive(Debug, Clone, PartialEq)]
pub enum McpResult {
    /// A `tools/call` result.
    CallTool(CallToolResult),
    /// A result of any other family.
    Generic(GenericResult),
    /// A JSON-RPC error (transport failure, upstream error, exhausted retries).
    Error(RpcError),
}

impl McpResult {
    /// Interprets a JSON-RPC `result` value for the given request family.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError`] if the value does not match the family's shape.
    pub fn from_value(family: MethodFamily, value: Value) -> Result<Self, ProtoError> {
        match family {
            MethodFamily::CallTool => Ok(Self::CallTool(serde_json::from_value(value)?)),
            _ => match value {
                Value::Object(map) => Ok(Self::Generic(GenericResult(map))),
                Value::Null => Ok(Self::Generic(GenericResult::default())),
                _ => Err(ProtoError::InvalidResult(family)),
            },
        }
    }

    /// Renders the result as a JSON-RPC `result` value or error.
    ///
    /// # Errors
    ///
    /// Returns the [`RpcError`] carried by [`McpResult::Error`].
    pub fn into_value(self) -> Result<Value, RpcError> {
        match self {
            Self::CallTool(r) => serde_json::to_value(r)
                .map_err(|e| RpcError::new(RpcError::INTERNAL_ERROR, e.to_string())),
            Self::Generic(r) => Ok(Value::Object(r.0)),
            Self::Error(e) => Err(e),
        }
    }

    /// Returns the tool call result, if this is one.
    #[must_use]
    pub const fn as_call_tool(&self) -> Option<&CallToolResult> {
        match self {
            Self::CallTool(r) => Some(r),
            _ => None,
        }
    }

    /// Returns `true` if this is a JSON-RPC error or a tool result with `isError`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        match self {
            Self::CallTool(r) => r.is_error,
            Self::Generic(_) => false,
            Self::Error(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_classifies_families() {
        let req = McpRequest::from_parts("tools/list", None).unwrap();
        assert_eq!(req.family(), MethodFamily::ListTools);
        assert_eq!(req.method(), "tools/list");

        let req = McpRequest::from_parts("notifications/initialized", Some(json!({}))).unwrap();
        assert_eq!(req.family(), MethodFamily::Other);
    }

    #[test]
    fn test_call_tool_meta_round_trips_as_underscore_meta() {
        let req = McpRequest::from_parts(
            "tools/call",
            Some(json!({ "name": "weather", "arguments": { "city": "Oslo" }, "_meta": { "trace": 1 } })),
        )
        .unwrap();
        let tool = req.as_call_tool().unwrap();
        assert_eq!(tool.name, "weather");
        assert_eq!(tool.meta.get("trace"), Some(&json!(1)));
        assert_eq!(req.params()["_meta"]["trace"], json!(1));
    }

    #[test]
    fn test_call_tool_requires_object_params() {
        let err = McpRequest::from_parts("tools/call", Some(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidParams(_)));
    }

    #[test]
    fn test_with_payment_token_adds_exactly_one_key() {
        let mut original = CallToolRequest::new("weather", serde_json::Map::new());
        original.meta.insert("trace".into(), json!("abc"));
        let paid = original.with_payment_token("tok");
        assert_eq!(paid.meta.len(), original.meta.len() + 1);
        assert_eq!(paid.payment_token(), Some("tok"));
        assert_eq!(original.payment_token(), None);
        assert_eq!(paid.name, original.name);
    }

    #[test]
    fn test_content_items_deserialize_known_and_link_types() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "hi" },
                { "type": "resource_link", "uri": "file:///a", "name": "a" }
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.content[0].as_text(), Some("hi"));
        assert!(matches!(result.content[1], ContentItem::ResourceLink { .. }));
    }

    #[test]
    fn test_generic_result_rejects_scalars() {
        let err = McpResult::from_value(MethodFamily::ListTools, json!(3)).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidResult(MethodFamily::ListTools)));
    }
}
