//! JSON-RPC 2.0 framing for MCP messages.
//!
//! Streamable MCP servers answer either with a plain `application/json` body
//! or with a `text/event-stream` body whose `data:` lines carry the JSON-RPC
//! response. [`parse_response_body`] accepts both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::proto::{McpRequest, McpResult, MethodFamily, RpcError};

/// The JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// An inbound JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds the JSON-RPC request that carries `request` upstream.
    #[must_use]
    pub fn from_mcp(id: Value, request: &McpRequest) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            method: request.method().to_owned(),
            params: Some(request.params()),
        }
    }

    /// Converts this message into a typed [`McpRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError`] if the version is wrong or the params are invalid.
    pub fn into_mcp(self) -> Result<McpRequest, ProtoError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(ProtoError::InvalidMessage("jsonrpc must be \"2.0\""));
        }
        McpRequest::from_parts(&self.method, self.params)
    }
}

/// A JSON-RPC response carrying either a result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The id of the request this answers.
    #[serde(default)]
    pub id: Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Renders an [`McpResult`] as the response to request `id`.
    #[must_use]
    pub fn from_mcp(id: Value, result: McpResult) -> Self {
        let (result, error) = match result.into_value() {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result,
            error,
        }
    }

    /// Interprets this response for a request of the given family.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError`] if neither `result` nor `error` is present, or
    /// the result does not match the family's shape.
    pub fn into_mcp(self, family: MethodFamily) -> Result<McpResult, ProtoError> {
        match (self.result, self.error) {
            (_, Some(error)) => Ok(McpResult::Error(error)),
            (Some(result), None) => McpResult::from_value(family, result),
            (None, None) => Err(ProtoError::InvalidMessage(
                "response has neither result nor error",
            )),
        }
    }
}

/// Parses an upstream HTTP body into a JSON-RPC response.
///
/// Event-stream bodies are split into events at blank lines, and the `data:`
/// lines of each event are joined with `\n`. The last event that parses as a
/// response (has `result` or `error`) wins, so interleaved server
/// notifications are skipped.
///
/// # Errors
///
/// Returns [`ProtoError`] if no JSON-RPC response can be found.
pub fn parse_response_body(body: &str, content_type: Option<&str>) -> Result<JsonRpcResponse, ProtoError> {
    let is_event_stream = content_type.is_some_and(|ct| ct.starts_with("text/event-stream"))
        || body.trim_start().starts_with("event:")
        || body.trim_start().starts_with("data:");
    if !is_event_stream {
        return Ok(serde_json::from_str(body)?);
    }

    event_data(body)
        .iter()
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data).ok())
        .filter(|response| response.result.is_some() || response.error.is_some())
        .last()
        .ok_or(ProtoError::EmptyEventStream)
}

/// Collects the `data` payload of every event in an event-stream body.
fn event_data(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                events.push(lines.join("\n"));
                lines.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !lines.is_empty() {
        events.push(lines.join("\n"));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"content":[]}}"#;
        let response = parse_response_body(body, Some("application/json")).unwrap();
        assert_eq!(response.id, json!(1));
        assert!(response.result.is_some());
    }

    #[test]
    fn test_parse_event_stream_skips_notifications() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n\n";
        let response = parse_response_body(body, Some("text/event-stream")).unwrap();
        assert_eq!(response.id, json!(7));
        let result = response.into_mcp(MethodFamily::CallTool).unwrap();
        assert_eq!(
            result.as_call_tool().unwrap().content[0].as_text(),
            Some("ok")
        );
    }

    #[test]
    fn test_parse_event_split_across_data_lines() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":3,\n\
                    data: \"result\":{\"content\":[{\"type\":\"text\",\"text\":\"split\"}]}}\n\
                    \n";
        let response = parse_response_body(body, Some("text/event-stream")).unwrap();
        assert_eq!(response.id, json!(3));
        let result = response.into_mcp(MethodFamily::CallTool).unwrap();
        assert_eq!(
            result.as_call_tool().unwrap().content[0].as_text(),
            Some("split")
        );
    }

    #[test]
    fn test_events_are_not_joined_across_blank_lines() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n";
        assert_eq!(
            event_data(body),
            [
                r#"{"jsonrpc":"2.0","id":1,"result":{}}"#,
                r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#,
            ]
        );
        let response = parse_response_body(body, None).unwrap();
        assert_eq!(response.id, json!(1));
    }

    #[test]
    fn test_empty_event_stream_is_an_error() {
        let err = parse_response_body("event: ping\n\n", Some("text/event-stream")).unwrap_err();
        assert!(matches!(err, ProtoError::EmptyEventStream));
    }

    #[test]
    fn test_error_response_maps_to_error_result() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "nope" }
        }))
        .unwrap();
        let result = response.into_mcp(MethodFamily::ListTools).unwrap();
        assert!(matches!(result, McpResult::Error(RpcError { code: -32601, .. })));
    }

    #[test]
    fn test_request_version_is_checked() {
        let req = JsonRpcRequest {
            jsonrpc: "1.0".into(),
            id: Some(json!(1)),
            method: "tools/list".into(),
            params: None,
        };
        assert!(req.into_mcp().is_err());
    }
}
