//! MCP (Model Context Protocol) client over streamable HTTP.
//!
//! One client is one session: `initialize` stores the server's
//! `Mcp-Session-Id`, later requests echo it, and `close` ends the session
//! with an HTTP DELETE. Responses may come back as plain JSON or as a
//! single-response `text/event-stream`.

use std::collections::HashMap;
use std::time::Duration;

use node_engine::{NodeEngineError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol version sent during initialization
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Session header defined by the streamable HTTP transport
pub const SESSION_HEADER: &str = "mcp-session-id";

const CLIENT_NAME: &str = "drive-workflows";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A tool advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Result of `tools/call`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ToolCallResult {
    /// Text items joined by newline, or the JSON of the content when there
    /// are none
    pub fn text(&self) -> String {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if texts.is_empty() {
            Value::Array(self.content.clone()).to_string()
        } else {
            texts.join("\n")
        }
    }

    /// `_meta.ui.resourceUri` when the tool exposes a UI
    pub fn ui_resource_uri(&self) -> Option<&str> {
        self.meta
            .as_ref()?
            .get("ui")?
            .get("resourceUri")?
            .as_str()
    }
}

/// One entry of a `resources/read` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blob: Option<String>,
}

fn mcp_error(err: impl std::fmt::Display) -> NodeEngineError {
    NodeEngineError::service("MCP", err)
}

/// Client for a single MCP server session
pub struct McpClient {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: Option<String>,
    next_id: u64,
}

impl McpClient {
    /// Create a client; extra headers are sent with every request
    pub fn new(url: impl Into<String>, headers: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(mcp_error)?;
            let value = HeaderValue::from_str(value).map_err(mcp_error)?;
            header_map.insert(name, value);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(mcp_error)?;
        Ok(Self {
            http,
            url: url.into(),
            headers: header_map,
            session_id: None,
            next_id: 1,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Handshake: `initialize` then the `notifications/initialized` notice
    pub async fn initialize(&mut self) -> Result<Value> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        log::debug!(
            "MCP session opened with {} (session {:?})",
            self.url,
            self.session_id
        );
        Ok(result)
    }

    pub async fn list_tools(&mut self) -> Result<Vec<McpTool>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<Vec<ResourceContent>> {
        let result = self.request("resources/read", json!({ "uri": uri })).await?;
        let contents = result.get("contents").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(contents)?)
    }

    /// End the session. A server without sessions needs no DELETE.
    pub async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session_id.take() else {
            return Ok(());
        };
        let response = self
            .http
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await
            .map_err(mcp_error)?;
        if !response.status().is_success() {
            log::debug!("MCP session close returned {}", response.status());
        }
        Ok(())
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        };
        let response = self.post(&body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(mcp_error(format!("{} failed with HTTP {}", method, status)));
        }
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };

        let response = self.post(&body).await?;
        let status = response.status();
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session.to_string());
        }
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response.text().await.map_err(mcp_error)?;
        if !status.is_success() {
            return Err(mcp_error(format!("{} failed with HTTP {}: {}", method, status, text)));
        }

        let reply = if is_stream {
            parse_event_stream(&text, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&text)?
        };
        if let Some(error) = reply.error {
            return Err(mcp_error(format!(
                "{} returned error {}: {}",
                method, error.code, error.message
            )));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    async fn post(&self, body: &JsonRpcRequest<'_>) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }
        request.send().await.map_err(mcp_error)
    }
}

/// Pick the JSON-RPC response with `id` out of an SSE body
fn parse_event_stream(body: &str, id: u64) -> Result<JsonRpcResponse> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let Ok(reply) = serde_json::from_str::<JsonRpcResponse>(data.trim()) else {
            continue;
        };
        if reply.id.as_ref().and_then(Value::as_u64) == Some(id) {
            return Ok(reply);
        }
    }
    Err(mcp_error(format!("no response for request {} in event stream", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_text() {
        let result = ToolCallResult {
            content: vec![
                json!({ "type": "text", "text": "a" }),
                json!({ "type": "image", "data": "..." }),
                json!({ "type": "text", "text": "b" }),
            ],
            ..Default::default()
        };
        assert_eq!(result.text(), "a\nb");

        let result = ToolCallResult {
            content: vec![json!({ "type": "image", "data": "x" })],
            ..Default::default()
        };
        assert_eq!(result.text(), r#"[{"data":"x","type":"image"}]"#);
    }

    #[test]
    fn test_ui_resource_uri() {
        let result = ToolCallResult {
            meta: Some(json!({ "ui": { "resourceUri": "ui://widget" } })),
            ..Default::default()
        };
        assert_eq!(result.ui_resource_uri(), Some("ui://widget"));
        assert_eq!(ToolCallResult::default().ui_resource_uri(), None);
    }

    #[test]
    fn test_parse_event_stream() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\n\n";
        let reply = parse_event_stream(body, 3).unwrap();
        assert_eq!(reply.result, Some(json!({ "ok": true })));
        assert!(parse_event_stream(body, 4).is_err());
    }

    #[test]
    fn test_rejects_bad_header_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(McpClient::new("http://localhost", &headers, Duration::from_secs(1)).is_err());
    }
}
