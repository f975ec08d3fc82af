//! MCP Node
//!
//! Calls one tool on a remote MCP server. Every invocation opens its own
//! session (`initialize`, `tools/call`, optional `resources/read`) and
//! closes it afterwards, whether or not the call succeeded. A failing UI
//! resource fetch is logged and does not fail the tool call.

use std::collections::HashMap;

use async_trait::async_trait;
use node_engine::{
    replace_variables, require_resolved, ExecutionContext, HandlerOutcome, McpAppInfo,
    McpToolResult, NodeEngineError, NodeHandler, NodeType, Result, ServiceContext, WorkflowNode,
};
use serde_json::{json, Value};

use super::mcp_client::{McpClient, ResourceContent, ToolCallResult};

/// Outcome of a tool call plus its optional UI resource
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub result: ToolCallResult,
    pub app: Option<McpAppInfo>,
    pub ui_resource: Option<ResourceContent>,
}

/// Call a tool on an initialized session and resolve its UI resource.
pub async fn call_tool_with_ui(
    client: &mut McpClient,
    server_headers: &HashMap<String, String>,
    tool: &str,
    args: Value,
) -> Result<ToolInvocation> {
    let result = client.call_tool(tool, args).await?;
    let Some(uri) = result.ui_resource_uri().map(str::to_string) else {
        return Ok(ToolInvocation {
            result,
            app: None,
            ui_resource: None,
        });
    };

    let ui_resource = match client.read_resource(&uri).await {
        Ok(contents) => contents.into_iter().next(),
        Err(e) => {
            log::warn!("MCP UI resource {} unavailable: {}", uri, e);
            None
        }
    };
    let app = McpAppInfo {
        server_url: client.url().to_string(),
        server_headers: server_headers.clone(),
        tool_result: McpToolResult {
            content: result.content.clone(),
            meta: Some(json!({ "ui": { "resourceUri": uri } })),
        },
        ui_resource: ui_resource
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    };
    Ok(ToolInvocation {
        result,
        app: Some(app),
        ui_resource,
    })
}

/// MCP Node
///
/// # Properties
/// - `url` (required) - Server endpoint
/// - `tool` (required) - Tool name
/// - `args` (optional) - JSON object of arguments, templated
/// - `headers` (optional) - JSON object of HTTP headers, templated
/// - `saveTo` (optional) - Variable receiving the text result
/// - `saveUiTo` (optional) - Variable receiving the UI resource JSON
#[derive(Debug, Clone, Default)]
pub struct McpHandler;

fn parse_json_property<T: serde::de::DeserializeOwned + Default>(
    node: &WorkflowNode,
    context: &ExecutionContext,
    key: &str,
    field: &str,
) -> Result<T> {
    let Some(raw) = node.property(key) else {
        return Ok(T::default());
    };
    let replaced = replace_variables(raw, context);
    serde_json::from_str(&replaced).map_err(|_| NodeEngineError::invalid_json(field, replaced))
}

#[async_trait]
impl NodeHandler for McpHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Mcp
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let url = require_resolved(node, "url", context)?;
        let tool = require_resolved(node, "tool", context)?;
        let headers: HashMap<String, String> =
            parse_json_property(node, context, "headers", "MCP headers")?;
        let args: serde_json::Map<String, Value> =
            parse_json_property(node, context, "args", "MCP args")?;

        let mut client = McpClient::new(url.clone(), &headers, services.config.mcp_timeout())?;
        let session = async {
            client.initialize().await?;
            call_tool_with_ui(&mut client, &headers, &tool, Value::Object(args)).await
        }
        .await;
        if let Err(e) = client.close().await {
            log::warn!("Failed to close MCP session with {}: {}", url, e);
        }
        let invocation = session?;

        let text = invocation.result.text();
        if let Some(save_to) = node.property("saveTo") {
            context.set(save_to, text.clone());
        }
        if let (Some(save_ui_to), Some(resource)) = (node.property("saveUiTo"), &invocation.ui_resource) {
            let ui = json!({
                "serverUrl": url,
                "resourceUri": resource.uri,
                "mimeType": resource.mime_type.as_deref().unwrap_or("text/html"),
                "content": resource.text.as_deref().or(resource.blob.as_deref()).unwrap_or_default(),
            });
            context.set(save_ui_to, ui.to_string());
        }

        log::info!("mcp {}: {} on {} returned {} bytes", node.id, tool, url, text.len());
        let apps: Vec<McpAppInfo> = invocation.app.into_iter().collect();
        Ok(HandlerOutcome::message(format!("MCP tool '{}' completed", tool))
            .with_output(json!({ "tool": tool, "result": text }))
            .with_mcp_apps(apps))
    }
}
