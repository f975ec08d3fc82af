//! Command Node
//!
//! Sends a prompt to the configured LLM provider and collects the streamed
//! answer. The model can call drive tools and tools of selected MCP
//! servers; image generation models skip tools and produce a file object
//! instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use drive_store::{FileStore, McpServerConfig, UserSettings};
use futures_util::StreamExt;
use node_engine::{
    extension_keys, replace_variables, require_resolved, ExecutionContext, FileContentType,
    FileExplorerData, HandlerOutcome, LastCommandInfo, McpAppInfo, NodeEngineError, NodeHandler,
    NodeType, Result, ServiceContext, WorkflowNode,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::llm::{
    is_image_generation_model, Attachment, AttachmentKind, ChatMessage, ChatRequest, ChunkStream,
    FunctionCallLimits, GeneratedImage, LlmProvider, StreamChunk, ToolCall, ToolDefinition,
    ToolExecutor,
};
use crate::tool::drive_tools::{drive_tool_definitions, execute_drive_tool, is_drive_tool, DriveToolMode};
use crate::tool::call_tool_with_ui;
use crate::tool::mcp_client::McpClient;

/// `ragSetting` value that turns on web search instead of a RAG store
pub const WEB_SEARCH_SETTING: &str = "__websearch__";
/// `ragSetting` value that disables grounding
pub const NO_RAG_SETTING: &str = "__none__";

/// Model name by priority: node property, session setting, plan default
pub fn resolve_model(node_model: Option<String>, settings: &UserSettings) -> String {
    node_model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| settings.selected_model.clone())
        .unwrap_or_else(|| settings.api_plan.default_model().to_string())
}

/// Store ids for a RAG setting name; stores discovered earlier in the run win
fn rag_store_ids(setting: &str, context: &ExecutionContext, settings: &UserSettings) -> Vec<String> {
    if setting.is_empty() || setting == NO_RAG_SETTING || setting == WEB_SEARCH_SETTING {
        return Vec::new();
    }
    if let Some(id) = context.discovered.rag_stores.get(setting) {
        return vec![id.clone()];
    }
    match settings.rag_settings.get(setting) {
        Some(rag) if !rag.store_ids.is_empty() => rag.store_ids.clone(),
        Some(rag) => rag.store_id.iter().cloned().collect(),
        None => Vec::new(),
    }
}

/// File-object variables named in `attachments`; unparsable ones are skipped
fn collect_attachments(raw: &str, context: &ExecutionContext) -> Vec<Attachment> {
    replace_variables(raw, context)
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| context.get(name))
        .filter_map(|value| serde_json::from_str::<FileExplorerData>(value).ok())
        .filter(|data| !data.data.is_empty() && !data.mime_type.is_empty())
        .map(|data| Attachment {
            name: if data.basename.is_empty() {
                data.name.clone()
            } else {
                data.basename.clone()
            },
            kind: AttachmentKind::from_mime_type(&data.mime_type),
            mime_type: data.mime_type,
            data: data.data,
        })
        .collect()
}

fn image_file(image: &GeneratedImage) -> FileExplorerData {
    let ext = if image.mime_type == "image/png" { "png" } else { "jpg" };
    FileExplorerData {
        id: None,
        path: format!("generated.{}", ext),
        basename: format!("generated.{}", ext),
        name: "generated".to_string(),
        extension: ext.to_string(),
        mime_type: image.mime_type.clone(),
        content_type: FileContentType::Binary,
        data: image.data.clone(),
    }
}

fn exposed_mcp_name(server: &str, tool: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    };
    format!("mcp_{}_{}", sanitize(server), sanitize(tool))
}

struct McpSession {
    config: McpServerConfig,
    client: tokio::sync::Mutex<McpClient>,
}

/// Tool dispatcher for one command node invocation
struct CommandTools {
    store: Option<Arc<dyn FileStore>>,
    drive_tools: bool,
    sessions: Vec<McpSession>,
    /// Exposed tool name -> (session index, server-side tool name)
    mcp_tools: HashMap<String, (usize, String)>,
    apps: Mutex<Vec<McpAppInfo>>,
    calls: AtomicU32,
    max_calls: u32,
}

impl CommandTools {
    /// Open a session with each server and collect its tools. Servers that
    /// fail to answer are skipped.
    async fn connect_mcp(
        &mut self,
        servers: Vec<McpServerConfig>,
        services: &ServiceContext,
    ) -> Vec<ToolDefinition> {
        let mut definitions = Vec::new();
        for config in servers {
            let listed = async {
                let mut client =
                    McpClient::new(config.url.clone(), &config.headers, services.config.mcp_timeout())?;
                client.initialize().await?;
                let tools = client.list_tools().await?;
                Ok::<_, NodeEngineError>((client, tools))
            }
            .await;
            let (client, tools) = match listed {
                Ok(found) => found,
                Err(e) => {
                    log::error!("Failed to get MCP tools from '{}': {}", config.name, e);
                    continue;
                }
            };
            let index = self.sessions.len();
            for tool in tools {
                let exposed = exposed_mcp_name(&config.name, &tool.name);
                definitions.push(ToolDefinition {
                    name: exposed.clone(),
                    description: tool.description.clone().unwrap_or_default(),
                    parameters: tool.input_schema.clone(),
                });
                self.mcp_tools.insert(exposed, (index, tool.name));
            }
            self.sessions.push(McpSession {
                config,
                client: tokio::sync::Mutex::new(client),
            });
        }
        definitions
    }

    async fn close(&self) {
        for session in &self.sessions {
            if let Err(e) = session.client.lock().await.close().await {
                log::warn!("Failed to close MCP session '{}': {}", session.config.name, e);
            }
        }
    }

    fn take_apps(&self) -> Vec<McpAppInfo> {
        std::mem::take(&mut *self.apps.lock())
    }
}

#[async_trait]
impl ToolExecutor for CommandTools {
    async fn execute(&self, call: &ToolCall) -> Value {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.max_calls {
            log::warn!("Function call limit ({}) reached, refusing {}", self.max_calls, call.name);
            return json!({ "error": format!("Function call limit reached ({})", self.max_calls) });
        }

        if self.drive_tools && is_drive_tool(&call.name) {
            if let Some(store) = &self.store {
                return execute_drive_tool(store.as_ref(), &call.name, &call.args).await;
            }
        }

        if let Some((index, tool)) = self.mcp_tools.get(&call.name) {
            let session = &self.sessions[*index];
            let mut client = session.client.lock().await;
            return match call_tool_with_ui(&mut client, &session.config.headers, tool, call.args.clone()).await {
                Ok(invocation) => {
                    if let Some(app) = invocation.app {
                        self.apps.lock().push(app);
                    }
                    Value::String(invocation.result.text())
                }
                Err(e) => json!({ "error": e.to_string() }),
            };
        }

        json!({ "error": format!("Unknown tool: {}", call.name) })
    }
}

/// Command Node
///
/// # Properties
/// - `prompt` (required) - User message, templated
/// - `model` (optional) - Model name, templated
/// - `ragSetting` (optional) - RAG setting name, `__websearch__` or `__none__`
/// - `driveToolMode` (optional) - `none` (default), `noSearch` or `all`
/// - `mcpServers` (optional) - Comma-separated MCP server names from settings
/// - `attachments` (optional) - Comma-separated file-object variable names
/// - `systemPrompt` (optional) - System instruction, templated
/// - `saveTo` (optional) - Variable receiving the response text
/// - `saveImageTo` (optional) - Variable receiving a generated image file object
#[derive(Debug, Clone, Default)]
pub struct CommandHandler;

/// Drain a response stream into its text; an error chunk fails the node
async fn collect_text(
    mut stream: ChunkStream,
    mut on_image: impl FnMut(&GeneratedImage),
    default_error: &str,
) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::Text(t) => text.push_str(&t),
            StreamChunk::ImageGenerated(image) => on_image(&image),
            StreamChunk::Error(message) => {
                let message = if message.is_empty() {
                    default_error.to_string()
                } else {
                    message
                };
                return Err(NodeEngineError::service("LLM", message));
            }
            StreamChunk::Done => break,
            StreamChunk::Thinking(_) | StreamChunk::ToolCall(_) | StreamChunk::ToolResult { .. } => {}
        }
    }
    Ok(text)
}

#[async_trait]
impl NodeHandler for CommandHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Command
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let prompt = require_resolved(node, "prompt", context)?;
        let api_key = services
            .api_key
            .clone()
            .ok_or_else(|| NodeEngineError::failed("Gemini API key not configured"))?;
        let provider = services
            .extensions
            .require::<Arc<dyn LlmProvider>>(extension_keys::LLM_PROVIDER)?;
        let settings = &services.settings;

        let model = resolve_model(
            node.property("model").map(|m| replace_variables(m, context)),
            settings,
        );
        let rag_setting = node
            .property("ragSetting")
            .map(|r| replace_variables(r, context))
            .unwrap_or_default();
        let attachments = node
            .property("attachments")
            .map(|raw| collect_attachments(raw, context))
            .unwrap_or_default();
        let system_prompt = node.property("systemPrompt").map(|s| replace_variables(s, context));

        let mut request = ChatRequest {
            model: model.clone(),
            messages: vec![ChatMessage::user(prompt.clone(), attachments)],
            system_prompt,
            tools: Vec::new(),
            rag_store_ids: rag_store_ids(&rag_setting, context, settings),
            web_search: rag_setting == WEB_SEARCH_SETTING,
            rag_top_k: settings.rag_top_k,
            limits: FunctionCallLimits {
                max_function_calls: settings.max_function_calls,
                warning_threshold: settings.function_call_warning_threshold,
            },
        };
        log::info!("command {}: model {} ({} attachments)", node.id, model, request.messages[0].attachments.len());

        let mut apps = Vec::new();
        let text = if is_image_generation_model(&model) {
            let save_image_to = node.property("saveImageTo");
            let stream = provider.generate_image_stream(&api_key, request).await?;
            let mut image = None;
            let text = collect_text(stream, |img| image = Some(image_file(img)), "Image generation error").await?;
            if let (Some(var), Some(image)) = (save_image_to, image) {
                context.set(var, serde_json::to_string(&image)?);
            }
            text
        } else {
            let drive_mode: DriveToolMode = node.property("driveToolMode").unwrap_or_default().parse()?;
            let mut tools = CommandTools {
                store: services
                    .extensions
                    .get::<Arc<dyn FileStore>>(extension_keys::FILE_STORE)
                    .cloned(),
                drive_tools: drive_mode != DriveToolMode::None,
                sessions: Vec::new(),
                mcp_tools: HashMap::new(),
                apps: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                max_calls: settings.max_function_calls,
            };
            request.tools = drive_tool_definitions(drive_mode);

            let server_names: Vec<&str> = node
                .property("mcpServers")
                .map(|s| s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
                .unwrap_or_default();
            if !server_names.is_empty() {
                let servers: Vec<McpServerConfig> = settings
                    .mcp_servers_named(&server_names)
                    .into_iter()
                    .cloned()
                    .collect();
                request.tools.extend(tools.connect_mcp(servers, services).await);
            }

            let tools = Arc::new(tools);
            let executor = (!request.tools.is_empty()).then(|| tools.clone() as Arc<dyn ToolExecutor>);
            let result = async {
                let stream = provider.chat_stream(&api_key, request, executor).await?;
                collect_text(stream, |_| {}, "LLM error").await
            }
            .await;
            tools.close().await;
            apps = tools.take_apps();
            result?
        };

        if let Some(save_to) = node.property("saveTo") {
            context.set(save_to, text.clone());
            context.last_command_info = Some(LastCommandInfo {
                node_id: node.id.clone(),
                original_prompt: prompt,
                save_to: save_to.to_string(),
            });
        }

        Ok(HandlerOutcome::message(format!("Command completed with {}", model))
            .with_output(json!({ "usedModel": model, "response": text, "mcpApps": apps }))
            .with_mcp_apps(apps))
    }
}
