//! LLM provider seam
//!
//! The command node talks to the model through [`LlmProvider`], registered
//! under `extension_keys::LLM_PROVIDER`. Providers stream [`StreamChunk`]s
//! and run function calls through the [`ToolExecutor`] they are handed.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use node_engine::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Text,
}

impl AttachmentKind {
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            AttachmentKind::Image
        } else if mime_type == "application/pdf" {
            AttachmentKind::Pdf
        } else {
            AttachmentKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub mime_type: String,
    /// Text content or base64 payload
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

/// One item of a streamed model response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Thinking(String),
    ToolCall(ToolCall),
    ToolResult { name: String, result: Value },
    ImageGenerated(GeneratedImage),
    Error(String),
    Done,
}

/// Caps on function calling within one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCallLimits {
    pub max_function_calls: u32,
    pub warning_threshold: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    /// File search stores to ground on
    pub rag_store_ids: Vec<String>,
    pub web_search: bool,
    pub rag_top_k: u32,
    pub limits: FunctionCallLimits,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// Runs function calls requested by the model
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Result handed back to the model; failures are reported in-band
    async fn execute(&self, call: &ToolCall) -> Value;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream a chat response, calling `tools` for any function calls
    async fn chat_stream(
        &self,
        api_key: &str,
        request: ChatRequest,
        tools: Option<Arc<dyn ToolExecutor>>,
    ) -> Result<ChunkStream>;

    /// Stream an image generation response
    async fn generate_image_stream(&self, api_key: &str, request: ChatRequest) -> Result<ChunkStream>;
}

/// Models that answer with images instead of running tools
pub fn is_image_generation_model(model: &str) -> bool {
    model.contains("-image")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_kind() {
        assert_eq!(AttachmentKind::from_mime_type("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_mime_type("application/pdf"), AttachmentKind::Pdf);
        assert_eq!(AttachmentKind::from_mime_type("text/csv"), AttachmentKind::Text);
    }

    #[test]
    fn test_image_model_detection() {
        assert!(is_image_generation_model("gemini-2.5-flash-image"));
        assert!(!is_image_generation_model("gemini-2.5-pro"));
    }
}
