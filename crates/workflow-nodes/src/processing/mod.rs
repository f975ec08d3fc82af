//! Processing nodes
//!
//! Nodes that hand the run's data to a language model.

mod command;
mod llm;

pub use command::{resolve_model, CommandHandler, NO_RAG_SETTING, WEB_SEARCH_SETTING};
pub use llm::{
    is_image_generation_model, Attachment, AttachmentKind, ChatMessage, ChatRequest, ChunkStream,
    FunctionCallLimits, GeneratedImage, LlmProvider, Role, StreamChunk, ToolCall, ToolDefinition,
    ToolExecutor,
};
