//! 对话数据模型：聊天消息、元数据、单轮上下文

pub mod context;
pub mod message;

pub use context::ConversationContext;
pub use message::{ChatMessage, MessageMetadata, PlanMetadata, Role, ToolCallRecord};
