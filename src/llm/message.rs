//! 发给 LLM 的提示消息（与 API 角色一致）

use serde::{Deserialize, Serialize};

use crate::chat::{self, ChatMessage};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        match msg.role {
            chat::Role::User => Message::user(msg.content.clone()),
            chat::Role::Assistant => Message::assistant(msg.content.clone()),
        }
    }
}

/// system 提示在前，随后是对话历史
pub fn with_history(system: impl Into<String>, history: &[ChatMessage]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(system));
    messages.extend(history.iter().map(Message::from));
    messages
}
