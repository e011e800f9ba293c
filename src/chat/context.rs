//! 一轮对话的上下文：历史消息 + 本轮用户消息
//!
//! 只追加、不原地修改；超出 max_history 时丢弃最旧的历史，保留最近部分。

use super::message::ChatMessage;

#[derive(Clone, Debug, Default)]
pub struct ConversationContext {
    messages: Vec<ChatMessage>,
}

impl ConversationContext {
    /// 取历史最近 max_history 条，再追加本轮用户消息
    pub fn for_turn(prior: &[ChatMessage], user_message: ChatMessage, max_history: usize) -> Self {
        let skip = prior.len().saturating_sub(max_history);
        let mut messages = Vec::with_capacity(prior.len() - skip + 1);
        messages.extend(prior[skip..].iter().cloned());
        messages.push(user_message);
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// 本轮用户消息（总是最后一条）
    pub fn current(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
