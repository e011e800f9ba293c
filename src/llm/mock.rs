//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复；预置用尽后回显最后一条 User 消息。每次调用报告固定的 token 用量（默认 10 + 5）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::TokenUsage;
use crate::llm::{Completion, LlmClient, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    usage_per_call: Option<TokenUsage>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for r in responses {
            client.push(Ok(r.into()));
        }
        client
    }

    pub fn push(&self, response: Result<String, String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response);
        }
    }

    /// 覆盖每次调用报告的用量
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = Some(usage);
        self
    }

    /// 收到过的全部提示（按调用顺序）
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        let usage = self.usage_per_call.unwrap_or_else(|| TokenUsage::new(10, 5));

        let scripted = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(response) = scripted {
            return response.map(|content| Completion::new(content, usage));
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Completion::new(format!("Echo from Mock: {last_user}"), usage))
    }
}
