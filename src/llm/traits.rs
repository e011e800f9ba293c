//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient；LLM 驱动的 Planner / Executor / Evaluator 只依赖此 trait。

use async_trait::async_trait;

use crate::core::TokenUsage;
use crate::llm::Message;

/// 一次补全的结果：文本与本次调用消耗的 token
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    /// 后端不报告用量时为零
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；用量随结果返回，不依赖客户端上的累计计数
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String>;
}
