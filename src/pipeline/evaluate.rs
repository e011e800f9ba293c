//! 评估阶段：Evaluator 对 Executor 的说明打分并改写成最终回复
//!
//! 评估失败不终止本轮，回复退回 Executor 的原始说明。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::core::TokenUsage;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub final_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
    #[serde(skip)]
    pub usage: TokenUsage,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        message: &str,
        explanation: &str,
        context: &[ChatMessage],
    ) -> Result<Evaluation, String>;
}
