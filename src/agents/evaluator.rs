//! LLM 驱动的 Evaluator：对草稿回复打分并改写
//!
//! 回复不是 JSON 时直接把文本作为最终回复（不带评估载荷）；空回复视为评估失败。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::agents::json::{extract_json, parse_json};
use crate::chat::ChatMessage;
use crate::llm::{with_history, LlmClient};
use crate::pipeline::{Evaluation, Evaluator};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluatorReply {
    #[serde(default)]
    final_response: Option<String>,
    #[serde(default)]
    evaluation: Option<Value>,
}

pub struct LlmEvaluator {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
}

impl LlmEvaluator {
    pub fn new(llm: Arc<dyn LlmClient>, prompt_template: impl Into<String>) -> Self {
        Self {
            llm,
            prompt_template: prompt_template.into(),
        }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        message: &str,
        explanation: &str,
        context: &[ChatMessage],
    ) -> Result<Evaluation, String> {
        let system = self
            .prompt_template
            .replace("{message}", message)
            .replace("{explanation}", explanation);
        let completion = self.llm.complete(&with_history(system, context)).await?;
        let raw = completion.content;

        if extract_json(&raw).is_none() {
            let text = raw.trim();
            if text.is_empty() {
                return Err("Empty evaluation".to_string());
            }
            return Ok(Evaluation {
                final_response: text.to_string(),
                evaluation: None,
                usage: completion.usage,
            });
        }

        let reply: EvaluatorReply = parse_json(&raw)?;
        let final_response = reply
            .final_response
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| "Evaluator returned no finalResponse".to_string())?;
        Ok(Evaluation {
            final_response,
            evaluation: reply.evaluation,
            usage: completion.usage,
        })
    }
}
