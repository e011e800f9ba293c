//! LLM 驱动的 Executor：把计划变成具体动作
//!
//! 提示中附带动作参数的 JSON Schema；回复 `{"action": {...}, "explanation": "..."}`。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::json::parse_json;
use crate::chat::ChatMessage;
use crate::llm::{with_history, LlmClient};
use crate::pipeline::{
    action_schema_json, Action, ActionExecutor, ExecutionResult, Operation, PlanContext,
};

#[derive(Debug, Deserialize)]
struct ExecutorReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    explanation: Option<String>,
}

pub struct LlmExecutor {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
}

impl LlmExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, prompt_template: impl Into<String>) -> Self {
        Self {
            llm,
            prompt_template: prompt_template.into(),
        }
    }

    fn render(&self, operation: Operation, plan_context: &PlanContext) -> Result<String, String> {
        let context = serde_json::to_string(plan_context).map_err(|e| e.to_string())?;
        let schema = serde_json::to_string_pretty(&action_schema_json()).map_err(|e| e.to_string())?;
        Ok(self
            .prompt_template
            .replace("{operation}", operation.as_str())
            .replace("{context}", &context)
            .replace("{schema}", &schema))
    }
}

#[async_trait]
impl ActionExecutor for LlmExecutor {
    async fn execute(
        &self,
        operation: Operation,
        plan_context: &PlanContext,
        _message: &str,
        context: &[ChatMessage],
    ) -> Result<ExecutionResult, String> {
        let system = self.render(operation, plan_context)?;
        let completion = self.llm.complete(&with_history(system, context)).await?;
        let reply: ExecutorReply = parse_json(&completion.content)?;

        if let Some(error) = reply.error.filter(|e| !e.trim().is_empty()) {
            return Err(error);
        }
        Ok(ExecutionResult {
            action: reply.action,
            explanation: reply.explanation.unwrap_or_default(),
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_action_and_explanation_parsed() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"action": {"name": "createTodo", "arguments": {"content": "buy milk"}}, "explanation": "Added buy milk."}"#,
        ]));
        let executor = LlmExecutor::new(llm.clone(), "op={operation}\n{schema}");
        let result = executor
            .execute(
                Operation::Create,
                &PlanContext::default(),
                "add buy milk",
                &[ChatMessage::user("add buy milk", "default")],
            )
            .await
            .unwrap();
        let action = result.action.unwrap();
        assert_eq!(action.name, "createTodo");
        assert_eq!(action.arguments["content"], "buy milk");
        assert_eq!(result.explanation, "Added buy milk.");
        assert_eq!(result.usage.total_tokens, 15);

        let system = &llm.prompts()[0][0].content;
        assert!(system.starts_with("op=create"));
        assert!(system.contains("completeTodo"));
    }

    #[tokio::test]
    async fn test_null_action_is_not_an_error() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"action": null, "explanation": "Nothing to do."}"#,
        ]));
        let executor = LlmExecutor::new(llm, "{operation}");
        let result = executor
            .execute(Operation::List, &PlanContext::default(), "hi", &[])
            .await
            .unwrap();
        assert!(result.action.is_none());
    }
}
