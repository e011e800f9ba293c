//! LLM 驱动的 Planner
//!
//! system prompt + （可选）当前任务列表 + 对话历史 → 期望 JSON 计划；`{"error": ...}` 视为规划失败。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::json::parse_json;
use crate::chat::ChatMessage;
use crate::llm::{with_history, LlmClient};
use crate::pipeline::{Complexity, MatchedTask, Operation, OperationPlan, PlanContext, PlanDetails, Planner};
use crate::store::{TodoFilter, TodoStore};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannerReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    operation: Option<Operation>,
    #[serde(default)]
    complexity: Complexity,
    #[serde(default)]
    required_tools: Vec<String>,
    #[serde(default)]
    matched_task: Option<MatchedTask>,
    #[serde(default)]
    context: PlanContext,
}

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    store: Option<Arc<dyn TodoStore>>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            store: None,
        }
    }

    /// 附带任务存储后，提示中会列出当前任务，便于按内容匹配
    pub fn with_store(mut self, store: Arc<dyn TodoStore>) -> Self {
        self.store = Some(store);
        self
    }

    async fn todo_listing(&self, agent_type: Option<&str>) -> Option<String> {
        let store = self.store.as_ref()?;
        let filter = TodoFilter {
            agent_type: agent_type.map(str::to_string),
            ..Default::default()
        };
        match store.list(filter).await {
            Ok(todos) if todos.is_empty() => Some("Current todos: (none)".to_string()),
            Ok(todos) => {
                let lines: Vec<String> = todos
                    .iter()
                    .map(|t| {
                        let mark = if t.completed { "x" } else { " " };
                        format!("- [{}] id={} {}", mark, t.id, t.content)
                    })
                    .collect();
                Some(format!("Current todos:\n{}", lines.join("\n")))
            }
            Err(e) => {
                tracing::warn!("Planner could not list todos: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, _message: &str, context: &[ChatMessage]) -> Result<OperationPlan, String> {
        let agent_type = context
            .last()
            .and_then(|m| m.metadata.as_ref())
            .map(|m| m.active_agent.as_str());
        let system = match self.todo_listing(agent_type).await {
            Some(listing) => format!("{}\n\n{}", self.system_prompt, listing),
            None => self.system_prompt.clone(),
        };

        let completion = self.llm.complete(&with_history(system, context)).await?;
        let reply: PlannerReply = parse_json(&completion.content)?;

        if let Some(error) = reply.error.filter(|e| !e.trim().is_empty()) {
            return Err(error);
        }
        let operation = reply
            .operation
            .ok_or_else(|| "Planner did not choose an operation".to_string())?;

        let mut plan = OperationPlan {
            intent: reply.intent.unwrap_or_else(|| operation.as_str().to_string()),
            matched_task: None,
            plan: PlanDetails {
                operation,
                complexity: reply.complexity,
                required_tools: reply.required_tools,
                context: reply.context,
            },
            usage: completion.usage,
        };
        if let Some(matched) = reply.matched_task {
            if plan.plan.context.matched_todo.is_none() {
                plan = plan.with_match(matched);
            } else {
                plan.matched_task = Some(matched);
            }
        }
        Ok(plan)
    }
}
