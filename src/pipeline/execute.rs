//! 执行阶段：ActionExecutor trait
//!
//! Executor 把计划变成具体动作 `{name, arguments}` 与一段说明文字；
//! 失败或缺少动作都会终止本轮。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::core::TokenUsage;
use crate::pipeline::plan::{Operation, PlanContext};

/// Executor 选出的动作，name 为 createTodo / updateTodo / completeTodo / deleteTodo / listTodos
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub explanation: String,
    #[serde(skip)]
    pub usage: TokenUsage,
}

/// 执行协作者
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        operation: Operation,
        plan_context: &PlanContext,
        message: &str,
        context: &[ChatMessage],
    ) -> Result<ExecutionResult, String>;
}
