//! 规划阶段：Planner trait 与 OperationPlan
//!
//! Planner 把一条消息（连同上下文）变成操作计划；失败时返回 Err(原因)，整轮对话随之终止。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::ChatMessage;
use crate::core::TokenUsage;

/// 计划中的操作类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Complete,
    Delete,
    List,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Complete => "complete",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

/// Planner 按内容猜测的目标任务（弱引用，仅用于确认）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// 计划上下文：交给 Executor 的附加信息，matchedTodo 之外的字段原样保留
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_todo: Option<MatchedTask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDetails {
    pub operation: Operation,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub context: PlanContext,
}

/// Planner 的成功产物
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPlan {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_task: Option<MatchedTask>,
    pub plan: PlanDetails,
    /// 规划本身消耗的 token
    #[serde(skip)]
    pub usage: TokenUsage,
}

impl OperationPlan {
    pub fn new(intent: impl Into<String>, operation: Operation) -> Self {
        Self {
            intent: intent.into(),
            matched_task: None,
            plan: PlanDetails {
                operation,
                complexity: Complexity::default(),
                required_tools: Vec::new(),
                context: PlanContext::default(),
            },
            usage: TokenUsage::default(),
        }
    }

    /// 同时写入 matchedTask 与 context.matchedTodo
    pub fn with_match(mut self, matched: MatchedTask) -> Self {
        self.plan.context.matched_todo = Some(matched.clone());
        self.matched_task = Some(matched);
        self
    }

    /// 用于回复中确认的任务内容：优先 context.matchedTodo，其次 matchedTask
    pub fn matched_content(&self) -> Option<&str> {
        self.plan
            .context
            .matched_todo
            .as_ref()
            .or(self.matched_task.as_ref())
            .map(|m| m.content.as_str())
    }
}

/// 规划协作者
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, message: &str, context: &[ChatMessage]) -> Result<OperationPlan, String>;
}
