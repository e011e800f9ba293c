//! 任务存储
//!
//! 流水线只依赖 TodoStore trait（create / update / delete / list），
//! 具体实现：内存（InMemoryTodoStore）与 SQLite（SqliteTodoStore，需 `async-sqlite` feature）。

pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::StoreError;

pub use memory::InMemoryTodoStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteTodoStore;

/// 任务优先级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// 任务创建者
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    User,
    Agent,
}

impl Creator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Creator::User => "user",
            Creator::Agent => "agent",
        }
    }
}

/// 一条待办
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub completed: bool,
    pub agent_type: String,
    pub created_by: Creator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// 1..=10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// create 的入参
#[derive(Clone, Debug, PartialEq)]
pub struct NewTodo {
    pub content: String,
    pub agent_type: String,
    pub created_by: Creator,
    pub priority: Option<Priority>,
    pub labels: Vec<String>,
    pub complexity: Option<u8>,
}

/// update 的入参：None 表示该字段不变
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TodoUpdate {
    pub id: String,
    pub content: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub labels: Option<Vec<String>>,
    pub complexity: Option<u8>,
}

impl TodoUpdate {
    pub fn completion(id: impl Into<String>, completed: bool) -> Self {
        Self {
            id: id.into(),
            completed: Some(completed),
            ..Default::default()
        }
    }
}

/// list 的过滤条件；labels 要求任务包含全部指定标签
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TodoFilter {
    pub agent_type: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub labels: Vec<String>,
}

impl TodoFilter {
    pub fn matches(&self, todo: &Todo) -> bool {
        if let Some(agent) = &self.agent_type {
            if &todo.agent_type != agent {
                return false;
            }
        }
        if let Some(completed) = self.completed {
            if todo.completed != completed {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if todo.priority != Some(priority) {
                return false;
            }
        }
        self.labels.iter().all(|l| todo.labels.contains(l))
    }
}

/// 任务存储 trait：并发写同一 ID 由实现负责串行化；create 返回的 ID 须立即可读
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create(&self, new: NewTodo) -> Result<Todo, StoreError>;

    /// 返回 Ok(None) 表示没有该 ID
    async fn update(&self, update: TodoUpdate) -> Result<Option<Todo>, StoreError>;

    /// 返回 Ok(false) 表示没有该 ID
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn list(&self, filter: TodoFilter) -> Result<Vec<Todo>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Todo>, StoreError>;
}

pub(crate) fn validate_content(content: &str) -> Result<String, StoreError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid("content must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_complexity(complexity: Option<u8>) -> Result<(), StoreError> {
    match complexity {
        Some(c) if !(1..=10).contains(&c) => Err(StoreError::Invalid(format!(
            "complexity must be between 1 and 10, got {c}"
        ))),
        _ => Ok(()),
    }
}
