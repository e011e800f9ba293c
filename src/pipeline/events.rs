//! 工具执行事件：供 SSE 等实时通道展示每个已分发动作
//!
//! Dispatcher 在调用存储前发布 pending，结束后以同一 id 发布 success / error。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: String,
    pub tool: String,
    pub input: Value,
    pub output: Value,
    pub timestamp: DateTime<Utc>,
    pub status: ToolStatus,
}

impl ToolExecution {
    pub fn pending(tool: impl Into<String>, input: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.into(),
            input,
            output: Value::Null,
            timestamp: Utc::now(),
            status: ToolStatus::Pending,
        }
    }

    /// 同一 id 的终态记录
    pub fn finish(&self, status: ToolStatus, output: Value) -> Self {
        Self {
            id: self.id.clone(),
            tool: self.tool.clone(),
            input: self.input.clone(),
            output,
            timestamp: Utc::now(),
            status,
        }
    }
}

/// 广播总线；没有订阅者时发布直接丢弃
#[derive(Clone, Debug)]
pub struct ToolEventBus {
    tx: broadcast::Sender<ToolExecution>,
}

impl ToolEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ToolExecution) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToolExecution> {
        self.tx.subscribe()
    }
}

impl Default for ToolEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
