//! 聊天消息与助手消息元数据
//!
//! 助手消息的 metadata 记录整条流水线的来龙去脉（工具调用、涉及的任务 ID、错误、计划、评估），
//! 不重放对话也能审计这一轮做了什么。JSON 字段统一 camelCase，与前端约定一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::plan::{MatchedTask, PlanDetails};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 一次已分发动作的审计记录（嵌入助手消息元数据）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    /// 固定为 "function"
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// 序列化后的参数 JSON
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    pub fn function(name: impl Into<String>, arguments: &Value, error: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: "function".to_string(),
            name: name.into(),
            arguments: arguments.to_string(),
            error,
        }
    }
}

/// 计划 + 意图（计划对象与 intent 合并后的形态）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    #[serde(flatten)]
    pub plan: PlanDetails,
    pub intent: String,
}

/// 消息元数据；用户消息只带 activeAgent
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default)]
    pub active_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_task: Option<MatchedTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
}

impl MessageMetadata {
    pub fn for_agent(agent_type: impl Into<String>) -> Self {
        Self {
            active_agent: agent_type.into(),
            ..Default::default()
        }
    }
}

/// 单条聊天消息，创建后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    /// 用户消息：新 ID、当前时间、仅携带 activeAgent
    pub fn user(content: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Some(MessageMetadata::for_agent(agent_type)),
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Some(metadata),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_carries_only_active_agent() {
        let msg = ChatMessage::user("add buy milk", "vercel");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["metadata"], serde_json::json!({ "activeAgent": "vercel" }));
    }

    #[test]
    fn test_tool_call_record_wire_shape() {
        let args = serde_json::json!({ "content": "buy milk" });
        let record = ToolCallRecord::function("createTodo", &args, Some("boom".into()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["arguments"], r#"{"content":"buy milk"}"#);
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_deserialize_history_without_metadata() {
        let raw = r#"{"id":"m1","role":"assistant","content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.metadata.is_none());
    }

    #[test]
    fn test_deserialize_history_with_empty_metadata() {
        let raw = r#"{"id":"m2","role":"user","content":"hi","timestamp":"2024-01-01T00:00:00Z","metadata":{}}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.metadata.unwrap().active_agent, "");
    }
}
