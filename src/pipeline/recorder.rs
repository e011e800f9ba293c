//! Interaction Recorder：把一轮的耗时与结果计数交给指标协作者
//!
//! 记录是尽力而为的：sink 报错或超时只打 warn 日志，不影响已经组装好的回复。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::chat::ChatMessage;
use crate::core::TokenUsage;

/// 一轮对话的指标记录（只写，不回读）
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub agent_type: String,
    pub user_message: String,
    pub assistant_message: ChatMessage,
    pub response_time_ms: u64,
    pub success: bool,
    pub todo_success_count: u32,
    pub todo_fail_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// 记录器入参中的统计部分
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnStats {
    pub response_time_ms: u64,
    pub success: bool,
    pub todo_success_count: u32,
    pub todo_fail_count: u32,
    pub token_usage: Option<TokenUsage>,
}

/// 指标协作者
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, record: InteractionRecord) -> Result<(), String>;
}

/// 以结构化日志输出每轮指标
#[derive(Debug, Default)]
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn record(&self, record: InteractionRecord) -> Result<(), String> {
        tracing::info!(
            agent = %record.agent_type,
            response_time_ms = record.response_time_ms,
            success = record.success,
            todo_success = record.todo_success_count,
            todo_failed = record.todo_fail_count,
            total_tokens = record.token_usage.map(|u| u.total_tokens).unwrap_or(0),
            "interaction"
        );
        Ok(())
    }
}

/// 按 agent 聚合的指标
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub turns: u64,
    pub successful_turns: u64,
    pub todo_success_count: u64,
    pub todo_fail_count: u64,
    pub total_response_time_ms: u64,
    pub avg_response_time_ms: f64,
    pub tokens: TokenUsage,
}

/// 内存聚合 sink，供 /api/metrics 与测试读取快照
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    by_agent: RwLock<HashMap<String, AgentMetrics>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashMap<String, AgentMetrics> {
        self.by_agent.read().await.clone()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetrics {
    async fn record(&self, record: InteractionRecord) -> Result<(), String> {
        let mut by_agent = self.by_agent.write().await;
        let entry = by_agent.entry(record.agent_type.clone()).or_default();
        entry.turns += 1;
        if record.success {
            entry.successful_turns += 1;
        }
        entry.todo_success_count += u64::from(record.todo_success_count);
        entry.todo_fail_count += u64::from(record.todo_fail_count);
        entry.total_response_time_ms += record.response_time_ms;
        entry.avg_response_time_ms = entry.total_response_time_ms as f64 / entry.turns as f64;
        if let Some(usage) = &record.token_usage {
            entry.tokens.add(usage);
        }
        Ok(())
    }
}

/// 转发给多个 sink；全部尝试后返回第一个错误
#[derive(Default)]
pub struct FanoutMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl MetricsSink for FanoutMetricsSink {
    async fn record(&self, record: InteractionRecord) -> Result<(), String> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// 记录器：包装 sink，吞掉失败
pub struct InteractionRecorder {
    sink: Arc<dyn MetricsSink>,
    timeout: Duration,
}

impl InteractionRecorder {
    pub fn new(sink: Arc<dyn MetricsSink>, timeout_secs: u64) -> Self {
        Self {
            sink,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn record(
        &self,
        agent_type: &str,
        user_message: &str,
        assistant_message: &ChatMessage,
        stats: TurnStats,
    ) {
        let record = InteractionRecord {
            agent_type: agent_type.to_string(),
            user_message: user_message.to_string(),
            assistant_message: assistant_message.clone(),
            response_time_ms: stats.response_time_ms,
            success: stats.success,
            todo_success_count: stats.todo_success_count,
            todo_fail_count: stats.todo_fail_count,
            token_usage: stats.token_usage,
        };
        match tokio::time::timeout(self.timeout, self.sink.record(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to record interaction: {}", e),
            Err(_) => tracing::warn!("Recording interaction timed out"),
        }
    }
}
