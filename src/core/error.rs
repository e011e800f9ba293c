//! 错误类型
//!
//! TurnError：终止整轮对话的错误（规划失败、执行失败、未生成动作、阶段超时）；
//! StoreError：任务存储返回的错误，由 ActionDispatcher 就地转换为可恢复的失败，不会终止对话。

use thiserror::Error;

/// 终止当前轮次的错误：调用方得到 `{success: false, error}`，不产生助手消息
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Planner 报告失败，原样透传其错误信息
    #[error("{0}")]
    PlanFailed(String),

    /// Executor 报告失败，原样透传其错误信息
    #[error("{0}")]
    ExecutionFailed(String),

    /// Executor 成功但没有给出可执行动作
    #[error("No action generated")]
    NoAction,

    /// 协作者在限定时间内未返回（与显式失败同等对待）
    #[error("{stage} timed out")]
    Timeout { stage: &'static str },
}

/// 任务存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Todo not found: {0}")]
    NotFound(String),

    #[error("Invalid todo: {0}")]
    Invalid(String),

    /// 存储明确拒绝了操作，信息原样展示给用户
    #[error("{0}")]
    Rejected(String),

    /// 存储内部故障（连接断开、SQL 错误等）
    #[error("{0}")]
    Backend(String),
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
