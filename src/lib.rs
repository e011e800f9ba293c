//! Todo Agent - 把一条聊天消息变成任务列表变更并生成回复
//!
//! 模块划分：
//! - **agent**: 运行时组装（供 CLI / HTTP 调用）
//! - **agents**: 具体协作者（LLM 驱动 / 离线关键词）
//! - **chat**: 聊天消息、元数据、单轮上下文
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分层与 token 用量
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **pipeline**: plan → execute → dispatch → evaluate → assemble → record
//! - **store**: 任务存储（内存 / SQLite）

pub mod agent;
pub mod agents;
pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod store;

pub use agent::{create_agent_components, AgentComponents};
pub use pipeline::{TurnOrchestrator, TurnRequest, TurnResponse};
