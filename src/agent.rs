//! Agent 运行时组装
//!
//! 供 CLI 与 HTTP 前端共用：按配置选择任务存储、LLM 后端与协作者，
//! 接好事件总线与指标 sink，返回可多会话共享的 TurnOrchestrator。

use std::sync::Arc;
use std::time::Duration;

use crate::agents::prompts::{
    load_prompt, DEFAULT_EVALUATOR_PROMPT, DEFAULT_EXECUTOR_PROMPT, DEFAULT_PLANNER_PROMPT,
};
use crate::agents::{
    KeywordExecutor, KeywordPlanner, LlmEvaluator, LlmExecutor, LlmPlanner, PassthroughEvaluator,
};
use crate::config::AppConfig;
use crate::llm::{LlmClient, OpenAiClient};
use crate::pipeline::{
    ActionDispatcher, ActionExecutor, Evaluator, FanoutMetricsSink, InMemoryMetrics,
    InteractionRecorder, Planner, ToolEventBus, TracingMetricsSink, TurnOrchestrator, TurnSettings,
};
use crate::store::{InMemoryTodoStore, TodoStore};

/// 预构建的运行时组件
pub struct AgentComponents {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub store: Arc<dyn TodoStore>,
    pub events: ToolEventBus,
    pub metrics: Arc<InMemoryMetrics>,
}

/// 根据配置与环境变量选择 LLM 后端；没有可用后端时返回 None（使用离线协作者）
pub fn create_llm_from_config(cfg: &AppConfig) -> Option<Arc<dyn LlmClient>> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Some(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                None,
            )))
        }
        _ => {
            tracing::warn!("No API key set or provider is {}, using keyword collaborators", provider);
            None
        }
    }
}

/// 按 [store].backend 创建任务存储
pub async fn create_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn TodoStore>> {
    match cfg.store.backend.to_lowercase().as_str() {
        #[cfg(feature = "async-sqlite")]
        "sqlite" => {
            let store = crate::store::SqliteTodoStore::new(&cfg.store.sqlite_path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open sqlite store: {e}"))?;
            tracing::info!("Using sqlite todo store: {:?}", cfg.store.sqlite_path);
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        "sqlite" => {
            tracing::warn!("sqlite store requested but async-sqlite feature not enabled, using memory store");
            Ok(Arc::new(InMemoryTodoStore::new()))
        }
        _ => {
            tracing::info!("Using in-memory todo store");
            Ok(Arc::new(InMemoryTodoStore::new()))
        }
    }
}

pub async fn create_agent_components(cfg: &AppConfig) -> anyhow::Result<AgentComponents> {
    let store = create_store(cfg).await?;
    let llm = create_llm_from_config(cfg);

    let (planner, executor, evaluator): (
        Arc<dyn Planner>,
        Arc<dyn ActionExecutor>,
        Arc<dyn Evaluator>,
    ) = match &llm {
        Some(llm) => {
            let planner_prompt =
                load_prompt(cfg.llm.planner_prompt.as_deref(), DEFAULT_PLANNER_PROMPT);
            let executor_prompt =
                load_prompt(cfg.llm.executor_prompt.as_deref(), DEFAULT_EXECUTOR_PROMPT);
            let evaluator_prompt =
                load_prompt(cfg.llm.evaluator_prompt.as_deref(), DEFAULT_EVALUATOR_PROMPT);
            (
                Arc::new(LlmPlanner::new(llm.clone(), planner_prompt).with_store(store.clone())),
                Arc::new(LlmExecutor::new(llm.clone(), executor_prompt)),
                Arc::new(LlmEvaluator::new(llm.clone(), evaluator_prompt)),
            )
        }
        None => (
            Arc::new(KeywordPlanner::new().with_store(store.clone())),
            Arc::new(KeywordExecutor),
            Arc::new(PassthroughEvaluator),
        ),
    };

    let events = ToolEventBus::new(cfg.server.event_buffer);
    let dispatcher =
        ActionDispatcher::new(store.clone(), cfg.pipeline.store_timeout_secs).with_events(events.clone());

    let metrics = Arc::new(InMemoryMetrics::new());
    let sink = FanoutMetricsSink::new()
        .with(Arc::new(TracingMetricsSink))
        .with(metrics.clone());
    let recorder = InteractionRecorder::new(Arc::new(sink), cfg.pipeline.recorder_timeout_secs);

    let orchestrator = TurnOrchestrator::new(planner, executor, evaluator, dispatcher, recorder)
        .with_settings(TurnSettings {
            stage_timeout: Duration::from_secs(cfg.pipeline.stage_timeout_secs),
            max_history: cfg.app.max_history,
            default_agent: cfg.app.default_agent.clone(),
        });

    Ok(AgentComponents {
        orchestrator: Arc::new(orchestrator),
        store,
        events,
        metrics,
    })
}
