//! Turn Orchestrator：驱动一轮对话的完整流水线
//!
//! plan → execute → dispatch → evaluate → assemble → record，严格顺序执行，每一步都等上一步完成。
//!
//! 错误分三层：
//! - Planner / Executor 失败（含超时、缺少动作）终止本轮，此时尚未改动任何任务；
//! - 分发失败折叠进助手消息的 metadata.error，本轮照常完成；
//! - 指标记录失败只记日志。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::chat::{ChatMessage, ConversationContext};
use crate::core::TurnError;
use crate::pipeline::assemble::{assemble, TurnArtifacts};
use crate::pipeline::dispatch::{ActionDispatcher, COMPLETE_TODO, UPDATE_TODO};
use crate::pipeline::evaluate::Evaluator;
use crate::pipeline::execute::ActionExecutor;
use crate::pipeline::plan::Planner;
use crate::pipeline::recorder::{InteractionRecorder, TurnStats};

/// 入站请求：`{message, agentType, messages}`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// 出站响应：成功带助手消息，失败带错误文本
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TurnResponse {
    Success { success: bool, message: ChatMessage },
    Failure { success: bool, error: String },
}

impl TurnResponse {
    pub fn from_result(result: Result<ChatMessage, TurnError>) -> Self {
        match result {
            Ok(message) => TurnResponse::Success {
                success: true,
                message,
            },
            Err(e) => TurnResponse::Failure {
                success: false,
                error: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TurnResponse::Success { .. })
    }
}

/// 编排参数
#[derive(Clone, Debug)]
pub struct TurnSettings {
    /// 单个协作者（planner / executor / evaluator）的时间上限
    pub stage_timeout: Duration,
    /// 转发给协作者的历史消息上限
    pub max_history: usize,
    /// 请求未带 agentType 时使用
    pub default_agent: String,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(60),
            max_history: 20,
            default_agent: "default".to_string(),
        }
    }
}

pub struct TurnOrchestrator {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn ActionExecutor>,
    evaluator: Arc<dyn Evaluator>,
    dispatcher: ActionDispatcher,
    recorder: InteractionRecorder,
    settings: TurnSettings,
}

impl TurnOrchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn ActionExecutor>,
        evaluator: Arc<dyn Evaluator>,
        dispatcher: ActionDispatcher,
        recorder: InteractionRecorder,
    ) -> Self {
        Self {
            planner,
            executor,
            evaluator,
            dispatcher,
            recorder,
            settings: TurnSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// 处理入站请求，终止性错误转为 `{success: false, error}`
    pub async fn handle(&self, request: TurnRequest) -> TurnResponse {
        let agent_type = request
            .agent_type
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_agent.clone());
        let result = self
            .run_turn(&request.message, &agent_type, &request.messages)
            .await;
        if let Err(e) = &result {
            tracing::error!("Error in chat turn: {}", e);
        }
        TurnResponse::from_result(result)
    }

    /// 跑完一轮：返回助手消息，或终止性错误
    pub async fn run_turn(
        &self,
        message: &str,
        agent_type: &str,
        prior: &[ChatMessage],
    ) -> Result<ChatMessage, TurnError> {
        let started = Instant::now();

        let user_message = ChatMessage::user(message, agent_type);
        let context =
            ConversationContext::for_turn(prior, user_message, self.settings.max_history);
        let history = context.messages();

        let plan = self
            .bounded("planner", self.planner.plan(message, history))
            .await?
            .map_err(TurnError::PlanFailed)?;

        tracing::info!(
            intent = %plan.intent,
            operation = plan.plan.operation.as_str(),
            complexity = ?plan.plan.complexity,
            tools = ?plan.plan.required_tools,
            matched = ?plan.matched_task.as_ref().map(|m| m.content.as_str()),
            "Operation plan"
        );

        let execution = self
            .bounded(
                "executor",
                self.executor.execute(
                    plan.plan.operation,
                    &plan.plan.context,
                    message,
                    history,
                ),
            )
            .await?
            .map_err(TurnError::ExecutionFailed)?;
        let Some(action) = execution.action.as_ref() else {
            return Err(TurnError::NoAction);
        };

        let matched_content = match action.name.as_str() {
            COMPLETE_TODO | UPDATE_TODO => plan.matched_content(),
            _ => None,
        };

        let outcome = self.dispatcher.dispatch(action, agent_type).await;

        let evaluation = match self
            .bounded(
                "evaluator",
                self.evaluator
                    .evaluate(message, &execution.explanation, history),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = &evaluation {
            tracing::warn!("Evaluation failed, using raw explanation: {}", e);
        }

        let reply = assemble(&TurnArtifacts {
            agent_type,
            plan: &plan,
            action,
            explanation: &execution.explanation,
            outcome: &outcome,
            evaluation: &evaluation,
            matched_content,
        });

        // 本轮用量只来自各协作者结果自带的 usage
        let mut usage = plan.usage;
        usage.add(&execution.usage);
        if let Ok(eval) = &evaluation {
            usage.add(&eval.usage);
        }

        let stats = TurnStats {
            response_time_ms: started.elapsed().as_millis() as u64,
            success: outcome.is_success(),
            todo_success_count: outcome.success_count,
            todo_fail_count: outcome.fail_count,
            token_usage: usage.non_zero(),
        };
        self.recorder.record(agent_type, message, &reply, stats).await;

        Ok(reply)
    }

    async fn bounded<T, F>(&self, stage: &'static str, fut: F) -> Result<Result<T, String>, TurnError>
    where
        F: Future<Output = Result<T, String>>,
    {
        timeout(self.settings.stage_timeout, fut)
            .await
            .map_err(|_| TurnError::Timeout { stage })
    }
}
