//! Response Assembler：由各阶段产物组装助手消息（纯函数）

use crate::chat::{ChatMessage, MessageMetadata, PlanMetadata, ToolCallRecord};
use crate::pipeline::dispatch::DispatchOutcome;
use crate::pipeline::evaluate::Evaluation;
use crate::pipeline::execute::Action;
use crate::pipeline::plan::OperationPlan;

/// 组装最终消息需要的全部输入
pub struct TurnArtifacts<'a> {
    pub agent_type: &'a str,
    pub plan: &'a OperationPlan,
    pub action: &'a Action,
    pub explanation: &'a str,
    pub outcome: &'a DispatchOutcome,
    /// 评估失败时为 Err，回复退回 explanation
    pub evaluation: &'a Result<Evaluation, String>,
    /// 仅 update / complete 动作时提供
    pub matched_content: Option<&'a str>,
}

pub fn assemble(artifacts: &TurnArtifacts<'_>) -> ChatMessage {
    let (content, evaluation) = match artifacts.evaluation {
        Ok(eval) => (eval.final_response.clone(), eval.evaluation.clone()),
        Err(_) => (artifacts.explanation.to_string(), None),
    };

    let tool_call = ToolCallRecord::function(
        &artifacts.action.name,
        &artifacts.action.arguments,
        artifacts.outcome.error.clone(),
    );

    let metadata = MessageMetadata {
        active_agent: artifacts.agent_type.to_string(),
        tool_calls: Some(vec![tool_call]),
        todo_ids: Some(artifacts.outcome.applied_ids.clone()),
        error: artifacts.outcome.error.clone(),
        matched_task: artifacts.plan.matched_task.clone(),
        matched_content: artifacts.matched_content.map(str::to_string),
        plan: Some(PlanMetadata {
            plan: artifacts.plan.plan.clone(),
            intent: artifacts.plan.intent.clone(),
        }),
        evaluation,
    };

    ChatMessage::assistant(content, metadata)
}
