//! 请求流水线：plan → execute → dispatch → evaluate → assemble → record
//!
//! - **plan / execute / evaluate**: 协作者契约（trait），可注入确定性桩用于测试
//! - **dispatch**: 动作到任务存储的映射与部分失败统计
//! - **assemble**: 组装助手消息
//! - **recorder**: 指标记录（尽力而为）
//! - **events**: 工具执行事件总线
//! - **turn**: 单轮编排

pub mod assemble;
pub mod dispatch;
pub mod evaluate;
pub mod events;
pub mod execute;
pub mod plan;
pub mod recorder;
pub mod turn;

pub use assemble::{assemble, TurnArtifacts};
pub use dispatch::{action_schema_json, ActionDispatcher, DispatchOutcome, TodoAction};
pub use evaluate::{Evaluation, Evaluator};
pub use events::{ToolEventBus, ToolExecution, ToolStatus};
pub use execute::{Action, ActionExecutor, ExecutionResult};
pub use plan::{Complexity, MatchedTask, Operation, OperationPlan, PlanContext, PlanDetails, Planner};
pub use recorder::{
    AgentMetrics, FanoutMetricsSink, InMemoryMetrics, InteractionRecord, InteractionRecorder,
    MetricsSink, TracingMetricsSink, TurnStats,
};
pub use turn::{TurnOrchestrator, TurnRequest, TurnResponse, TurnSettings};
