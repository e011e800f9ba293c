//! Action Dispatcher：把 Executor 选出的动作落到任务存储上
//!
//! 动作名先解析为封闭的 TodoAction 枚举（每个变体带类型化参数），再 match 到一次存储调用。
//! 每次分发恰好贡献一次成功或一次失败；存储报错、超时、panic 都在这里转成失败结果，
//! 不会向上传播终止整轮对话。每次调用输出一条 JSON 审计日志，并向事件总线发布 pending / 终态记录。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::StoreError;
use crate::pipeline::events::{ToolEventBus, ToolExecution, ToolStatus};
use crate::pipeline::execute::Action;
use crate::store::{Creator, NewTodo, Priority, TodoFilter, TodoStore, TodoUpdate};

pub const CREATE_TODO: &str = "createTodo";
pub const UPDATE_TODO: &str = "updateTodo";
pub const COMPLETE_TODO: &str = "completeTodo";
pub const DELETE_TODO: &str = "deleteTodo";
pub const LIST_TODOS: &str = "listTodos";

#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateArgs {
    pub content: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// 1..=10
    #[serde(default)]
    pub complexity: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArgs {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub complexity: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteArgs {
    pub id: String,
    /// 省略时视为 true
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DeleteArgs {
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListArgs {
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// 可分发的动作（封闭集合，未知动作名落入 Unknown）
#[derive(Clone, Debug, PartialEq)]
pub enum TodoAction {
    Create(CreateArgs),
    Update(UpdateArgs),
    Complete(CompleteArgs),
    Delete(DeleteArgs),
    List(ListArgs),
    Unknown(String),
}

fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|e| e.to_string())
}

impl TodoAction {
    /// 解析动作名与参数；参数不合法时返回 Err(原因)
    pub fn parse(action: &Action) -> Result<Self, String> {
        let args = &action.arguments;
        Ok(match action.name.as_str() {
            CREATE_TODO => TodoAction::Create(parse_args(args)?),
            UPDATE_TODO => TodoAction::Update(parse_args(args)?),
            COMPLETE_TODO => TodoAction::Complete(parse_args(args)?),
            DELETE_TODO => TodoAction::Delete(parse_args(args)?),
            LIST_TODOS => TodoAction::List(parse_args(args)?),
            other => TodoAction::Unknown(other.to_string()),
        })
    }
}

/// 动作参数的 JSON Schema（供 LLM Executor 生成正确的参数）
pub fn action_schema_json() -> Value {
    serde_json::json!({
        CREATE_TODO: schemars::schema_for!(CreateArgs),
        UPDATE_TODO: schemars::schema_for!(UpdateArgs),
        COMPLETE_TODO: schemars::schema_for!(CompleteArgs),
        DELETE_TODO: schemars::schema_for!(DeleteArgs),
        LIST_TODOS: schemars::schema_for!(ListArgs),
    })
}

/// 单次分发的累计结果：success_count + fail_count 等于尝试的子操作数
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub applied_ids: Vec<String>,
    pub success_count: u32,
    pub fail_count: u32,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn applied(mut self, ids: Vec<String>) -> Self {
        self.applied_ids.extend(ids);
        self.success_count += 1;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.fail_count += 1;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

const DATABASE_FAILED: &str = "Database operation failed";
const DATABASE_TIMED_OUT: &str = "Database operation timed out";

/// 动作分发器：持有存储与单次调用超时，可选事件总线
pub struct ActionDispatcher {
    store: Arc<dyn TodoStore>,
    timeout: Duration,
    events: Option<ToolEventBus>,
}

impl ActionDispatcher {
    pub fn new(store: Arc<dyn TodoStore>, timeout_secs: u64) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(timeout_secs),
            events: None,
        }
    }

    /// 覆盖单次存储调用的时间上限
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: ToolEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn TodoStore> {
        &self.store
    }

    /// 分发一个动作；永远返回结果，不返回错误
    pub async fn dispatch(&self, action: &Action, agent_type: &str) -> DispatchOutcome {
        let start = Instant::now();
        let pending = ToolExecution::pending(&action.name, action.arguments.clone());
        if let Some(bus) = &self.events {
            bus.publish(pending.clone());
        }

        let (outcome, label) = match TodoAction::parse(action) {
            Ok(TodoAction::Unknown(name)) => (
                DispatchOutcome::default().failed(format!("Unknown action: {name}")),
                "unknown",
            ),
            Err(reason) => (
                DispatchOutcome::default()
                    .failed(format!("Invalid arguments for {}: {}", action.name, reason)),
                "invalid",
            ),
            Ok(todo_action) => self.apply_guarded(todo_action, agent_type).await,
        };

        let audit = serde_json::json!({
            "event": "todo_audit",
            "action": action.name,
            "agent": agent_type,
            "ok": outcome.is_success(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&action.arguments),
        });
        tracing::info!(audit = %audit, "dispatch");
        if let Some(err) = &outcome.error {
            tracing::warn!("Dispatch of {} failed: {}", action.name, err);
        }

        if let Some(bus) = &self.events {
            let finished = match &outcome.error {
                None => pending.finish(
                    ToolStatus::Success,
                    serde_json::json!({ "todoIds": outcome.applied_ids }),
                ),
                Some(err) => pending.finish(ToolStatus::Error, serde_json::json!({ "error": err })),
            };
            bus.publish(finished);
        }

        outcome
    }

    /// 对存储调用加超时与 panic 兜底
    async fn apply_guarded(&self, action: TodoAction, agent_type: &str) -> (DispatchOutcome, &'static str) {
        let guarded = AssertUnwindSafe(self.apply(action, agent_type)).catch_unwind();
        match timeout(self.timeout, guarded).await {
            Ok(Ok(outcome)) => {
                let label = if outcome.is_success() { "ok" } else { "error" };
                (outcome, label)
            }
            Ok(Err(panic)) => {
                tracing::error!("Store panicked during dispatch");
                (DispatchOutcome::default().failed(panic_message(panic)), "panic")
            }
            Err(_) => (DispatchOutcome::default().failed(DATABASE_TIMED_OUT), "timeout"),
        }
    }

    async fn apply(&self, action: TodoAction, agent_type: &str) -> DispatchOutcome {
        let outcome = DispatchOutcome::default();
        match action {
            TodoAction::Create(args) => {
                let new = NewTodo {
                    content: args.content,
                    agent_type: agent_type.to_string(),
                    created_by: Creator::Agent,
                    priority: args.priority,
                    labels: args.labels.unwrap_or_default(),
                    complexity: args.complexity,
                };
                match self.store.create(new).await {
                    Ok(todo) => outcome.applied(vec![todo.id]),
                    Err(StoreError::Backend(msg)) => outcome.failed(fault_message(msg)),
                    Err(e) => {
                        tracing::debug!("create rejected: {}", e);
                        outcome.failed("Failed to create todo")
                    }
                }
            }
            TodoAction::Update(args) => {
                let update = TodoUpdate {
                    id: args.id,
                    content: args.content,
                    completed: args.completed,
                    priority: args.priority,
                    labels: args.labels,
                    complexity: args.complexity,
                };
                match self.store.update(update).await {
                    Ok(Some(todo)) => outcome.applied(vec![todo.id]),
                    Ok(None) => outcome.failed("Failed to update todo"),
                    Err(e) => outcome.failed(fault_message(e.to_string())),
                }
            }
            TodoAction::Complete(args) => {
                let update = TodoUpdate::completion(args.id, args.completed.unwrap_or(true));
                match self.store.update(update).await {
                    Ok(Some(todo)) => outcome.applied(vec![todo.id]),
                    Ok(None) => outcome.failed("Failed to update todo completion status"),
                    Err(e) => outcome.failed(fault_message(e.to_string())),
                }
            }
            TodoAction::Delete(args) => match self.store.delete(&args.id).await {
                Ok(true) => outcome.applied(vec![args.id]),
                Ok(false) => outcome.failed("Failed to delete todo"),
                Err(e) => outcome.failed(fault_message(e.to_string())),
            },
            TodoAction::List(args) => {
                let filter = TodoFilter {
                    agent_type: Some(agent_type.to_string()),
                    completed: args.completed,
                    priority: args.priority,
                    labels: args.labels.unwrap_or_default(),
                };
                match self.store.list(filter).await {
                    Ok(todos) => outcome.applied(todos.into_iter().map(|t| t.id).collect()),
                    Err(StoreError::Backend(msg)) => outcome.failed(fault_message(msg)),
                    Err(e) => {
                        tracing::debug!("list rejected: {}", e);
                        outcome.failed("Failed to list todos")
                    }
                }
            }
            TodoAction::Unknown(name) => outcome.failed(format!("Unknown action: {name}")),
        }
    }
}

/// 空错误信息退回通用提示，保证失败时 error 非空
fn fault_message(msg: String) -> String {
    if msg.trim().is_empty() {
        DATABASE_FAILED.to_string()
    } else {
        msg
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        fault_message(s.to_string())
    } else if let Some(s) = panic.downcast_ref::<String>() {
        fault_message(s.clone())
    } else {
        DATABASE_FAILED.to_string()
    }
}

const PREVIEW_CHARS: usize = 200;

/// 按字符截断，保证多字节文本不会被切坏
fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    match s.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s,
    }
}
