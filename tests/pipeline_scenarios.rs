//! 流水线集成测试：用确定性桩替换协作者与存储，覆盖完整一轮的各条路径

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use todo_agent::agents::{LlmEvaluator, LlmExecutor, LlmPlanner};
use todo_agent::chat::ChatMessage;
use todo_agent::core::{StoreError, TokenUsage, TurnError};
use todo_agent::llm::{Completion, LlmClient, Message, Role};
use todo_agent::pipeline::{
    Action, ActionDispatcher, ActionExecutor, Evaluation, Evaluator, ExecutionResult,
    InteractionRecord, InteractionRecorder, MatchedTask, MetricsSink, Operation, OperationPlan,
    PlanContext, Planner, ToolEventBus, ToolStatus, TurnOrchestrator, TurnRequest, TurnSettings,
};
use todo_agent::store::{Creator, NewTodo, Todo, TodoFilter, TodoStore, TodoUpdate};

// ---- 桩 ----

struct StubPlanner(Result<OperationPlan, String>);

#[async_trait]
impl Planner for StubPlanner {
    async fn plan(&self, _message: &str, _context: &[ChatMessage]) -> Result<OperationPlan, String> {
        self.0.clone()
    }
}

struct SlowPlanner;

#[async_trait]
impl Planner for SlowPlanner {
    async fn plan(&self, _message: &str, _context: &[ChatMessage]) -> Result<OperationPlan, String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err("unreachable".into())
    }
}

struct StubExecutor {
    result: Result<ExecutionResult, String>,
    calls: AtomicUsize,
}

impl StubExecutor {
    fn new(result: Result<ExecutionResult, String>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
        })
    }

    fn action(name: &str, arguments: serde_json::Value, explanation: &str) -> Arc<Self> {
        Self::new(Ok(ExecutionResult {
            action: Some(Action::new(name, arguments)),
            explanation: explanation.to_string(),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl ActionExecutor for StubExecutor {
    async fn execute(
        &self,
        _operation: Operation,
        _plan_context: &PlanContext,
        _message: &str,
        _context: &[ChatMessage],
    ) -> Result<ExecutionResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

struct StubEvaluator(Result<Evaluation, String>);

#[async_trait]
impl Evaluator for StubEvaluator {
    async fn evaluate(
        &self,
        _message: &str,
        _explanation: &str,
        _context: &[ChatMessage],
    ) -> Result<Evaluation, String> {
        self.0.clone()
    }
}

struct SlowEvaluator;

#[async_trait]
impl Evaluator for SlowEvaluator {
    async fn evaluate(
        &self,
        _message: &str,
        _explanation: &str,
        _context: &[ChatMessage],
    ) -> Result<Evaluation, String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Evaluation {
            final_response: "too late".into(),
            ..Default::default()
        })
    }
}

/// 按 system prompt 前缀扮演三个角色的 LLM；每次调用稍作等待并报告 10 + 5 token
struct RoleLlm;

#[async_trait]
impl LlmClient for RoleLlm {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let reply = if system.starts_with("plan") {
            json!({ "intent": "add a todo", "operation": "create" })
        } else if system.starts_with("execute") {
            json!({
                "action": { "name": "createTodo", "arguments": { "content": user } },
                "explanation": "Added."
            })
        } else {
            json!({ "finalResponse": "Done.", "evaluation": { "score": 1 } })
        };
        Ok(Completion::new(reply.to_string(), TokenUsage::new(10, 5)))
    }
}

fn evaluated(text: &str) -> Arc<StubEvaluator> {
    Arc::new(StubEvaluator(Ok(Evaluation {
        final_response: text.to_string(),
        evaluation: Some(json!({ "score": 1 })),
        ..Default::default()
    })))
}

#[derive(Clone, Copy, PartialEq)]
enum StoreMode {
    Normal,
    /// 每次调用先等待 200ms
    Slow,
    DeleteNotFound,
    Panics,
    Fails,
}

/// 记录调用次数的脚本化存储：create 依次产出 t1、t2……
struct ScriptedStore {
    mode: StoreMode,
    calls: AtomicUsize,
    created: Mutex<Vec<Todo>>,
}

impl ScriptedStore {
    fn new(mode: StoreMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            StoreMode::Slow => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
            StoreMode::Panics => panic!("connection pool poisoned"),
            StoreMode::Fails => Err(StoreError::Backend("disk full".into())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TodoStore for ScriptedStore {
    async fn create(&self, new: NewTodo) -> Result<Todo, StoreError> {
        self.enter().await?;
        let mut created = self.created.lock().unwrap();
        let now = Utc::now();
        let todo = Todo {
            id: format!("t{}", created.len() + 1),
            content: new.content,
            completed: false,
            agent_type: new.agent_type,
            created_by: new.created_by,
            priority: new.priority,
            labels: new.labels,
            complexity: new.complexity,
            created_at: now,
            updated_at: now,
        };
        created.push(todo.clone());
        Ok(todo)
    }

    async fn update(&self, update: TodoUpdate) -> Result<Option<Todo>, StoreError> {
        self.enter().await?;
        let mut created = self.created.lock().unwrap();
        let Some(todo) = created.iter_mut().find(|t| t.id == update.id) else {
            return Ok(None);
        };
        if let Some(completed) = update.completed {
            todo.completed = completed;
        }
        if let Some(content) = update.content {
            todo.content = content;
        }
        Ok(Some(todo.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.enter().await?;
        if self.mode == StoreMode::DeleteNotFound {
            return Err(StoreError::Rejected("not found".into()));
        }
        let mut created = self.created.lock().unwrap();
        let before = created.len();
        created.retain(|t| t.id != id);
        Ok(created.len() < before)
    }

    async fn list(&self, filter: TodoFilter) -> Result<Vec<Todo>, StoreError> {
        self.enter().await?;
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        self.enter().await?;
        Ok(self.created.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }
}

#[derive(Default)]
struct CapturingSink {
    records: Mutex<Vec<InteractionRecord>>,
}

#[async_trait]
impl MetricsSink for CapturingSink {
    async fn record(&self, record: InteractionRecord) -> Result<(), String> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl MetricsSink for FailingSink {
    async fn record(&self, _record: InteractionRecord) -> Result<(), String> {
        Err("metrics backend unavailable".into())
    }
}

struct Harness {
    orchestrator: TurnOrchestrator,
    store: Arc<ScriptedStore>,
    executor: Arc<StubExecutor>,
    sink: Arc<CapturingSink>,
}

fn harness(
    planner: Arc<dyn Planner>,
    executor: Arc<StubExecutor>,
    evaluator: Arc<dyn Evaluator>,
    mode: StoreMode,
) -> Harness {
    harness_with_limits(
        planner,
        executor,
        evaluator,
        mode,
        Duration::from_secs(5),
        Duration::from_secs(60),
    )
}

fn harness_with_limits(
    planner: Arc<dyn Planner>,
    executor: Arc<StubExecutor>,
    evaluator: Arc<dyn Evaluator>,
    mode: StoreMode,
    store_timeout: Duration,
    stage_timeout: Duration,
) -> Harness {
    let store = ScriptedStore::new(mode);
    let sink = Arc::new(CapturingSink::default());
    let dispatcher = ActionDispatcher::new(store.clone(), 5).with_timeout(store_timeout);
    let recorder = InteractionRecorder::new(sink.clone(), 5);
    let orchestrator =
        TurnOrchestrator::new(planner, executor.clone(), evaluator, dispatcher, recorder)
            .with_settings(TurnSettings {
                stage_timeout,
                ..Default::default()
            });
    Harness {
        orchestrator,
        store,
        executor,
        sink,
    }
}

fn plan(operation: Operation) -> Arc<StubPlanner> {
    Arc::new(StubPlanner(Ok(OperationPlan::new(
        format!("{} a todo", operation.as_str()),
        operation,
    ))))
}

// ---- 场景 ----

#[tokio::test]
async fn create_records_new_id_without_error() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding buy milk"),
        evaluated("Added \"buy milk\" to your list."),
        StoreMode::Normal,
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();

    assert_eq!(reply.content, "Added \"buy milk\" to your list.");
    let meta = reply.metadata.unwrap();
    assert_eq!(meta.todo_ids, Some(vec!["t1".to_string()]));
    assert!(meta.error.is_none());
    assert_eq!(meta.active_agent, "default");
    let calls = meta.tool_calls.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "createTodo");
    assert_eq!(calls[0].kind, "function");
    assert!(calls[0].error.is_none());

    let records = h.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].todo_success_count, 1);
    assert_eq!(records[0].todo_fail_count, 0);
    assert!(records[0].token_usage.is_none());
}

#[tokio::test]
async fn store_failure_is_folded_into_reply() {
    let h = harness(
        plan(Operation::Delete),
        StubExecutor::action("deleteTodo", json!({ "id": "missing" }), "Removing xyz"),
        evaluated("I couldn't remove that task."),
        StoreMode::DeleteNotFound,
    );

    let reply = h
        .orchestrator
        .run_turn("delete task xyz", "default", &[])
        .await
        .unwrap();

    assert_eq!(reply.content, "I couldn't remove that task.");
    let meta = reply.metadata.unwrap();
    assert_eq!(meta.error.as_deref(), Some("not found"));
    assert_eq!(meta.todo_ids, Some(vec![]));
    assert_eq!(
        meta.tool_calls.unwrap()[0].error.as_deref(),
        Some("not found")
    );

    let records = h.sink.records.lock().unwrap();
    assert!(!records[0].success);
    assert_eq!(records[0].todo_fail_count, 1);
    assert_eq!(records[0].todo_success_count, 0);
}

#[tokio::test]
async fn planner_failure_ends_turn_before_any_side_effect() {
    let h = harness(
        Arc::new(StubPlanner(Err("ambiguous request".into()))),
        StubExecutor::action("createTodo", json!({ "content": "x" }), "x"),
        evaluated("x"),
        StoreMode::Normal,
    );

    let response = h
        .orchestrator
        .handle(TurnRequest {
            message: "do the thing".into(),
            agent_type: None,
            messages: vec![],
        })
        .await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "success": false, "error": "ambiguous request" })
    );
    assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.calls(), 0);
    assert!(h.sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_action_fails_without_store_call() {
    let h = harness(
        plan(Operation::Update),
        StubExecutor::action("archiveTodo", json!({ "id": "t1" }), "Archiving"),
        evaluated("Done."),
        StoreMode::Normal,
    );

    let reply = h
        .orchestrator
        .run_turn("archive the report", "default", &[])
        .await
        .unwrap();

    let meta = reply.metadata.unwrap();
    assert_eq!(meta.error.as_deref(), Some("Unknown action: archiveTodo"));
    assert_eq!(h.store.calls(), 0);
    assert_eq!(h.sink.records.lock().unwrap()[0].todo_fail_count, 1);
}

#[tokio::test]
async fn executor_without_action_is_terminal() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::new(Ok(ExecutionResult {
            action: None,
            explanation: "Nothing to do".into(),
            ..Default::default()
        })),
        evaluated("x"),
        StoreMode::Normal,
    );

    let err = h
        .orchestrator
        .run_turn("add", "default", &[])
        .await
        .unwrap_err();
    assert_eq!(err, TurnError::NoAction);
    assert_eq!(err.to_string(), "No action generated");
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn executor_failure_is_terminal() {
    let h = harness(
        plan(Operation::Delete),
        StubExecutor::new(Err("Could not find a todo matching \"report\"".into())),
        evaluated("x"),
        StoreMode::Normal,
    );

    let response = h
        .orchestrator
        .handle(TurnRequest {
            message: "delete report".into(),
            agent_type: Some("vercel".into()),
            messages: vec![],
        })
        .await;
    assert!(!response.is_success());
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn evaluator_failure_falls_back_to_explanation() {
    let explanation = "  Added *buy milk* (high priority)\n";
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action(
            "createTodo",
            json!({ "content": "buy milk", "priority": "high" }),
            explanation,
        ),
        Arc::new(StubEvaluator(Err("evaluator offline".into()))),
        StoreMode::Normal,
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk urgently", "default", &[])
        .await
        .unwrap();
    assert_eq!(reply.content, explanation);
    let meta = reply.metadata.unwrap();
    assert!(meta.evaluation.is_none());
    assert_eq!(meta.todo_ids, Some(vec!["t1".to_string()]));
}

#[tokio::test]
async fn store_panic_is_contained() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding"),
        evaluated("Tried to add it."),
        StoreMode::Panics,
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    let meta = reply.metadata.unwrap();
    assert!(meta.error.is_some());
    assert_eq!(meta.todo_ids, Some(vec![]));
    assert_eq!(h.sink.records.lock().unwrap()[0].todo_fail_count, 1);
}

#[tokio::test]
async fn backend_error_message_is_surfaced() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding"),
        evaluated("Tried to add it."),
        StoreMode::Fails,
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    assert_eq!(reply.metadata.unwrap().error.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn matched_content_only_for_update_and_complete() {
    let matched = MatchedTask {
        id: Some("t1".into()),
        content: "buy milk".into(),
        confidence: Some(0.9),
    };
    let complete_plan = OperationPlan::new("complete a todo", Operation::Complete).with_match(matched.clone());
    let delete_plan = OperationPlan::new("delete a todo", Operation::Delete).with_match(matched);

    let h = harness(
        Arc::new(StubPlanner(Ok(complete_plan))),
        StubExecutor::action("completeTodo", json!({ "id": "t1" }), "Done"),
        evaluated("Marked as done."),
        StoreMode::Normal,
    );
    let reply = h
        .orchestrator
        .run_turn("finished buying milk", "default", &[])
        .await
        .unwrap();
    let meta = reply.metadata.unwrap();
    assert_eq!(meta.matched_content.as_deref(), Some("buy milk"));
    assert_eq!(meta.matched_task.unwrap().content, "buy milk");

    let h = harness(
        Arc::new(StubPlanner(Ok(delete_plan))),
        StubExecutor::action("deleteTodo", json!({ "id": "t1" }), "Removed"),
        evaluated("Removed."),
        StoreMode::Normal,
    );
    let reply = h
        .orchestrator
        .run_turn("remove milk", "default", &[])
        .await
        .unwrap();
    assert!(reply.metadata.unwrap().matched_content.is_none());
}

#[tokio::test]
async fn recorder_failure_does_not_change_reply() {
    let store = ScriptedStore::new(StoreMode::Normal);
    let orchestrator = TurnOrchestrator::new(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding"),
        evaluated("Added."),
        ActionDispatcher::new(store.clone(), 5),
        InteractionRecorder::new(Arc::new(FailingSink), 5),
    );

    let reply = orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    assert_eq!(reply.content, "Added.");
    assert_eq!(reply.metadata.unwrap().todo_ids, Some(vec!["t1".to_string()]));
}

#[tokio::test]
async fn slow_planner_times_out() {
    let store = ScriptedStore::new(StoreMode::Normal);
    let orchestrator = TurnOrchestrator::new(
        Arc::new(SlowPlanner),
        StubExecutor::action("createTodo", json!({ "content": "x" }), "x"),
        evaluated("x"),
        ActionDispatcher::new(store.clone(), 5),
        InteractionRecorder::new(Arc::new(CapturingSink::default()), 5),
    )
    .with_settings(TurnSettings {
        stage_timeout: Duration::from_millis(50),
        ..Default::default()
    });

    let err = orchestrator
        .run_turn("add x", "default", &[])
        .await
        .unwrap_err();
    assert_eq!(err, TurnError::Timeout { stage: "planner" });
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn dispatch_publishes_pending_then_finished_event() {
    let store = ScriptedStore::new(StoreMode::Normal);
    let events = ToolEventBus::new(16);
    let mut rx = events.subscribe();
    let dispatcher = ActionDispatcher::new(store, 5).with_events(events);

    let outcome = dispatcher
        .dispatch(&Action::new("createTodo", json!({ "content": "buy milk" })), "default")
        .await;
    assert!(outcome.is_success());

    let pending = rx.recv().await.unwrap();
    assert_eq!(pending.status, ToolStatus::Pending);
    assert_eq!(pending.tool, "createTodo");
    let done = rx.recv().await.unwrap();
    assert_eq!(done.id, pending.id);
    assert_eq!(done.status, ToolStatus::Success);
}

#[tokio::test]
async fn created_todos_are_scoped_to_agent() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "ship release" }), "Adding"),
        evaluated("Added."),
        StoreMode::Normal,
    );
    h.orchestrator
        .run_turn("add ship release", "vercel", &[])
        .await
        .unwrap();

    let todos = h
        .store
        .list(TodoFilter {
            agent_type: Some("vercel".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].created_by, Creator::Agent);
    assert!(h
        .store
        .list(TodoFilter {
            agent_type: Some("default".into()),
            ..Default::default()
        })
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn slow_store_call_times_out_but_turn_completes() {
    let h = harness_with_limits(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding"),
        evaluated("Tried to add it."),
        StoreMode::Slow,
        Duration::from_millis(50),
        Duration::from_secs(60),
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    assert_eq!(reply.content, "Tried to add it.");
    let meta = reply.metadata.unwrap();
    assert_eq!(meta.error.as_deref(), Some("Database operation timed out"));
    assert_eq!(meta.todo_ids, Some(vec![]));

    let records = h.sink.records.lock().unwrap();
    assert_eq!(records[0].todo_fail_count, 1);
    assert_eq!(records[0].todo_success_count, 0);
}

#[tokio::test]
async fn slow_evaluator_falls_back_to_explanation() {
    let explanation = "Added \"buy milk\".";
    let h = harness_with_limits(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), explanation),
        Arc::new(SlowEvaluator),
        StoreMode::Normal,
        Duration::from_secs(5),
        Duration::from_millis(50),
    );

    let reply = h
        .orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    assert_eq!(reply.content, explanation);
    let meta = reply.metadata.unwrap();
    assert!(meta.evaluation.is_none());
    assert!(meta.error.is_none());
    assert_eq!(meta.todo_ids, Some(vec!["t1".to_string()]));
}

#[tokio::test]
async fn response_time_covers_the_whole_turn() {
    let h = harness(
        plan(Operation::Create),
        StubExecutor::action("createTodo", json!({ "content": "buy milk" }), "Adding"),
        evaluated("Added."),
        StoreMode::Slow,
    );

    h.orchestrator
        .run_turn("add buy milk", "default", &[])
        .await
        .unwrap();
    let records = h.sink.records.lock().unwrap();
    assert!(records[0].success);
    assert!(
        records[0].response_time_ms >= 200,
        "response_time_ms = {}",
        records[0].response_time_ms
    );
}

#[tokio::test]
async fn concurrent_turns_report_their_own_token_usage() {
    let llm: Arc<dyn LlmClient> = Arc::new(RoleLlm);
    let store = ScriptedStore::new(StoreMode::Normal);
    let sink = Arc::new(CapturingSink::default());
    let orchestrator = TurnOrchestrator::new(
        Arc::new(LlmPlanner::new(llm.clone(), "plan")),
        Arc::new(LlmExecutor::new(llm.clone(), "execute {operation}")),
        Arc::new(LlmEvaluator::new(llm, "evaluate {explanation}")),
        ActionDispatcher::new(store.clone(), 5),
        InteractionRecorder::new(sink.clone(), 5),
    );

    let (first, second) = tokio::join!(
        orchestrator.run_turn("buy milk", "default", &[]),
        orchestrator.run_turn("walk dog", "default", &[]),
    );
    assert_eq!(first.unwrap().content, "Done.");
    assert_eq!(second.unwrap().content, "Done.");

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    for record in records.iter() {
        assert_eq!(record.token_usage, Some(TokenUsage::new(30, 15)));
    }
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn stub_collaborators_report_no_token_usage() {
    let h = harness(
        plan(Operation::List),
        StubExecutor::action("listTodos", json!({}), "Here are your todos."),
        evaluated("Nothing yet."),
        StoreMode::Normal,
    );
    h.orchestrator
        .run_turn("list my todos", "default", &[])
        .await
        .unwrap();
    assert!(h.sink.records.lock().unwrap()[0].token_usage.is_none());
}
