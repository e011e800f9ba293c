//! 离线协作者：关键词规划 + 确定性动作构造 + 直通评估
//!
//! 没有配置 API Key 时使用，行为完全确定，也方便本地演示与测试。
//! 目标任务按词重叠度匹配，只给出一个最佳猜测。

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::chat::ChatMessage;
use crate::pipeline::dispatch::{COMPLETE_TODO, CREATE_TODO, DELETE_TODO, LIST_TODOS, UPDATE_TODO};
use crate::pipeline::{
    Action, ActionExecutor, Evaluation, Evaluator, ExecutionResult, MatchedTask, Operation,
    OperationPlan, PlanContext, Planner,
};
use crate::store::{Todo, TodoFilter, TodoStore};

struct Patterns {
    list: Regex,
    complete: Regex,
    delete: Regex,
    update: Regex,
    create: Regex,
    create_prefix: Regex,
    update_target: Regex,
    hashtag: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static regex");
        Patterns {
            list: re(r"(?i)^\s*(list|show|what)\b|\bmy (todos|tasks)\b"),
            complete: re(r"(?i)\b(complete|done|finish|finished|check off|tick off)\b"),
            delete: re(r"(?i)\b(delete|remove|drop|cancel)\b"),
            update: re(r"(?i)\b(update|change|rename|edit)\b"),
            create: re(r"(?i)\b(add|create|new|remember|remind)\b"),
            create_prefix: re(
                r"(?i)^\s*(please\s+)?(add|create|new|remember|remind me)\s+(to\s+)?(a\s+)?(new\s+)?((todo|task)\b\s*(:|to\b)?\s*)?",
            ),
            update_target: re(r"(?i)\s+to\s+(.+)$"),
            hashtag: re(r"#(\w+)"),
        }
    })
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "to", "my", "as", "is", "it", "of", "and", "for", "on", "in", "task",
    "todo", "please", "mark", "that", "this", "i", "me",
];

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 词重叠度最高的任务；没有任何重叠时返回 None
fn best_match<'a>(message: &str, todos: &'a [Todo]) -> Option<(&'a Todo, f32)> {
    let query = words(message);
    let mut best: Option<(&Todo, f32)> = None;
    for todo in todos {
        let content = words(&todo.content);
        if content.is_empty() {
            continue;
        }
        let overlap = content.intersection(&query).count();
        if overlap == 0 {
            continue;
        }
        let score = overlap as f32 / content.len() as f32;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((todo, score));
        }
    }
    best
}

fn detect_operation(message: &str) -> Option<Operation> {
    let p = patterns();
    if p.list.is_match(message) {
        Some(Operation::List)
    } else if p.complete.is_match(message) {
        Some(Operation::Complete)
    } else if p.delete.is_match(message) {
        Some(Operation::Delete)
    } else if p.update.is_match(message) {
        Some(Operation::Update)
    } else if p.create.is_match(message) {
        Some(Operation::Create)
    } else {
        None
    }
}

pub struct KeywordPlanner {
    store: Option<Arc<dyn TodoStore>>,
}

impl KeywordPlanner {
    pub fn new() -> Self {
        Self { store: None }
    }

    pub fn with_store(mut self, store: Arc<dyn TodoStore>) -> Self {
        self.store = Some(store);
        self
    }

    async fn candidates(&self, agent_type: Option<&str>) -> Vec<Todo> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let filter = TodoFilter {
            agent_type: agent_type.map(str::to_string),
            ..Default::default()
        };
        store.list(filter).await.unwrap_or_else(|e| {
            tracing::warn!("Keyword planner could not list todos: {}", e);
            Vec::new()
        })
    }
}

impl Default for KeywordPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn plan(&self, message: &str, context: &[ChatMessage]) -> Result<OperationPlan, String> {
        let operation = detect_operation(message)
            .ok_or_else(|| format!("Could not work out what to do with \"{}\"", message.trim()))?;

        let tool = match operation {
            Operation::Create => CREATE_TODO,
            Operation::Update => UPDATE_TODO,
            Operation::Complete => COMPLETE_TODO,
            Operation::Delete => DELETE_TODO,
            Operation::List => LIST_TODOS,
        };
        let mut plan = OperationPlan::new(format!("{} a todo", operation.as_str()), operation);
        plan.plan.required_tools = vec![tool.to_string()];

        if matches!(
            operation,
            Operation::Update | Operation::Complete | Operation::Delete
        ) {
            // update 只用 " to " 之前的部分匹配
            let subject = match operation {
                Operation::Update => patterns().update_target.replace(message, "").into_owned(),
                _ => message.to_string(),
            };
            let agent_type = context
                .last()
                .and_then(|m| m.metadata.as_ref())
                .map(|m| m.active_agent.as_str());
            let todos = self.candidates(agent_type).await;
            if let Some((todo, score)) = best_match(&subject, &todos) {
                plan = plan.with_match(MatchedTask {
                    id: Some(todo.id.clone()),
                    content: todo.content.clone(),
                    confidence: Some(score),
                });
            }
        }
        Ok(plan)
    }
}

#[derive(Debug, Default)]
pub struct KeywordExecutor;

impl KeywordExecutor {
    fn target(plan_context: &PlanContext, message: &str) -> Result<(String, String), String> {
        plan_context
            .matched_todo
            .as_ref()
            .and_then(|m| m.id.clone().map(|id| (id, m.content.clone())))
            .ok_or_else(|| format!("Could not find a todo matching \"{}\"", message.trim()))
    }
}

#[async_trait]
impl ActionExecutor for KeywordExecutor {
    async fn execute(
        &self,
        operation: Operation,
        plan_context: &PlanContext,
        message: &str,
        _context: &[ChatMessage],
    ) -> Result<ExecutionResult, String> {
        let p = patterns();
        let (action, explanation) = match operation {
            Operation::Create => {
                let stripped = p.create_prefix.replace(message, "");
                let content = p
                    .hashtag
                    .replace_all(&stripped, "")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if content.is_empty() {
                    return Err("What should the todo say?".to_string());
                }
                let mut args = Map::new();
                args.insert("content".into(), json!(content));
                let lower = message.to_lowercase();
                if lower.contains("urgent") || lower.contains("high priority") {
                    args.insert("priority".into(), json!("high"));
                } else if lower.contains("low priority") {
                    args.insert("priority".into(), json!("low"));
                }
                let labels: Vec<String> = p
                    .hashtag
                    .captures_iter(message)
                    .map(|c| c[1].to_lowercase())
                    .collect();
                if !labels.is_empty() {
                    args.insert("labels".into(), json!(labels));
                }
                (
                    Action::new(CREATE_TODO, Value::Object(args)),
                    format!("I've added \"{content}\" to your list."),
                )
            }
            Operation::Complete => {
                let (id, content) = Self::target(plan_context, message)?;
                (
                    Action::new(COMPLETE_TODO, json!({ "id": id, "completed": true })),
                    format!("I've marked \"{content}\" as done."),
                )
            }
            Operation::Delete => {
                let (id, content) = Self::target(plan_context, message)?;
                (
                    Action::new(DELETE_TODO, json!({ "id": id })),
                    format!("I've removed \"{content}\" from your list."),
                )
            }
            Operation::Update => {
                let (id, content) = Self::target(plan_context, message)?;
                let new_content = p
                    .update_target
                    .captures(message)
                    .map(|c| c[1].trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| format!("What should \"{content}\" be changed to?"))?;
                (
                    Action::new(UPDATE_TODO, json!({ "id": id, "content": new_content })),
                    format!("I've changed \"{content}\" to \"{new_content}\"."),
                )
            }
            Operation::List => {
                let lower = message.to_lowercase();
                let args = if lower.contains("completed") || lower.contains("done") {
                    json!({ "completed": true })
                } else if ["open", "pending", "remaining", "incomplete"]
                    .iter()
                    .any(|w| lower.contains(w))
                {
                    json!({ "completed": false })
                } else {
                    json!({})
                };
                (Action::new(LIST_TODOS, args), "Here are your todos.".to_string())
            }
        };
        Ok(ExecutionResult {
            action: Some(action),
            explanation,
            ..Default::default()
        })
    }
}

/// 不改写说明，原样作为最终回复
#[derive(Debug, Default)]
pub struct PassthroughEvaluator;

#[async_trait]
impl Evaluator for PassthroughEvaluator {
    async fn evaluate(
        &self,
        _message: &str,
        explanation: &str,
        _context: &[ChatMessage],
    ) -> Result<Evaluation, String> {
        if explanation.trim().is_empty() {
            return Err("Nothing to evaluate".to_string());
        }
        Ok(Evaluation {
            final_response: explanation.to_string(),
            evaluation: Some(json!({ "method": "passthrough" })),
            ..Default::default()
        })
    }
}
