//! 默认提示词；可由配置中的文件路径覆盖

use std::path::Path;

pub const DEFAULT_PLANNER_PROMPT: &str = r#"You plan operations on a todo list.
Read the user's latest message and decide which single operation it asks for.
Operations: create, update, complete, delete, list.
If the message refers to an existing todo, copy it into "matchedTask" with its id and content.
Reply with JSON only:
{"intent": "<short description>", "operation": "<operation>", "complexity": "simple|moderate|complex", "requiredTools": ["<action name>"], "matchedTask": {"id": "...", "content": "..."}, "context": {}}
If the request cannot be mapped to an operation, reply {"error": "<reason>"}."#;

pub const DEFAULT_EXECUTOR_PROMPT: &str = r#"You turn a planned todo operation into one concrete action.
Operation: {operation}
Plan context: {context}
Available actions and their argument schemas:
{schema}
Reply with JSON only:
{"action": {"name": "<action name>", "arguments": {...}}, "explanation": "<one or two sentences for the user>"}
If no action is possible, reply {"action": null, "explanation": "<why>"}."#;

pub const DEFAULT_EVALUATOR_PROMPT: &str = r#"The user wrote: {message}
The assistant drafted this reply: {explanation}
Rewrite the reply so it is clear, friendly and accurate, and score the draft from 0 to 1.
Reply with JSON only:
{"finalResponse": "<reply>", "evaluation": {"score": <0-1>, "feedback": "<short note>"}}"#;

/// 读取提示词文件；未配置或读取失败时用默认值
pub fn load_prompt(path: Option<&Path>, default: &str) -> String {
    match path {
        Some(p) => std::fs::read_to_string(p).unwrap_or_else(|e| {
            tracing::warn!("Failed to read prompt {:?} ({}), using default", p, e);
            default.to_string()
        }),
        None => default.to_string(),
    }
}
