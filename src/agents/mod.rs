//! 具体协作者：LLM 驱动的 Planner / Executor / Evaluator，以及离线关键词实现

pub mod evaluator;
pub mod json;
pub mod keyword;
pub mod planner;
pub mod prompts;
pub mod worker;

pub use evaluator::LlmEvaluator;
pub use json::{extract_json, parse_json};
pub use keyword::{KeywordExecutor, KeywordPlanner, PassthroughEvaluator};
pub use planner::LlmPlanner;
pub use worker::LlmExecutor;
