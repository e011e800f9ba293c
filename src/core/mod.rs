//! 核心类型：错误分层与 Token 用量

pub mod error;
pub mod usage;

pub use error::{StoreError, TurnError};
pub use usage::TokenUsage;
