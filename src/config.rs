//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TODO_AGENT__*` 覆盖（双下划线表示嵌套，如 `TODO_AGENT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub pipeline: PipelineSection,
    pub llm: LlmSection,
    pub store: StoreSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、默认 agent、历史条数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 请求未带 agentType 时使用
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// 转发给协作者的历史消息条数
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_agent: default_agent(),
            max_history: default_max_history(),
        }
    }
}

fn default_agent() -> String {
    "default".to_string()
}

fn default_max_history() -> usize {
    20
}

/// [pipeline] 段：各阶段超时（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// planner / executor / evaluator 单次调用上限
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// 单次存储调用上限
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_recorder_timeout_secs")]
    pub recorder_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
            recorder_timeout_secs: default_recorder_timeout_secs(),
        }
    }
}

fn default_stage_timeout_secs() -> u64 {
    60
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_recorder_timeout_secs() -> u64 {
    5
}

/// [llm] 段：后端选择与提示词覆盖
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock；openai 需要 OPENAI_API_KEY，缺失时退回离线关键词协作者
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub planner_prompt: Option<PathBuf>,
    pub executor_prompt: Option<PathBuf>,
    pub evaluator_prompt: Option<PathBuf>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            planner_prompt: None,
            executor_prompt: None,
            evaluator_prompt: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [store] 段：memory / sqlite
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("todos.db")
}

/// [server] 段：监听地址与事件广播容量
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_event_buffer() -> usize {
    256
}

/// 从 config 目录加载配置，环境变量 TODO_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TODO_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TODO_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录 warn 并使用默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
