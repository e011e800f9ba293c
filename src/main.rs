//! Todo Agent 命令行
//!
//! 入口：初始化日志、按配置组装运行时，然后逐行读取 stdin，每行跑一轮对话并打印回复。
//! `/list` 列出任务，`/quit` 退出。

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use todo_agent::chat::ChatMessage;
use todo_agent::config::load_config_or_default;
use todo_agent::store::TodoFilter;
use todo_agent::{create_agent_components, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config_or_default(std::env::args().nth(1).map(Into::into));
    let agent_type = cfg.app.default_agent.clone();
    let components = create_agent_components(&cfg)
        .await
        .context("Failed to create agent")?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    stdout
        .write_all(b"todo-agent ready. Type a message, /list or /quit.\n> ")
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/list" => {
                let filter = TodoFilter {
                    agent_type: Some(agent_type.clone()),
                    ..Default::default()
                };
                match components.store.list(filter).await {
                    Ok(todos) if todos.is_empty() => stdout.write_all(b"(no todos)\n").await?,
                    Ok(todos) => {
                        for t in todos {
                            let mark = if t.completed { "x" } else { " " };
                            let row = format!("[{}] {}  ({})\n", mark, t.content, t.id);
                            stdout.write_all(row.as_bytes()).await?;
                        }
                    }
                    Err(e) => stdout.write_all(format!("error: {e}\n").as_bytes()).await?,
                }
            }
            message => match components
                .orchestrator
                .run_turn(message, &agent_type, &history)
                .await
            {
                Ok(reply) => {
                    let mut out = format!("{}\n", reply.content);
                    if let Some(meta) = &reply.metadata {
                        if let Some(call) = meta.tool_calls.as_ref().and_then(|c| c.first()) {
                            out.push_str(&format!("  · {} {}\n", call.name, call.arguments));
                        }
                        if let Some(ids) = &meta.todo_ids {
                            out.push_str(&format!("  · todos: {}\n", ids.join(", ")));
                        }
                        if let Some(err) = &meta.error {
                            out.push_str(&format!("  · error: {err}\n"));
                        }
                    }
                    stdout.write_all(out.as_bytes()).await?;
                    history.push(ChatMessage::user(message, agent_type.as_str()));
                    history.push(reply);
                }
                Err(e) => stdout.write_all(format!("error: {e}\n").as_bytes()).await?,
            },
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
