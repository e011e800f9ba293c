//! SQLite 任务存储（sqlx，完全异步）
//!
//! 需要启用 `async-sqlite` feature。labels 以 JSON 文本存储，时间为 RFC3339。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{
    validate_complexity, validate_content, Creator, NewTodo, Priority, Todo, TodoFilter, TodoStore,
    TodoUpdate,
};
use crate::core::StoreError;

pub struct SqliteTodoStore {
    pool: SqlitePool,
}

impl SqliteTodoStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS todos (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                agent_type TEXT NOT NULL,
                created_by TEXT NOT NULL,
                priority TEXT,
                labels TEXT NOT NULL DEFAULT '[]',
                complexity INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_todos_agent ON todos(agent_type)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("bad timestamp {raw}: {e}")))
}

fn row_to_todo(row: &SqliteRow) -> Result<Todo, StoreError> {
    let labels_raw: String = row.try_get("labels")?;
    let labels: Vec<String> = serde_json::from_str(&labels_raw)
        .map_err(|e| StoreError::Backend(format!("bad labels column: {e}")))?;
    let created_by = match row.try_get::<String, _>("created_by")?.as_str() {
        "user" => Creator::User,
        _ => Creator::Agent,
    };
    let priority = row
        .try_get::<Option<String>, _>("priority")?
        .as_deref()
        .and_then(Priority::parse);
    let complexity = row
        .try_get::<Option<i64>, _>("complexity")?
        .and_then(|c| u8::try_from(c).ok());
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Todo {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        completed: row.try_get::<i64, _>("completed")? != 0,
        agent_type: row.try_get("agent_type")?,
        created_by,
        priority,
        labels,
        complexity,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn labels_json(labels: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(labels).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn create(&self, new: NewTodo) -> Result<Todo, StoreError> {
        let content = validate_content(&new.content)?;
        validate_complexity(new.complexity)?;
        let now = Utc::now();
        let todo = Todo {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            completed: false,
            agent_type: new.agent_type,
            created_by: new.created_by,
            priority: new.priority,
            labels: new.labels,
            complexity: new.complexity,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO todos (id, content, completed, agent_type, created_by, priority, labels, complexity, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&todo.id)
        .bind(&todo.content)
        .bind(&todo.agent_type)
        .bind(todo.created_by.as_str())
        .bind(todo.priority.map(|p| p.as_str()))
        .bind(labels_json(&todo.labels)?)
        .bind(todo.complexity.map(i64::from))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(todo)
    }

    async fn update(&self, update: TodoUpdate) -> Result<Option<Todo>, StoreError> {
        let content = update.content.as_deref().map(validate_content).transpose()?;
        validate_complexity(update.complexity)?;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM todos WHERE id = ?")
            .bind(&update.id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut todo = row_to_todo(&row)?;

        if let Some(content) = content {
            todo.content = content;
        }
        if let Some(completed) = update.completed {
            todo.completed = completed;
        }
        if let Some(priority) = update.priority {
            todo.priority = Some(priority);
        }
        if let Some(labels) = update.labels {
            todo.labels = labels;
        }
        if let Some(complexity) = update.complexity {
            todo.complexity = Some(complexity);
        }
        todo.updated_at = Utc::now();

        sqlx::query(
            "UPDATE todos SET content = ?, completed = ?, priority = ?, labels = ?, complexity = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&todo.content)
        .bind(i64::from(todo.completed))
        .bind(todo.priority.map(|p| p.as_str()))
        .bind(labels_json(&todo.labels)?)
        .bind(todo.complexity.map(i64::from))
        .bind(todo.updated_at.to_rfc3339())
        .bind(&todo.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(todo))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: TodoFilter) -> Result<Vec<Todo>, StoreError> {
        let rows = match &filter.agent_type {
            Some(agent) => {
                sqlx::query("SELECT * FROM todos WHERE agent_type = ? ORDER BY created_at, rowid")
                    .bind(agent)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM todos ORDER BY created_at, rowid")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut todos = Vec::with_capacity(rows.len());
        for row in &rows {
            let todo = row_to_todo(row)?;
            if filter.matches(&todo) {
                todos.push(todo);
            }
        }
        Ok(todos)
    }

    async fn get(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        let row = sqlx::query("SELECT * FROM todos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_todo).transpose()
    }
}
