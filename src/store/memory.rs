//! 内存任务存储：RwLock 保护的有序列表，写入后立即可读

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{validate_complexity, validate_content, NewTodo, Todo, TodoFilter, TodoStore, TodoUpdate};
use crate::core::StoreError;

#[derive(Default)]
pub struct InMemoryTodoStore {
    todos: RwLock<Vec<Todo>>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.todos.read().await.len()
    }
}

#[async_trait]
impl TodoStore for InMemoryTodoStore {
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
        self.todos.write().await.push(todo.clone());
        Ok(todo)
    }

    async fn update(&self, update: TodoUpdate) -> Result<Option<Todo>, StoreError> {
        let content = update.content.as_deref().map(validate_content).transpose()?;
        validate_complexity(update.complexity)?;

        let mut todos = self.todos.write().await;
        let Some(todo) = todos.iter_mut().find(|t| t.id == update.id) else {
            return Ok(None);
        };
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
        Ok(Some(todo.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| t.id != id);
        Ok(todos.len() != before)
    }

    async fn list(&self, filter: TodoFilter) -> Result<Vec<Todo>, StoreError> {
        let todos = self.todos.read().await;
        Ok(todos.iter().filter(|t| filter.matches(t)).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        Ok(self.todos.read().await.iter().find(|t| t.id == id).cloned())
    }
}
