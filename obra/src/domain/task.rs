//! Task: a unit of work in the Epic / Story / Task / Subtask hierarchy.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Epic,
    Story,
    Task,
    Subtask,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Epic => "epic",
            TaskType::Story => "story",
            TaskType::Task => "task",
            TaskType::Subtask => "subtask",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed,
    Escalated,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Escalated => "escalated",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// `COMPLETED` is terminal except via an explicit reopen operation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Escalated | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub epic_id: Option<String>,
    pub story_id: Option<String>,
    pub parent_task_id: Option<String>,
    pub depends_on: Vec<String>,
    pub retry_count: u32,
    pub breakpoint: bool,
    pub blocked_by_failure_of: Option<String>,
    pub git_commit_error: Option<String>,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(
        project_id: impl Into<String>,
        task_type: TaskType,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: u8,
    ) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id(task_type.as_str(), &title),
            project_id: project_id.into(),
            task_type,
            status: TaskStatus::Pending,
            title,
            description: description.into(),
            priority: priority.clamp(1, 10),
            epic_id: None,
            story_id: None,
            parent_task_id: None,
            depends_on: Vec::new(),
            retry_count: 0,
            breakpoint: false,
            blocked_by_failure_of: None,
            git_commit_error: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Clears retry counter and blocked-by marker; used when a COMPLETED task
    /// is explicitly reopened.
    pub fn reopen(&mut self) {
        self.status = TaskStatus::Pending;
        self.retry_count = 0;
        self.blocked_by_failure_of = None;
        self.touch();
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "tasks"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("project_id".into(), IndexValue::String(self.project_id.clone()));
        m.insert("status".into(), IndexValue::String(self.status.as_str().to_string()));
        m.insert("task_type".into(), IndexValue::String(self.task_type.as_str().to_string()));
        if let Some(epic_id) = &self.epic_id {
            m.insert("epic_id".into(), IndexValue::String(epic_id.clone()));
        }
        if let Some(story_id) = &self.story_id {
            m.insert("story_id".into(), IndexValue::String(story_id.clone()));
        }
        m.insert("deleted".into(), IndexValue::Bool(self.deleted));
        m
    }
}
