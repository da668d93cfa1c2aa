//! Local task list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::api::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(uuid::Uuid::new_v4().to_string()),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Tasks the user is tracking in this console
#[derive(Debug, Default)]
pub struct TasksStore {
    tasks: Vec<Task>,
    current: Option<RecordId>,
    error: Option<String>,
}

impl TasksStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn add(&mut self, task: Task) -> &Task {
        self.error = None;
        self.tasks.push(task);
        &self.tasks[self.tasks.len() - 1]
    }

    /// Replace the task with the same id
    pub fn update(&mut self, task: Task) -> Result<(), StoreError> {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                *slot = task;
                self.error = None;
                Ok(())
            }
            None => self.fail(StoreError::NotFound("Task", task.id.to_string())),
        }
    }

    pub fn remove(&mut self, id: &RecordId) -> Result<Task, StoreError> {
        match self.tasks.iter().position(|t| &t.id == id) {
            Some(index) => {
                if self.current.as_ref() == Some(id) {
                    self.current = None;
                }
                self.error = None;
                Ok(self.tasks.remove(index))
            }
            None => Err(self.record(StoreError::NotFound("Task", id.to_string()))),
        }
    }

    pub fn mark_executing(&mut self, id: &RecordId) -> Result<(), StoreError> {
        self.set_status(id, TaskStatus::Executing)
    }

    pub fn set_status(&mut self, id: &RecordId, status: TaskStatus) -> Result<(), StoreError> {
        match self.tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                task.status = status;
                self.error = None;
                Ok(())
            }
            None => self.fail(StoreError::NotFound("Task", id.to_string())),
        }
    }

    pub fn set_current(&mut self, id: Option<RecordId>) {
        self.current = id;
    }

    pub fn current_task(&self) -> Option<&Task> {
        let id = self.current.as_ref()?;
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.with_status(|s| s == TaskStatus::Completed)
    }

    pub fn active_tasks(&self) -> Vec<&Task> {
        self.with_status(|s| s == TaskStatus::Active)
    }

    /// Finished tasks, successful or not
    pub fn task_history(&self) -> Vec<&Task> {
        self.with_status(|s| matches!(s, TaskStatus::Completed | TaskStatus::Failed))
    }

    fn with_status(&self, keep: impl Fn(TaskStatus) -> bool) -> Vec<&Task> {
        self.tasks.iter().filter(|t| keep(t.status)).collect()
    }

    fn record(&mut self, err: StoreError) -> StoreError {
        self.error = Some(err.to_string());
        err
    }

    fn fail(&mut self, err: StoreError) -> Result<(), StoreError> {
        Err(self.record(err))
    }
}
