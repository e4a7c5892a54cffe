use std::fmt;

use taskwatch_model::{TaskId, TaskType};

/// What a consumer is interested in: one task, or every task of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Task(TaskId),
    Type(TaskType),
}

impl WatchTarget {
    pub fn task(task_id: impl Into<TaskId>) -> Self {
        WatchTarget::Task(task_id.into())
    }

    pub fn of_type(task_type: impl Into<TaskType>) -> Self {
        WatchTarget::Type(task_type.into())
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Task(task_id) => write!(f, "task {}", task_id),
            WatchTarget::Type(task_type) => write!(f, "type {}", task_type),
        }
    }
}
