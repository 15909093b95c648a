//! Domain types shared by the store, the API and the breakdown pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Progress state of a task or subtask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn from_completed(completed: bool) -> Self {
        if completed { TaskStatus::Completed } else { TaskStatus::Pending }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// A user's task with its subtasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Mirrors `status == completed` for clients that only track a flag.
    #[serde(default)]
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub total_estimated_time: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub completed_at: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Completed and total subtask counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.status == TaskStatus::Completed).count();
        (done, self.subtasks.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub status: TaskStatus,
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Public part of a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub total_estimated_time: Option<String>,
}

/// Partial task update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
}

/// Fields accepted when creating a subtask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSubtask {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub estimated_time: Option<String>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub link: Option<String>,
    pub status: Option<TaskStatus>,
}

/// Trim a title and reject it when nothing is left.
pub fn clean_title(title: &str) -> Option<String> {
    let t = title.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Current UTC time as RFC 3339 with millisecond precision.
///
/// Millisecond precision keeps `created_at` ordering stable for rows inserted
/// within the same second.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in-progress\"");
        assert_eq!("completed".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn priority_defaults_to_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn clean_title_trims_and_rejects_blank() {
        assert_eq!(clean_title("  buy milk ").as_deref(), Some("buy milk"));
        assert!(clean_title("   ").is_none());
    }

    #[test]
    fn progress_counts_completed() {
        let sub = |status| Subtask {
            id: "s".into(),
            task_id: "t".into(),
            title: "x".into(),
            description: None,
            link: None,
            status,
            estimated_time: None,
            depends_on: vec![],
            position: 0,
            created_at: now_rfc3339(),
            updated_at: None,
            completed_at: None,
        };
        let task = Task {
            id: "t".into(),
            user_id: "u".into(),
            title: "x".into(),
            description: None,
            status: TaskStatus::Pending,
            completed: false,
            priority: Priority::Medium,
            due_date: None,
            total_estimated_time: None,
            created_at: now_rfc3339(),
            updated_at: None,
            completed_at: None,
            subtasks: vec![sub(TaskStatus::Completed), sub(TaskStatus::Pending)],
        };
        assert_eq!(task.progress(), (1, 2));
        assert!(!task.is_completed());
    }
}
