//! Offline task format and the merge run when a user first signs in.
//!
//! Tasks created while signed out live in the client's own file with
//! client-chosen ids.  On sign-in they are uploaded, and any that the
//! server does not already hold are added to the account.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::{Uuid, Variant};

use crate::model::{Subtask, Task, TaskStatus, now_rfc3339};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSubtask {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "ids")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTask {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub sub_tasks: Vec<LocalSubtask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimated_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
}

// ── Lenient field decoding ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Id {
    Text(String),
    Number(serde_json::Number),
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        match id {
            Id::Text(s) => s,
            Id::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Id::deserialize(d).map(String::from)
}

fn ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let raw: Option<Vec<Id>> = Option::deserialize(d)?;
    Ok(raw.unwrap_or_default().into_iter().map(String::from).collect())
}

/// Accepts `YYYY-MM-DD` or a full timestamp whose first ten characters are one.
fn lenient_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let head = raw.trim().get(..10).unwrap_or(raw.trim());
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid dueDate '{raw}': {e}")))
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// True for the hyphenated textual form of an RFC 4122 UUID, versions 1-5.
pub fn is_valid_uuid(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    match Uuid::try_parse(id) {
        Ok(u) => matches!(u.get_version_num(), 1..=5) && u.get_variant() == Variant::RFC4122,
        Err(_) => false,
    }
}

fn keep_or_fresh(id: &str) -> String {
    if is_valid_uuid(id) { id.to_lowercase() } else { Uuid::new_v4().to_string() }
}

impl LocalTask {
    /// Convert into a server task owned by `user_id`.
    ///
    /// Ids that are not UUIDs are replaced, and subtask dependencies are
    /// rewritten to follow the new ids.
    pub fn into_task(self, user_id: &str) -> Task {
        let task_id = keep_or_fresh(&self.id);
        let now = now_rfc3339();

        let id_map: HashMap<String, String> = self
            .sub_tasks
            .iter()
            .map(|s| (s.id.clone(), keep_or_fresh(&s.id)))
            .collect();

        let subtasks = self
            .sub_tasks
            .into_iter()
            .enumerate()
            .map(|(position, s)| {
                let status = TaskStatus::from_completed(s.completed);
                Subtask {
                    id: id_map.get(&s.id).cloned().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    task_id: task_id.clone(),
                    title: s.title,
                    description: None,
                    link: s.link,
                    status,
                    estimated_time: s.estimated_time,
                    depends_on: s
                        .depends_on
                        .into_iter()
                        .map(|d| id_map.get(&d).cloned().unwrap_or(d))
                        .collect(),
                    position: position as i64,
                    created_at: now.clone(),
                    updated_at: None,
                    completed_at: s.completed.then(|| now.clone()),
                }
            })
            .collect();

        Task {
            id: task_id,
            user_id: user_id.to_string(),
            title: self.title,
            description: None,
            status: TaskStatus::from_completed(self.completed),
            completed: self.completed,
            priority: Default::default(),
            due_date: self.due_date,
            total_estimated_time: self.total_estimated_time.filter(|t| !t.is_empty()),
            created_at: now.clone(),
            updated_at: None,
            completed_at: self.completed.then_some(now),
            subtasks,
        }
    }
}

impl From<&Task> for LocalTask {
    fn from(task: &Task) -> Self {
        LocalTask {
            id: task.id.clone(),
            title: task.title.clone(),
            completed: task.is_completed(),
            sub_tasks: task
                .subtasks
                .iter()
                .map(|s| LocalSubtask {
                    id: s.id.clone(),
                    title: s.title.clone(),
                    completed: s.status == TaskStatus::Completed,
                    depends_on: s.depends_on.clone(),
                    estimated_time: s.estimated_time.clone(),
                    link: s.link.clone(),
                })
                .collect(),
            total_estimated_time: task.total_estimated_time.clone(),
            due_date: task.due_date,
        }
    }
}

/// Local tasks not already present in `cloud`, converted for `user_id`.
///
/// Ids compare case-insensitively, and a repeated id within `local` keeps
/// only its first occurrence.
fn new_local_tasks(cloud: &[Task], local: Vec<LocalTask>, user_id: &str) -> Vec<Task> {
    let mut seen: HashSet<String> = cloud.iter().map(|t| t.id.to_lowercase()).collect();
    local
        .into_iter()
        .filter(|t| seen.insert(t.id.to_lowercase()))
        .map(|t| t.into_task(user_id))
        .collect()
}

/// Cloud tasks followed by the local tasks the cloud does not have yet.
/// Returns the merged list and how many local tasks were added.
pub fn merge(cloud: Vec<Task>, local: Vec<LocalTask>, user_id: &str) -> (Vec<Task>, usize) {
    let fresh = new_local_tasks(&cloud, local, user_id);
    let added = fresh.len();
    let mut merged = cloud;
    merged.extend(fresh);
    (merged, added)
}
