//! Signed-out task storage for `bubu-ctl`.
//!
//! Everything lives in one JSON file, `~/.bubu-do/tasks.json` by default or
//! `$BUBU_HOME/tasks.json`.  Task ids are short counters ("1", "2", ...) that
//! are easy to type; they are replaced with UUIDs when the tasks are synced.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::NewSubtask;
use crate::sync::{LocalSubtask, LocalTask};

const FILE_NAME: &str = "tasks.json";

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("cannot determine home directory (set BUBU_HOME)")]
    NoHome,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: invalid task file: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tokens and server of a signed-in CLI user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub server: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalFile {
    #[serde(default)]
    pub tasks: Vec<LocalTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl LocalFile {
    fn next_id(&self) -> String {
        let max = self.tasks.iter().filter_map(|t| t.id.parse::<u64>().ok()).max().unwrap_or(0);
        (max + 1).to_string()
    }

    /// Append a task and return it.
    pub fn add(
        &mut self,
        title: &str,
        subtasks: Vec<NewSubtask>,
        total_estimated_time: Option<String>,
        due_date: Option<NaiveDate>,
    ) -> &LocalTask {
        let sub_tasks = subtasks
            .into_iter()
            .enumerate()
            .map(|(i, s)| LocalSubtask {
                id: (i + 1).to_string(),
                title: s.title,
                completed: false,
                depends_on: s.depends_on,
                estimated_time: s.estimated_time,
                link: s.link,
            })
            .collect();
        let task = LocalTask {
            id: self.next_id(),
            title: title.trim().to_string(),
            completed: false,
            sub_tasks,
            total_estimated_time,
            due_date,
        };
        self.tasks.push(task);
        &self.tasks[self.tasks.len() - 1]
    }

    /// Flip a task's completion, carrying its subtasks along.  Returns the
    /// new state, or `None` if no task has that id.
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.completed = !task.completed;
        for sub in &mut task.sub_tasks {
            sub.completed = task.completed;
        }
        Some(task.completed)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }
}

/// Handle on the task file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$BUBU_HOME/tasks.json`, else `~/.bubu-do/tasks.json`.
    pub fn default_location() -> Result<Self, LocalError> {
        let dir = match std::env::var("BUBU_HOME") {
            Ok(h) if !h.is_empty() => crate::config::expand_home(&h),
            _ => dirs::home_dir().ok_or(LocalError::NoHome)?.join(".bubu-do"),
        };
        Ok(Self::new(dir.join(FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; a missing file is an empty one.
    pub fn load(&self) -> Result<LocalFile, LocalError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LocalFile::default()),
            Err(source) => return Err(LocalError::Io { path: self.path.clone(), source }),
        };
        if text.trim().is_empty() {
            return Ok(LocalFile::default());
        }
        serde_json::from_str(&text).map_err(|source| LocalError::Json { path: self.path.clone(), source })
    }

    /// Write through a temp file so a crash never leaves half a file behind.
    pub fn save(&self, file: &LocalFile) -> Result<(), LocalError> {
        let io_err = |source| LocalError::Io { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|source| LocalError::Json { path: self.path.clone(), source })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        // The session holds bearer tokens.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(title: &str) -> NewSubtask {
        NewSubtask { title: title.into(), ..NewSubtask::default() }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("nested/tasks.json"));
        assert_eq!(store.load().unwrap(), LocalFile::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("nested/tasks.json"));
        let mut file = LocalFile::default();
        file.add("Buy milk", vec![sub("Find wallet"), sub("Walk to shop")], Some("~20 min".into()), None);
        file.session = Some(Session {
            server: "http://localhost:5001".into(),
            email: "a@b.c".into(),
            access_token: "acc".into(),
            refresh_token: "ref".into(),
        });
        store.save(&file).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, file);
        assert!(!dir.path().join("nested/tasks.json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(LocalStore::new(&path).load(), Err(LocalError::Json { .. })));
    }

    #[test]
    fn ids_count_up_after_removal() {
        let mut file = LocalFile::default();
        assert_eq!(file.add("a", vec![], None, None).id, "1");
        assert_eq!(file.add("b", vec![], None, None).id, "2");
        assert!(file.remove("1"));
        assert!(!file.remove("1"));
        assert_eq!(file.add("c", vec![], None, None).id, "3");
    }

    #[test]
    fn toggle_cascades_to_subtasks() {
        let mut file = LocalFile::default();
        file.add("Trip", vec![sub("Pack"), sub("Book")], None, None);
        assert_eq!(file.toggle("1"), Some(true));
        assert!(file.tasks[0].sub_tasks.iter().all(|s| s.completed));
        assert_eq!(file.toggle("1"), Some(false));
        assert!(file.tasks[0].sub_tasks.iter().all(|s| !s.completed));
        assert_eq!(file.toggle("9"), None);
    }

    #[test]
    fn clear_keeps_session() {
        let mut file = LocalFile::default();
        file.add("x", vec![], None, None);
        file.session = Some(Session {
            server: "s".into(),
            email: "e".into(),
            access_token: "a".into(),
            refresh_token: "r".into(),
        });
        file.clear_tasks();
        assert!(file.tasks.is_empty());
        assert!(file.session.is_some());
    }
}
