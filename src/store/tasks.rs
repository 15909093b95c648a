use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::model::{
    NewSubtask, NewTask, Subtask, SubtaskPatch, Task, TaskPatch, TaskStatus, clean_title,
    now_rfc3339,
};

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, due_date, \
     total_estimated_time, created_at, updated_at, completed_at";

const SUBTASK_COLUMNS: &str = "id, task_id, title, description, link, status, estimated_time, \
     depends_on, position, created_at, updated_at, completed_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: TaskStatus = row.get::<_, String>("status")?.parse().unwrap_or_default();
    let due_date: Option<String> = row.get("due_date")?;
    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        completed: status == TaskStatus::Completed,
        priority: row.get::<_, String>("priority")?.parse().unwrap_or_default(),
        due_date: due_date.and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
        total_estimated_time: row.get("total_estimated_time")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        subtasks: Vec::new(),
    })
}

fn subtask_from_row(row: &Row<'_>) -> rusqlite::Result<Subtask> {
    let depends_on: String = row.get("depends_on")?;
    Ok(Subtask {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        link: row.get("link")?,
        status: row.get::<_, String>("status")?.parse().unwrap_or_default(),
        estimated_time: row.get("estimated_time")?,
        depends_on: serde_json::from_str(&depends_on).unwrap_or_default(),
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

/// `completed_at` after moving from `current` to `next`.
fn completion_stamp(
    current: TaskStatus,
    completed_at: Option<String>,
    next: TaskStatus,
    now: &str,
) -> Option<String> {
    match (current == TaskStatus::Completed, next == TaskStatus::Completed) {
        (false, true) => Some(now.to_string()),
        (true, true) => completed_at,
        (_, false) => None,
    }
}

fn fetch_task(conn: &Connection, id: &str) -> Result<Option<Task>, StoreError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], task_from_row).optional()?)
}

fn load_subtasks(conn: &Connection, task_id: &str) -> Result<Vec<Subtask>, StoreError> {
    let sql = format!(
        "SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE task_id = ?1 ORDER BY position, created_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([task_id], subtask_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn next_position(conn: &Connection, task_id: &str) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM subtasks WHERE task_id = ?1",
        [task_id],
        |r| r.get(0),
    )?)
}

fn insert_subtask(
    conn: &Connection,
    id: String,
    task_id: &str,
    position: i64,
    new: &NewSubtask,
    status: TaskStatus,
    now: &str,
) -> Result<Subtask, StoreError> {
    let title = clean_title(&new.title)
        .ok_or_else(|| StoreError::Invalid("Subtask title is required".into()))?;
    let completed_at = (status == TaskStatus::Completed).then(|| now.to_string());
    let depends_on = serde_json::to_string(&new.depends_on)
        .map_err(|e| StoreError::Invalid(format!("depends_on: {e}")))?;

    conn.execute(
        "INSERT INTO subtasks (id, task_id, title, description, link, status, estimated_time,
                               depends_on, position, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            task_id,
            title,
            new.description,
            new.link,
            status.as_str(),
            new.estimated_time,
            depends_on,
            position,
            now,
            completed_at,
        ],
    )?;

    Ok(Subtask {
        id,
        task_id: task_id.to_string(),
        title,
        description: new.description.clone(),
        link: new.link.clone(),
        status,
        estimated_time: new.estimated_time.clone(),
        depends_on: new.depends_on.clone(),
        position,
        created_at: now.to_string(),
        updated_at: None,
        completed_at,
    })
}

impl Store {
    pub fn create_task(&self, user_id: &str, new: NewTask) -> Result<Task, StoreError> {
        let title =
            clean_title(&new.title).ok_or_else(|| StoreError::Invalid("Title is required".into()))?;
        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            description: new.description,
            status: TaskStatus::Pending,
            completed: false,
            priority: new.priority,
            due_date: new.due_date,
            total_estimated_time: new.total_estimated_time,
            created_at: now_rfc3339(),
            updated_at: None,
            completed_at: None,
            subtasks: Vec::new(),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks (id, user_id, title, description, status, priority, due_date,
                                total_estimated_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                task.total_estimated_time,
                task.created_at,
            ],
        )?;
        Ok(task)
    }

    /// All tasks of `user_id`, newest first, each with its subtasks.
    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut tasks = stmt
            .query_map([user_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT s.id, s.task_id, s.title, s.description, s.link, s.status, s.estimated_time,
                    s.depends_on, s.position, s.created_at, s.updated_at, s.completed_at
             FROM subtasks s JOIN tasks t ON t.id = s.task_id
             WHERE t.user_id = ?1
             ORDER BY s.position, s.created_at",
        )?;
        let mut by_task: HashMap<String, Vec<Subtask>> = HashMap::new();
        for sub in stmt.query_map([user_id], subtask_from_row)? {
            let sub = sub?;
            by_task.entry(sub.task_id.clone()).or_default().push(sub);
        }
        for task in &mut tasks {
            task.subtasks = by_task.remove(&task.id).unwrap_or_default();
        }
        Ok(tasks)
    }

    pub fn task_by_id(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        let Some(mut task) = fetch_task(&conn, id)? else {
            return Ok(None);
        };
        task.subtasks = load_subtasks(&conn, id)?;
        Ok(Some(task))
    }

    /// Owner of a task, or `None` if the task does not exist.
    pub fn task_owner(&self, id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row("SELECT user_id FROM tasks WHERE id = ?1", [id], |r| r.get(0))
            .optional()?)
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut task) = fetch_task(&tx, id)? else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            task.title =
                clean_title(&title).ok_or_else(|| StoreError::Invalid("Title is required".into()))?;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }

        let now = now_rfc3339();
        if let Some(status) = patch.status {
            task.completed_at = completion_stamp(task.status, task.completed_at.take(), status, &now);
            task.status = status;
            task.completed = task.is_completed();
        }
        task.updated_at = Some(now);

        tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, due_date = ?4,
                              status = ?5, updated_at = ?6, completed_at = ?7
             WHERE id = ?8",
            params![
                task.title,
                task.description,
                task.priority.as_str(),
                task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                task.status.as_str(),
                task.updated_at,
                task.completed_at,
                id,
            ],
        )?;
        task.subtasks = load_subtasks(&tx, id)?;
        tx.commit()?;
        Ok(Some(task))
    }

    pub fn set_estimated_time(&self, id: &str, estimate: Option<&str>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE tasks SET total_estimated_time = ?1 WHERE id = ?2",
            params![estimate, id],
        )?;
        Ok(())
    }

    /// Delete a task and its subtasks.  Returns `false` if nothing was deleted.
    pub fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM subtasks WHERE task_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Flip a task between completed and pending, applying the same state to
    /// every subtask.
    pub fn toggle_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut task) = fetch_task(&tx, id)? else {
            return Ok(None);
        };

        let now = now_rfc3339();
        let next = TaskStatus::from_completed(!task.is_completed());
        task.completed_at = completion_stamp(task.status, task.completed_at.take(), next, &now);
        task.status = next;
        task.completed = task.is_completed();
        task.updated_at = Some(now.clone());

        tx.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2, completed_at = ?3 WHERE id = ?4",
            params![task.status.as_str(), task.updated_at, task.completed_at, id],
        )?;
        tx.execute(
            "UPDATE subtasks
             SET status = ?1,
                 updated_at = ?2,
                 completed_at = CASE WHEN ?1 = 'completed' THEN COALESCE(completed_at, ?2) ELSE NULL END
             WHERE task_id = ?3",
            params![next.as_str(), now, id],
        )?;
        task.subtasks = load_subtasks(&tx, id)?;
        tx.commit()?;
        Ok(Some(task))
    }

    /// Insert or overwrite `tasks` for `user_id`, replacing each task's
    /// subtasks wholesale.  Tasks whose id belongs to another user are
    /// skipped.  Returns the number of tasks written.
    pub fn upsert_tasks(&self, user_id: &str, tasks: &[Task]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        let mut written = 0;

        for task in tasks {
            let owner: Option<String> = tx
                .query_row("SELECT user_id FROM tasks WHERE id = ?1", [&task.id], |r| r.get(0))
                .optional()?;
            if owner.as_deref().is_some_and(|o| o != user_id) {
                tracing::warn!(task_id = %task.id, "upsert skipped: task owned by another user");
                continue;
            }
            let title = clean_title(&task.title)
                .ok_or_else(|| StoreError::Invalid("Title is required".into()))?;

            tx.execute(
                "INSERT INTO tasks (id, user_id, title, description, status, priority, due_date,
                                    total_estimated_time, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    status = excluded.status,
                    priority = excluded.priority,
                    due_date = excluded.due_date,
                    total_estimated_time = excluded.total_estimated_time,
                    updated_at = excluded.updated_at,
                    completed_at = excluded.completed_at",
                params![
                    task.id,
                    user_id,
                    title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    task.total_estimated_time,
                    task.created_at,
                    now,
                    task.completed_at,
                ],
            )?;

            tx.execute("DELETE FROM subtasks WHERE task_id = ?1", [&task.id])?;
            for (position, sub) in task.subtasks.iter().enumerate() {
                let taken: Option<i64> = tx
                    .query_row("SELECT 1 FROM subtasks WHERE id = ?1", [&sub.id], |r| r.get(0))
                    .optional()?;
                let id = if sub.id.is_empty() || taken.is_some() {
                    Uuid::new_v4().to_string()
                } else {
                    sub.id.clone()
                };
                let new = NewSubtask {
                    title: sub.title.clone(),
                    description: sub.description.clone(),
                    link: sub.link.clone(),
                    estimated_time: sub.estimated_time.clone(),
                    depends_on: sub.depends_on.clone(),
                };
                insert_subtask(&tx, id, &task.id, position as i64, &new, sub.status, &now)?;
            }
            written += 1;
        }

        tx.commit()?;
        Ok(written)
    }

    // ── subtasks ──────────────────────────────────────────────────────────────

    pub fn create_subtask(&self, task_id: &str, new: NewSubtask) -> Result<Subtask, StoreError> {
        let conn = self.lock()?;
        let position = next_position(&conn, task_id)?;
        insert_subtask(
            &conn,
            Uuid::new_v4().to_string(),
            task_id,
            position,
            &new,
            TaskStatus::Pending,
            &now_rfc3339(),
        )
    }

    /// Append several subtasks in order, all or nothing.
    pub fn insert_subtasks(
        &self,
        task_id: &str,
        subtasks: &[NewSubtask],
    ) -> Result<Vec<Subtask>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let start = next_position(&tx, task_id)?;
        let now = now_rfc3339();
        let mut inserted = Vec::with_capacity(subtasks.len());
        for (offset, new) in subtasks.iter().enumerate() {
            inserted.push(insert_subtask(
                &tx,
                Uuid::new_v4().to_string(),
                task_id,
                start + offset as i64,
                new,
                TaskStatus::Pending,
                &now,
            )?);
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn list_subtasks(&self, task_id: &str) -> Result<Vec<Subtask>, StoreError> {
        let conn = self.lock()?;
        load_subtasks(&conn, task_id)
    }

    /// A subtask, only if it belongs to `task_id`.
    pub fn subtask_in_task(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Option<Subtask>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE id = ?1 AND task_id = ?2");
        Ok(conn.query_row(&sql, [subtask_id, task_id], subtask_from_row).optional()?)
    }

    pub fn update_subtask(
        &self,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> Result<Option<Subtask>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE id = ?1");
        let Some(mut sub) = conn.query_row(&sql, [subtask_id], subtask_from_row).optional()? else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            sub.title = clean_title(&title)
                .ok_or_else(|| StoreError::Invalid("Subtask title is required".into()))?;
        }
        if let Some(link) = patch.link {
            sub.link = Some(link).filter(|l| !l.trim().is_empty());
        }
        let now = now_rfc3339();
        if let Some(status) = patch.status {
            sub.completed_at = completion_stamp(sub.status, sub.completed_at.take(), status, &now);
            sub.status = status;
        }
        sub.updated_at = Some(now);

        conn.execute(
            "UPDATE subtasks SET title = ?1, link = ?2, status = ?3, updated_at = ?4, completed_at = ?5
             WHERE id = ?6",
            params![
                sub.title,
                sub.link,
                sub.status.as_str(),
                sub.updated_at,
                sub.completed_at,
                subtask_id,
            ],
        )?;
        Ok(Some(sub))
    }

    pub fn delete_subtask(&self, subtask_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM subtasks WHERE id = ?1", [subtask_id])? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn store_with_user() -> (Store, String) {
        let store = Store::open_in_memory().unwrap();
        let p = store.create_profile("Ann", "ann@example.com", "h").unwrap();
        (store, p.id)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask { title: title.into(), ..Default::default() }
    }

    fn new_sub(title: &str) -> NewSubtask {
        NewSubtask { title: title.into(), ..Default::default() }
    }

    #[test]
    fn create_and_list_newest_first() {
        let (store, user) = store_with_user();
        let first = store.create_task(&user, new_task("first")).unwrap();
        let second = store.create_task(&user, new_task("second")).unwrap();
        assert_eq!(first.priority, Priority::Medium);
        assert_eq!(first.status, TaskStatus::Pending);

        let tasks = store.list_tasks(&user).unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[test]
    fn blank_title_rejected() {
        let (store, user) = store_with_user();
        assert!(matches!(store.create_task(&user, new_task("  ")), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn subtasks_keep_insertion_order() {
        let (store, user) = store_with_user();
        let task = store.create_task(&user, new_task("cook")).unwrap();
        store.create_subtask(&task.id, new_sub("buy")).unwrap();
        store
            .insert_subtasks(&task.id, &[new_sub("chop"), new_sub("fry")])
            .unwrap();

        let titles: Vec<_> = store
            .list_subtasks(&task.id)
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["buy", "chop", "fry"]);

        let listed = store.list_tasks(&user).unwrap();
        assert_eq!(listed[0].subtasks.len(), 3);
    }

    #[test]
    fn partial_update_and_completion_stamp() {
        let (store, user) = store_with_user();
        let task = store.create_task(&user, new_task("write")).unwrap();

        let updated = store
            .update_task(
                &task.id,
                TaskPatch { status: Some(TaskStatus::Completed), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "write");
        assert!(updated.completed);
        assert!(updated.completed_at.is_some());

        let reopened = store
            .update_task(
                &task.id,
                TaskPatch { status: Some(TaskStatus::InProgress), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        assert!(reopened.completed_at.is_none());
        assert!(store.update_task("missing", TaskPatch::default()).unwrap().is_none());
    }

    #[test]
    fn toggle_cascades_to_subtasks() {
        let (store, user) = store_with_user();
        let task = store.create_task(&user, new_task("clean")).unwrap();
        store.insert_subtasks(&task.id, &[new_sub("a"), new_sub("b")]).unwrap();

        let done = store.toggle_task(&task.id).unwrap().unwrap();
        assert!(done.completed);
        assert!(done.subtasks.iter().all(|s| s.status == TaskStatus::Completed));
        assert!(done.subtasks.iter().all(|s| s.completed_at.is_some()));

        let undone = store.toggle_task(&task.id).unwrap().unwrap();
        assert!(!undone.completed);
        assert!(undone.subtasks.iter().all(|s| s.status == TaskStatus::Pending));
    }

    #[test]
    fn subtask_completion_sets_timestamp_once() {
        let (store, user) = store_with_user();
        let task = store.create_task(&user, new_task("t")).unwrap();
        let sub = store.create_subtask(&task.id, new_sub("s")).unwrap();

        let done = store
            .update_subtask(
                &sub.id,
                SubtaskPatch { status: Some(TaskStatus::Completed), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        let stamp = done.completed_at.clone().unwrap();

        let again = store
            .update_subtask(
                &sub.id,
                SubtaskPatch {
                    title: Some("renamed".into()),
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(again.completed_at.as_deref(), Some(stamp.as_str()));
        assert_eq!(again.title, "renamed");
    }

    #[test]
    fn subtask_lookup_is_scoped_to_task() {
        let (store, user) = store_with_user();
        let a = store.create_task(&user, new_task("a")).unwrap();
        let b = store.create_task(&user, new_task("b")).unwrap();
        let sub = store.create_subtask(&a.id, new_sub("s")).unwrap();
        assert!(store.subtask_in_task(&a.id, &sub.id).unwrap().is_some());
        assert!(store.subtask_in_task(&b.id, &sub.id).unwrap().is_none());
    }

    #[test]
    fn delete_task_removes_subtasks() {
        let (store, user) = store_with_user();
        let task = store.create_task(&user, new_task("t")).unwrap();
        let sub = store.create_subtask(&task.id, new_sub("s")).unwrap();
        assert!(store.delete_task(&task.id).unwrap());
        assert!(!store.delete_task(&task.id).unwrap());
        assert!(store.subtask_in_task(&task.id, &sub.id).unwrap().is_none());
    }

    #[test]
    fn upsert_inserts_and_overwrites_but_skips_foreign_tasks() {
        let (store, user) = store_with_user();
        let other = store.create_profile("Bo", "bo@example.com", "h").unwrap();
        let foreign = store.create_task(&other.id, new_task("theirs")).unwrap();

        let mut mine = store.create_task(&user, new_task("mine")).unwrap();
        mine.title = "mine, edited".into();
        mine.subtasks = vec![Subtask {
            id: "1".into(),
            task_id: mine.id.clone(),
            title: "step".into(),
            description: None,
            link: None,
            status: TaskStatus::Completed,
            estimated_time: Some("10 minutes".into()),
            depends_on: vec![],
            position: 0,
            created_at: now_rfc3339(),
            updated_at: None,
            completed_at: None,
        }];

        let mut hijack = foreign.clone();
        hijack.title = "stolen".into();

        let written = store.upsert_tasks(&user, &[mine.clone(), hijack]).unwrap();
        assert_eq!(written, 1);

        let stored = store.task_by_id(&mine.id).unwrap().unwrap();
        assert_eq!(stored.title, "mine, edited");
        assert_eq!(stored.subtasks.len(), 1);
        assert_eq!(stored.subtasks[0].status, TaskStatus::Completed);

        let untouched = store.task_by_id(&foreign.id).unwrap().unwrap();
        assert_eq!(untouched.title, "theirs");
    }
}
