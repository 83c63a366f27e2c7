mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::errors::DprError;
use crate::model::{ProjectSummary, ReportProject};

/// Keyed document store for report progress.
///
/// `save` merges: every section and variable in `project` overwrites the
/// stored value with the same key, other stored keys are kept, and
/// `updated_at` is set to now. Concurrent writers are not coordinated; the
/// last write to a key wins.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, user_id: &str, idea_title: &str) -> Result<Option<ReportProject>, DprError>;
    async fn save(
        &self,
        user_id: &str,
        idea_title: &str,
        project: &ReportProject,
    ) -> Result<DateTime<Utc>, DprError>;
    async fn list(&self, user_id: &str) -> Result<Vec<ProjectSummary>, DprError>;
}

// ============================================================
// SQLite
// ============================================================

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DprError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent).map_err(|e| DprError::Persistence(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_memory() -> Result<Self, DprError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, DprError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::run_migrations(&mut conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` against the connection on tokio's blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DprError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DprError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
            .await
            .map_err(|e| DprError::Persistence(format!("store task failed: {e}")))?
    }
}

fn load_project(
    conn: &Connection,
    user_id: &str,
    idea_title: &str,
) -> Result<Option<ReportProject>, DprError> {
    let updated: Option<String> = conn
        .query_row(
            "SELECT updated_at FROM report_projects WHERE user_id = ? AND idea_title = ?",
            (user_id, idea_title),
            |row| row.get(0),
        )
        .optional()?;
    let Some(updated) = updated else {
        return Ok(None);
    };

    let mut project = ReportProject {
        updated_at: parse_datetime(&updated),
        ..Default::default()
    };

    let mut stmt = conn.prepare(
        "SELECT chapter_title, content FROM report_sections WHERE user_id = ? AND idea_title = ?",
    )?;
    let rows = stmt.query_map((user_id, idea_title), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for r in rows {
        let (title, content) = r?;
        project.sections.insert(title, content);
    }

    let mut stmt = conn.prepare(
        "SELECT var_key, var_value FROM report_variables WHERE user_id = ? AND idea_title = ?",
    )?;
    let rows = stmt.query_map((user_id, idea_title), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for r in rows {
        let (k, v) = r?;
        project.variables.insert(k, v);
    }

    Ok(Some(project))
}

fn save_project(
    conn: &mut Connection,
    user_id: &str,
    idea_title: &str,
    project: &ReportProject,
) -> Result<DateTime<Utc>, DprError> {
    let now = Utc::now();
    let ts = now.to_rfc3339();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO report_projects (user_id, idea_title, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(user_id, idea_title) DO UPDATE SET updated_at = excluded.updated_at",
        (user_id, idea_title, &ts),
    )?;
    for (title, content) in &project.sections {
        tx.execute(
            "INSERT INTO report_sections (user_id, idea_title, chapter_title, content, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, idea_title, chapter_title)
             DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
            (user_id, idea_title, title, content, &ts),
        )?;
    }
    for (k, v) in &project.variables {
        tx.execute(
            "INSERT INTO report_variables (user_id, idea_title, var_key, var_value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, idea_title, var_key) DO UPDATE SET var_value = excluded.var_value",
            (user_id, idea_title, k, v),
        )?;
    }
    tx.commit()?;
    Ok(now)
}

fn list_projects(conn: &Connection, user_id: &str) -> Result<Vec<ProjectSummary>, DprError> {
    let mut stmt = conn.prepare(
        "SELECT p.idea_title, p.updated_at,
                (SELECT COUNT(*) FROM report_sections s
                  WHERE s.user_id = p.user_id AND s.idea_title = p.idea_title
                    AND trim(s.content) <> '')
         FROM report_projects p
         WHERE p.user_id = ?
         ORDER BY p.updated_at DESC",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(ProjectSummary {
            idea_title: row.get(0)?,
            updated_at: parse_datetime(&row.get::<_, String>(1)?),
            drafted_sections: row.get::<_, i64>(2)? as usize,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn load(&self, user_id: &str, idea_title: &str) -> Result<Option<ReportProject>, DprError> {
        let (user_id, idea_title) = (user_id.to_owned(), idea_title.to_owned());
        self.blocking(move |conn| load_project(conn, &user_id, &idea_title))
            .await
    }

    async fn save(
        &self,
        user_id: &str,
        idea_title: &str,
        project: &ReportProject,
    ) -> Result<DateTime<Utc>, DprError> {
        let (user, idea, project) = (user_id.to_owned(), idea_title.to_owned(), project.clone());
        let res = self
            .blocking(move |conn| save_project(conn, &user, &idea, &project))
            .await;
        if let Err(e) = &res {
            tracing::warn!(user_id, idea_title, error = %e, "saving report progress failed");
        }
        res
    }

    async fn list(&self, user_id: &str) -> Result<Vec<ProjectSummary>, DprError> {
        let user_id = user_id.to_owned();
        self.blocking(move |conn| list_projects(conn, &user_id)).await
    }
}

// ============================================================
// In-memory
// ============================================================

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<(String, String), ReportProject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load(&self, user_id: &str, idea_title: &str) -> Result<Option<ReportProject>, DprError> {
        Ok(self
            .docs
            .lock()
            .get(&(user_id.to_string(), idea_title.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        user_id: &str,
        idea_title: &str,
        project: &ReportProject,
    ) -> Result<DateTime<Utc>, DprError> {
        let now = Utc::now();
        let mut docs = self.docs.lock();
        let doc = docs
            .entry((user_id.to_string(), idea_title.to_string()))
            .or_default();
        doc.sections.extend(project.sections.iter().map(|(k, v)| (k.clone(), v.clone())));
        doc.merge_variables(&project.variables);
        doc.updated_at = Some(now);
        Ok(now)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<ProjectSummary>, DprError> {
        let docs = self.docs.lock();
        let mut out: Vec<ProjectSummary> = docs
            .iter()
            .filter(|((u, _), _)| u == user_id)
            .map(|((_, idea), p)| ProjectSummary {
                idea_title: idea.clone(),
                drafted_sections: p.sections.values().filter(|s| !s.trim().is_empty()).count(),
                updated_at: p.updated_at,
            })
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(sections: &[(&str, &str)], vars: &[(&str, &str)]) -> ReportProject {
        ReportProject {
            sections: sections.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            variables: vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            updated_at: None,
        }
    }

    async fn exercise_merge(store: &dyn ProgressStore) {
        assert!(store.load("u1", "Idea").await.unwrap().is_none());

        store
            .save("u1", "Idea", &project(&[("A", "a1")], &[("x", "1")]))
            .await
            .unwrap();
        store
            .save("u1", "Idea", &project(&[("B", "b1")], &[("x", "2"), ("y", "3")]))
            .await
            .unwrap();

        let loaded = store.load("u1", "Idea").await.unwrap().unwrap();
        assert_eq!(loaded.sections.get("A").map(String::as_str), Some("a1"));
        assert_eq!(loaded.sections.get("B").map(String::as_str), Some("b1"));
        assert_eq!(loaded.variables.get("x").map(String::as_str), Some("2"));
        assert_eq!(loaded.variables.get("y").map(String::as_str), Some("3"));
        assert!(loaded.updated_at.is_some());

        assert!(store.load("u2", "Idea").await.unwrap().is_none());
        assert!(store.load("u1", "Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_save_merges_keys() {
        let store = SqliteStore::open_memory().unwrap();
        exercise_merge(&store).await;
    }

    #[tokio::test]
    async fn memory_save_merges_keys() {
        let store = MemoryStore::new();
        exercise_merge(&store).await;
    }

    #[tokio::test]
    async fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save("u1", "Paper Plate Unit", &project(&[("Executive Summary", "ok")], &[]))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let p = store.load("u1", "Paper Plate Unit").await.unwrap().unwrap();
        assert_eq!(p.sections.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sqlite_serves_concurrent_tasks() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let idea = format!("Idea {i}");
                store
                    .save("u1", &idea, &project(&[("A", "a")], &[("n", "1")]))
                    .await
                    .unwrap();
                store.load("u1", &idea).await.unwrap().unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().sections.len(), 1);
        }
        assert_eq!(store.list("u1").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn list_counts_drafted_sections_per_user() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .save("u1", "One", &project(&[("A", "a"), ("B", "  ")], &[]))
            .await
            .unwrap();
        store.save("u1", "Two", &project(&[], &[])).await.unwrap();
        store.save("u2", "Three", &project(&[("A", "a")], &[])).await.unwrap();

        let list = store.list("u1").await.unwrap();
        assert_eq!(list.len(), 2);
        let one = list.iter().find(|s| s.idea_title == "One").unwrap();
        assert_eq!(one.drafted_sections, 1);
        let two = list.iter().find(|s| s.idea_title == "Two").unwrap();
        assert_eq!(two.drafted_sections, 0);
    }
}
