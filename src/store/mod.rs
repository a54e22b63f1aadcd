//! Project document storage with SQLite
//!
//! Every write replaces the whole document. Plain `update` is last-write-wins;
//! `update_if_unchanged` compares the stored revision first for callers that
//! can race on the same project.

mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Error, Result};
use crate::project::Project;

pub use schema::SCHEMA;

pub struct ProjectStore {
    conn: Mutex<Connection>,
}

/// A loaded project and the revision it was read at
#[derive(Debug, Clone)]
pub struct StoredProject {
    pub project: Project,
    pub revision: String,
}

impl ProjectStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // WRITES
    // ============================================

    /// Insert a new project, returning its revision
    pub fn create(&self, project: &Project) -> Result<String> {
        let document = serde_json::to_string(project)?;
        let revision = revision_of(&document);
        self.conn().execute(
            "INSERT INTO projects (id, title, stage, created_at, updated_at, revision, document)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                project.id,
                project.title(),
                project.stage().to_string(),
                timestamp(&project.created_at),
                timestamp(&project.updated_at),
                revision,
                document,
            ],
        )?;
        debug!(project = %project.id, "created project");
        Ok(revision)
    }

    /// Replace the stored document. Stamps `updated_at`; last write wins.
    pub fn update(&self, project: &mut Project) -> Result<String> {
        self.write(project, None)
    }

    /// Replace the stored document only if it is still at `expected_revision`.
    pub fn update_if_unchanged(
        &self,
        project: &mut Project,
        expected_revision: &str,
    ) -> Result<String> {
        self.write(project, Some(expected_revision))
    }

    fn write(&self, project: &mut Project, expected_revision: Option<&str>) -> Result<String> {
        project.updated_at = Utc::now();
        let document = serde_json::to_string(project)?;
        let revision = revision_of(&document);

        let conn = self.conn();
        let changed = match expected_revision {
            None => conn.execute(
                "UPDATE projects SET title = ?, stage = ?, updated_at = ?, revision = ?, document = ?
                 WHERE id = ?",
                params![
                    project.title(),
                    project.stage().to_string(),
                    timestamp(&project.updated_at),
                    revision,
                    document,
                    project.id,
                ],
            )?,
            Some(expected) => conn.execute(
                "UPDATE projects SET title = ?, stage = ?, updated_at = ?, revision = ?, document = ?
                 WHERE id = ? AND revision = ?",
                params![
                    project.title(),
                    project.stage().to_string(),
                    timestamp(&project.updated_at),
                    revision,
                    document,
                    project.id,
                    expected,
                ],
            )?,
        };

        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?)",
                params![project.id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                Error::Conflict(project.id.clone())
            } else {
                Error::ProjectNotFound(project.id.clone())
            });
        }

        debug!(project = %project.id, revision = %&revision[..12], "saved project");
        Ok(revision)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?", params![id])?;
        if removed == 0 {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn get(&self, id: &str) -> Result<StoredProject> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT document, revision FROM projects WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (document, revision) = row.ok_or_else(|| Error::ProjectNotFound(id.to_string()))?;
        Ok(StoredProject {
            project: serde_json::from_str(&document)?,
            revision,
        })
    }

    /// Resolve a full id from an id prefix or exact title
    pub fn resolve_id(&self, query: &str) -> Result<String> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM projects
                 WHERE id = ?1 OR id LIKE ?2 OR title = ?1
                 ORDER BY CASE WHEN id = ?1 THEN 0 ELSE 1 END, updated_at DESC
                 LIMIT 1",
                params![query, format!("{}%", query)],
                |row| row.get(0),
            )
            .optional()?;
        id.ok_or_else(|| Error::ProjectNotFound(query.to_string()))
    }

    /// Most recently updated first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<ProjectRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"SELECT id, title, stage, created_at, updated_at
               FROM projects
               ORDER BY updated_at DESC
               LIMIT ?"#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ProjectRow {
                id: row.get(0)?,
                title: row.get(1)?,
                stage: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn revision_of(document: &str) -> String {
    hex::encode(Sha256::digest(document.as_bytes()))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug)]
pub struct ProjectRow {
    pub id: String,
    pub title: String,
    pub stage: String,
    pub created_at: String,
    pub updated_at: String,
}
