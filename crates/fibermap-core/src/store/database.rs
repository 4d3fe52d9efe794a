//! Project persistence.
//!
//! [`ProjectStore`] is the seam the project operations are written against.
//! [`SqliteProjectStore`] keeps one row per project with the whole document
//! as JSON; [`MemoryProjectStore`] backs tests and short-lived sessions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::errors::{FiberError, FiberResult};
use crate::store::document::ProjectDocument;
use crate::store::schema;

pub trait ProjectStore {
    /// Insert a new project. Fails when the id or the name is taken.
    fn create(&self, doc: &ProjectDocument) -> FiberResult<()>;
    fn get(&self, id: &str) -> FiberResult<Option<ProjectDocument>>;
    /// Replace an existing project.
    fn put(&self, doc: &ProjectDocument) -> FiberResult<()>;
    /// Returns false when nothing was deleted.
    fn delete(&self, id: &str) -> FiberResult<bool>;
    /// All projects, most recently updated first.
    fn list(&self) -> FiberResult<Vec<ProjectDocument>>;
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text == "~" || text.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if text.len() > 2 {
                expanded.push(&text[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn resolve(path: &Path) -> FiberResult<PathBuf> {
    let expanded = expand_tilde(path);
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(resolved)
}

/// SQLite-backed store. Every call opens its own connection.
#[derive(Clone, Debug)]
pub struct SqliteProjectStore {
    db_path: PathBuf,
}

impl SqliteProjectStore {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> FiberResult<Self> {
        let store = Self {
            db_path: resolve(db_path.as_ref())?,
        };
        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::init_schema(&conn)?;
        debug!("Opened project store at {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> FiberResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn exists(conn: &Connection, sql: &str, value: &str) -> FiberResult<bool> {
        Ok(conn.prepare(sql)?.exists(params![value])?)
    }

    /// Copy the database to `destination` with the SQLite backup API.
    pub fn backup_to(&self, destination: impl AsRef<Path>) -> FiberResult<PathBuf> {
        let resolved = resolve(destination.as_ref())?;
        let src_conn = self.connect()?;
        let mut dst_conn = Connection::open(&resolved)?;
        let backup = rusqlite::backup::Backup::new(&src_conn, &mut dst_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(resolved)
    }

    /// Replace the database contents with a backup file.
    pub fn restore_from(&self, source: impl AsRef<Path>) -> FiberResult<()> {
        let resolved = expand_tilde(source.as_ref());
        if !resolved.exists() {
            return Err(FiberError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Backup file does not exist: {}", resolved.display()),
            )));
        }
        let src_conn = Connection::open(&resolved)?;
        let mut dst_conn = self.connect()?;
        let backup = rusqlite::backup::Backup::new(&src_conn, &mut dst_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(())
    }
}

impl ProjectStore for SqliteProjectStore {
    fn create(&self, doc: &ProjectDocument) -> FiberResult<()> {
        let conn = self.connect()?;
        if Self::exists(&conn, "SELECT 1 FROM projects WHERE id = ?1;", &doc.id)? {
            return Err(FiberError::InvalidProject(format!(
                "project id already exists: {}",
                doc.id
            )));
        }
        if Self::exists(&conn, "SELECT 1 FROM projects WHERE name = ?1;", &doc.name)? {
            return Err(FiberError::InvalidProject(format!(
                "project with this name already exists: {}",
                doc.name
            )));
        }
        conn.execute(
            "INSERT INTO projects(id, name, status, document, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                doc.id,
                doc.name,
                doc.status.as_str(),
                doc.to_json()?,
                timestamp(doc.created_at),
                timestamp(doc.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> FiberResult<Option<ProjectDocument>> {
        let conn = self.connect()?;
        let result: Result<String, _> = conn.query_row(
            "SELECT document FROM projects WHERE id = ?1;",
            params![id],
            |row| row.get(0),
        );
        match result {
            Ok(json) => Ok(Some(ProjectDocument::from_json(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, doc: &ProjectDocument) -> FiberResult<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE projects SET name = ?2, status = ?3, document = ?4, updated_at = ?5 \
             WHERE id = ?1;",
            params![
                doc.id,
                doc.name,
                doc.status.as_str(),
                doc.to_json()?,
                timestamp(doc.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(FiberError::ProjectNotFound(doc.id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> FiberResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute("DELETE FROM projects WHERE id = ?1;", params![id])?;
        Ok(changed > 0)
    }

    fn list(&self) -> FiberResult<Vec<ProjectDocument>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT document FROM projects ORDER BY updated_at DESC, id ASC;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(ProjectDocument::from_json(&row?)?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<IndexMap<String, ProjectDocument>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.lock().is_empty()
    }
}

impl ProjectStore for MemoryProjectStore {
    fn create(&self, doc: &ProjectDocument) -> FiberResult<()> {
        let mut projects = self.projects.lock();
        if projects.contains_key(&doc.id) {
            return Err(FiberError::InvalidProject(format!(
                "project id already exists: {}",
                doc.id
            )));
        }
        if projects.values().any(|p| p.name == doc.name) {
            return Err(FiberError::InvalidProject(format!(
                "project with this name already exists: {}",
                doc.name
            )));
        }
        projects.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> FiberResult<Option<ProjectDocument>> {
        Ok(self.projects.lock().get(id).cloned())
    }

    fn put(&self, doc: &ProjectDocument) -> FiberResult<()> {
        let mut projects = self.projects.lock();
        match projects.get_mut(&doc.id) {
            Some(slot) => {
                *slot = doc.clone();
                Ok(())
            }
            None => Err(FiberError::ProjectNotFound(doc.id.clone())),
        }
    }

    fn delete(&self, id: &str) -> FiberResult<bool> {
        Ok(self.projects.lock().shift_remove(id).is_some())
    }

    fn list(&self) -> FiberResult<Vec<ProjectDocument>> {
        let mut out: Vec<ProjectDocument> = self.projects.lock().values().cloned().collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}
