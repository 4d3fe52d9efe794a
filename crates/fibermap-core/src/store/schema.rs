//! SQLite schema for the project store, and the upgrades applied to stored
//! documents when the store is opened.
//!
//! The version lives in `PRAGMA user_version`. Each upgrade runs in its own
//! transaction together with the version bump.

use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::errors::FiberResult;
use crate::store::document::ProjectDocument;

/// Version written by this build.
///
/// - 1: `projects` table.
/// - 2: stored documents rewritten in the canonical shape (`cabinets`
///   instead of `tiroirs`, nested `tiroir_cfg`, photos under `tiroirPhotos`).
pub const SCHEMA_VERSION: i32 = 2;

/// Table DDL, safe to replay on an already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        document TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_projects_updated ON projects(updated_at DESC);",
];

/// Create missing tables, then run pending upgrades.
pub fn init_schema(conn: &Connection) -> FiberResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

pub fn schema_version(conn: &Connection) -> FiberResult<i32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Run every upgrade between the stored version and [`SCHEMA_VERSION`].
/// A database written by a newer build is left untouched.
pub fn migrate_schema(conn: &Connection) -> FiberResult<()> {
    let mut version = schema_version(conn)?;
    while version < SCHEMA_VERSION {
        let next = version + 1;
        let tx = conn.unchecked_transaction()?;
        let rewritten = match next {
            2 => canonicalize_documents(&tx)?,
            _ => 0,
        };
        tx.execute_batch(&format!("PRAGMA user_version = {next};"))?;
        tx.commit()?;
        info!("Project store upgraded to v{next} ({rewritten} documents rewritten)");
        version = next;
    }
    Ok(())
}

/// v2: re-serialize every stored document and rewrite legacy
/// configurations. Unreadable documents, and documents whose configuration
/// cannot be read, are kept as stored.
fn canonicalize_documents(conn: &Connection) -> FiberResult<usize> {
    let stored: Vec<(String, String)> = {
        let mut stmt = conn.prepare("SELECT id, document FROM projects;")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut rewritten = 0;
    for (id, json) in stored {
        let mut doc = match ProjectDocument::from_json(&json) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping unreadable document of project {id}: {e}");
                continue;
            }
        };
        if let Err(e) = doc.canonicalize_configuration() {
            warn!("Keeping stored configuration of project {id}: {e}");
        }
        let updated = doc.to_json()?;
        if updated != json {
            conn.execute(
                "UPDATE projects SET document = ?2, status = ?3 WHERE id = ?1;",
                params![id, updated, doc.status.as_str()],
            )?;
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(conn: &Connection, id: &str, document: &serde_json::Value) {
        conn.execute(
            "INSERT INTO projects(id, name, document, created_at, updated_at) \
             VALUES (?1, ?1, ?2, 'a', 'a');",
            params![id, document.to_string()],
        )
        .unwrap();
    }

    fn stored(conn: &Connection, id: &str) -> (String, serde_json::Value) {
        let (status, document): (String, String) = conn
            .query_row(
                "SELECT status, document FROM projects WHERE id = ?1;",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        (status, serde_json::from_str(&document).unwrap())
    }

    fn legacy_model() -> serde_json::Value {
        json!({
            "tiroirs": {
                "T1": {
                    "id": "T1",
                    "siteCode": "B2",
                    "modules": {"A": {"id": "A", "spliceUnitIds": ["99"]}}
                }
            },
            "fibers": {
                "99-3": {
                    "id": "99-3",
                    "spliceUnitId": "99",
                    "fiberNumber": 3,
                    "cabinetId": "T1",
                    "moduleId": "A",
                    "legacyStatus": "",
                    "legacyDistance": "",
                    "sourceRowIndex": 3
                }
            }
        })
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);
        init_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        init_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_database_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn.execute_batch("PRAGMA user_version = 9;").unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 9);
    }

    #[test]
    fn v2_rewrites_legacy_documents() {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn.execute_batch("PRAGMA user_version = 1;").unwrap();
        insert(
            &conn,
            "flat",
            &json!({
                "id": "flat",
                "name": "flat",
                "status": "in-progress",
                "data": legacy_model(),
                "tiroir_cfg": {"99-3": "occupied"}
            }),
        );
        insert(
            &conn,
            "wrapped",
            &json!({
                "id": "wrapped",
                "name": "wrapped",
                "data": legacy_model(),
                "tiroir_cfg": {
                    "T1": {
                        "photos": ["front.jpg"],
                        "modules": {"A": {"fibers": {"3": "available"}}}
                    }
                }
            }),
        );
        insert(
            &conn,
            "unprocessed",
            &json!({
                "id": "unprocessed",
                "name": "unprocessed",
                "tiroir_cfg": {"99-3": "occupied"}
            }),
        );

        migrate_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let (status, flat) = stored(&conn, "flat");
        assert_eq!(status, "in-progress");
        assert!(flat["data"].get("tiroirs").is_none());
        assert!(flat["data"]["cabinets"].get("T1").is_some());
        assert_eq!(flat["tiroir_cfg"]["T1"]["A"]["3"]["status"], "occupied");
        assert_eq!(flat["tiroir_cfg"]["T1"]["A"]["1"]["status"], "not-configured");

        let (_, wrapped) = stored(&conn, "wrapped");
        assert_eq!(wrapped["tiroir_cfg"]["T1"]["A"]["3"]["status"], "available");
        assert_eq!(wrapped["tiroirPhotos"]["T1"], json!(["front.jpg"]));

        // No model to resolve fiber ids against: the flat map stays.
        let (_, unprocessed) = stored(&conn, "unprocessed");
        assert_eq!(unprocessed["tiroir_cfg"], json!({"99-3": "occupied"}));
    }

    #[test]
    fn unreadable_documents_are_kept() {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        insert(
            &conn,
            "broken",
            &json!({
                "id": "broken",
                "name": "broken",
                "data": legacy_model(),
                "tiroir_cfg": {"99-3": "unplugged"}
            }),
        );
        conn.execute(
            "INSERT INTO projects(id, name, document, created_at, updated_at) \
             VALUES ('garbled', 'garbled', 'not json', 'a', 'a');",
            [],
        )
        .unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let (_, doc) = stored(&conn, "broken");
        assert_eq!(doc["tiroir_cfg"], json!({"99-3": "unplugged"}));
        let garbled: String = conn
            .query_row("SELECT document FROM projects WHERE id = 'garbled';", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(garbled, "not json");
    }
}
