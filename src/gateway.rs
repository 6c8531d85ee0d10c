//! Case database access for the view layer
//!
//! The views only ever hand WHERE-clause fragments and raw attribute queries
//! to a [`CaseQueryGateway`]. [`SqliteCaseGateway`] answers them from a SQLite
//! case database whose schema is owned elsewhere.

use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::model::{AttributeRow, ContentRow};

/// Query surface the view layer needs from the case database
pub trait CaseQueryGateway: Send + Sync {
    /// All files matching a WHERE clause (the clause may end with LIMIT)
    fn find_all_files_where(&self, where_clause: &str) -> CoreResult<Vec<ContentRow>>;

    /// Number of rows `find_all_files_where` would return for the same clause
    fn count_files_where(&self, where_clause: &str) -> CoreResult<i64>;

    /// Direct children of a content object
    fn get_content_children(&self, content_id: i64) -> CoreResult<Vec<ContentRow>>;

    /// Run a raw attribute query returning
    /// `value_text, value_int32, artifact_id, attribute_type_id`
    fn execute_attribute_query(&self, sql: &str) -> CoreResult<Vec<AttributeRow>>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

const FILE_COLUMNS: &str = "obj_id, name, size, type, dir_type, meta_type, dir_flags, meta_flags, \
     known, extension, mime_type, data_source_obj_id";

/// Gateway over a SQLite case database
pub struct SqliteCaseGateway {
    conn: Mutex<Connection>,
}

impl SqliteCaseGateway {
    /// Open an existing case database read-only
    pub fn open(db_path: &Path) -> CoreResult<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Opened case database at: {:?}", db_path);
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::DataAccess("case database connection poisoned".to_string()))
    }

    fn query_files(&self, sql: &str, parent: Option<i64>) -> CoreResult<Vec<ContentRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| data_access(sql, e))?;
        let rows = match parent {
            Some(id) => stmt.query_map(params![id], content_row),
            None => stmt.query_map([], content_row),
        }
        .map_err(|e| data_access(sql, e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| data_access(sql, e))
    }
}

impl CaseQueryGateway for SqliteCaseGateway {
    fn find_all_files_where(&self, where_clause: &str) -> CoreResult<Vec<ContentRow>> {
        let sql = format!("SELECT {} FROM tsk_files WHERE {}", FILE_COLUMNS, where_clause);
        debug!(%where_clause, "find_all_files_where");
        self.query_files(&sql, None)
    }

    fn count_files_where(&self, where_clause: &str) -> CoreResult<i64> {
        // The sub-select keeps a trailing LIMIT bounding the count as well
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT obj_id FROM tsk_files WHERE {})",
            where_clause
        );
        debug!(%where_clause, "count_files_where");
        let conn = self.lock()?;
        conn.query_row(&sql, [], |row| row.get(0))
            .map_err(|e| data_access(&sql, e))
    }

    fn get_content_children(&self, content_id: i64) -> CoreResult<Vec<ContentRow>> {
        let sql = format!(
            "SELECT {} FROM tsk_files WHERE par_obj_id = ?1 ORDER BY name",
            FILE_COLUMNS
        );
        self.query_files(&sql, Some(content_id))
    }

    fn execute_attribute_query(&self, sql: &str) -> CoreResult<Vec<AttributeRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| data_access(sql, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AttributeRow {
                    value_text: row.get(0)?,
                    value_int32: row.get(1)?,
                    artifact_id: row.get(2)?,
                    attribute_type_id: row.get(3)?,
                })
            })
            .map_err(|e| data_access(sql, e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| data_access(sql, e))
    }
}

fn content_row(row: &Row<'_>) -> rusqlite::Result<ContentRow> {
    Ok(ContentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        size: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        file_type: row.get(3)?,
        dir_type: row.get(4)?,
        meta_type: row.get(5)?,
        dir_flags: row.get(6)?,
        meta_flags: row.get(7)?,
        known: row.get(8)?,
        extension: row.get(9)?,
        mime_type: row.get(10)?,
        data_source_id: row.get(11)?,
    })
}

fn data_access(sql: &str, err: rusqlite::Error) -> CoreError {
    CoreError::DataAccess(format!("{} (query: {})", err, sql))
}

// ============================================================================
// Test fixture
// ============================================================================

/// In-memory case database holding the tables the views read
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::tsk;

    pub const SCHEMA: &str = r#"
        CREATE TABLE tsk_files (
            obj_id INTEGER PRIMARY KEY,
            par_obj_id INTEGER,
            data_source_obj_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            size INTEGER,
            type INTEGER NOT NULL,
            dir_type INTEGER NOT NULL,
            meta_type INTEGER NOT NULL,
            dir_flags INTEGER NOT NULL,
            meta_flags INTEGER NOT NULL,
            known INTEGER,
            extension TEXT,
            mime_type TEXT
        );
        CREATE TABLE tsk_aggregate_score (
            obj_id INTEGER PRIMARY KEY,
            data_source_obj_id INTEGER,
            significance INTEGER NOT NULL,
            priority INTEGER NOT NULL
        );
        CREATE TABLE blackboard_artifacts (
            artifact_id INTEGER PRIMARY KEY,
            obj_id INTEGER NOT NULL,
            data_source_obj_id INTEGER,
            artifact_type_id INTEGER NOT NULL
        );
        CREATE TABLE blackboard_attributes (
            artifact_id INTEGER NOT NULL,
            attribute_type_id INTEGER NOT NULL,
            value_text TEXT,
            value_int32 INTEGER
        );
    "#;

    pub fn open_case() -> SqliteCaseGateway {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        SqliteCaseGateway::from_connection(conn)
    }

    impl SqliteCaseGateway {
        pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
            let conn = self.conn.lock().unwrap();
            f(&conn)
        }
    }

    /// Insert an allocated regular file
    pub fn insert_file(gw: &SqliteCaseGateway, id: i64, name: &str, size: i64, ds: i64) {
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase());
        gw.with_conn(|c| {
            c.execute(
                "INSERT INTO tsk_files (obj_id, par_obj_id, data_source_obj_id, name, size, type,
                    dir_type, meta_type, dir_flags, meta_flags, known, extension, mime_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, ?10, NULL)",
                params![
                    id,
                    ds,
                    ds,
                    name,
                    size,
                    tsk::FILE_TYPE_FS,
                    tsk::NAME_TYPE_REG,
                    tsk::META_TYPE_REG,
                    tsk::NAME_FLAG_ALLOC,
                    ext
                ],
            )
            .unwrap();
        });
    }

    /// Insert a file system file whose name entry is unallocated
    pub fn insert_deleted_file(gw: &SqliteCaseGateway, id: i64, ds: i64) {
        insert_file(gw, id, &format!("deleted_{}.bin", id), 1024, ds);
        gw.with_conn(|c| {
            c.execute(
                "UPDATE tsk_files SET dir_flags = ?1 WHERE obj_id = ?2",
                params![tsk::NAME_FLAG_UNALLOC, id],
            )
            .unwrap();
        });
    }

    pub fn set_column(gw: &SqliteCaseGateway, id: i64, column: &str, value: i64) {
        gw.with_conn(|c| {
            c.execute(
                &format!("UPDATE tsk_files SET {} = ?1 WHERE obj_id = ?2", column),
                params![value, id],
            )
            .unwrap();
        });
    }

    pub fn insert_score(gw: &SqliteCaseGateway, obj_id: i64, significance: i32, priority: i32) {
        gw.with_conn(|c| {
            c.execute(
                "INSERT INTO tsk_aggregate_score (obj_id, data_source_obj_id, significance, priority)
                 VALUES (?1, 1, ?2, ?3)",
                params![obj_id, significance, priority],
            )
            .unwrap();
        });
    }

    pub fn insert_artifact(gw: &SqliteCaseGateway, artifact_id: i64, artifact_type: i32, ds: i64) {
        gw.with_conn(|c| {
            c.execute(
                "INSERT INTO blackboard_artifacts (artifact_id, obj_id, data_source_obj_id, artifact_type_id)
                 VALUES (?1, ?1, ?2, ?3)",
                params![artifact_id, ds, artifact_type],
            )
            .unwrap();
        });
    }

    pub fn insert_text_attribute(gw: &SqliteCaseGateway, artifact_id: i64, attr_type: i32, value: &str) {
        gw.with_conn(|c| {
            c.execute(
                "INSERT INTO blackboard_attributes (artifact_id, attribute_type_id, value_text, value_int32)
                 VALUES (?1, ?2, ?3, NULL)",
                params![artifact_id, attr_type, value],
            )
            .unwrap();
        });
    }

    pub fn insert_int_attribute(gw: &SqliteCaseGateway, artifact_id: i64, attr_type: i32, value: i64) {
        gw.with_conn(|c| {
            c.execute(
                "INSERT INTO blackboard_attributes (artifact_id, attribute_type_id, value_text, value_int32)
                 VALUES (?1, ?2, NULL, ?3)",
                params![artifact_id, attr_type, value],
            )
            .unwrap();
        });
    }
}
