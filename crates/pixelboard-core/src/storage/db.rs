//! SQLite driver adapter
//!
//! Owns the single live connection to the embedded engine and exposes the
//! surface the stores are built on: eager query materialization into typed
//! values, statement execution with affected-row accounting, and explicit
//! transaction scopes that commit on success and roll back on every error
//! path.
//!
//! All statement execution is serialized through one mutex-guarded
//! connection. Lock contention inside the engine resolves by bounded
//! waiting (`busy_timeout`) rather than immediate failure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params, Transaction};
use tracing::info;

use crate::storage::error::{StoreError, StoreResult};

/// Pragmas applied to every connection on open.
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

/// A single typed cell, mapped from the engine's native storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Result of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// An eagerly materialized query result.
///
/// Every row is read before the statement is finalized; there is no
/// streaming cursor.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Run a statement, returning the affected-row count and last insert id.
///
/// Works against a plain connection or inside a [`Transaction`].
pub fn exec<P: Params>(conn: &Connection, op: &str, sql: &str, params: P) -> StoreResult<ExecResult> {
    let rows_affected = conn
        .execute(sql, params)
        .map_err(|e| StoreError::db(op, e))?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: conn.last_insert_rowid(),
    })
}

/// Run a query and materialize every row eagerly.
pub fn query<P: Params>(conn: &Connection, op: &str, sql: &str, params: P) -> StoreResult<ResultSet> {
    let mut stmt = conn.prepare(sql).map_err(|e| StoreError::db(op, e))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query(params).map_err(|e| StoreError::db(op, e))?;
    let mut materialized = Vec::new();
    while let Some(row) = rows.next().map_err(|e| StoreError::db(op, e))? {
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let cell = match row.get_ref(idx).map_err(|e| StoreError::db(op, e))? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Real(r) => Value::Real(r),
                ValueRef::Text(t) => Value::Text(
                    std::str::from_utf8(t)
                        .map_err(|e| {
                            StoreError::DataIntegrity(format!("non-UTF-8 text during {op}: {e}"))
                        })?
                        .to_string(),
                ),
                ValueRef::Blob(b) => Value::Blob(b.to_vec()),
            };
            cells.push(cell);
        }
        materialized.push(cells);
    }

    Ok(ResultSet {
        columns,
        rows: materialized,
    })
}

/// Handle on the backing SQLite file.
///
/// Permits exactly one live native connection; clones share it, so all
/// statement execution is serialized process-wide.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create the database at `path`.
    ///
    /// Fails with a configuration error when the path is empty or the
    /// engine cannot open the file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::Config("database path is empty".to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Config(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Config(format!("cannot open database {}: {}", path.display(), e))
        })?;
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StoreError::db("apply pragmas", e))?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Config(format!("cannot open in-memory database: {e}")))?;
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StoreError::db("apply pragmas", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // A poisoned lock still holds a usable connection; recover it.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Run a closure inside an explicit transaction.
    ///
    /// Commits when the closure returns `Ok`. On any error path the
    /// transaction guard drops and rolls back, so no partial state is ever
    /// visible to other readers.
    pub fn with_txn<F, T>(&self, op: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(|e| StoreError::db(op, e))?;
        let out = f(&tx)?;
        tx.commit().map_err(|e| StoreError::db(op, e))?;
        Ok(out)
    }

    /// Statement execution without an explicit surrounding transaction.
    pub fn execute<P: Params>(&self, op: &str, sql: &str, params: P) -> StoreResult<ExecResult> {
        self.with_conn(|conn| exec(conn, op, sql, params))
    }

    /// Query with eager materialization.
    pub fn query<P: Params>(&self, op: &str, sql: &str, params: P) -> StoreResult<ResultSet> {
        self.with_conn(|conn| query(conn, op, sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_open_in_memory_applies_pragmas() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));

        db.with_conn(|conn| {
            let timeout: i64 = conn
                .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
                .map_err(|e| StoreError::db("pragma", e))?;
            assert_eq!(timeout, 5000);

            let fk: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .map_err(|e| StoreError::db("pragma", e))?;
            assert_eq!(fk, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_empty_path_is_config_error() {
        let err = Database::open(Path::new("")).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("grid.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        drop(db);
    }

    #[test]
    fn test_execute_and_query_typed_values() {
        let db = Database::open_in_memory().unwrap();
        db.execute(
            "create table",
            "CREATE TABLE t (i INTEGER, r REAL, s TEXT, b BLOB, n TEXT)",
            [],
        )
        .unwrap();

        let res = db
            .execute(
                "insert row",
                "INSERT INTO t (i, r, s, b, n) VALUES (?1, ?2, ?3, ?4, NULL)",
                params![42_i64, 2.5_f64, "hello", vec![1_u8, 2, 3]],
            )
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        assert_eq!(res.last_insert_id, 1);

        let rs = db
            .query("read rows", "SELECT i, r, s, b, n FROM t", [])
            .unwrap();
        assert_eq!(rs.columns, vec!["i", "r", "s", "b", "n"]);
        assert_eq!(rs.len(), 1);

        let row = &rs.rows[0];
        assert_eq!(row[0], Value::Integer(42));
        assert_eq!(row[1], Value::Real(2.5));
        assert_eq!(row[2], Value::Text("hello".to_string()));
        assert_eq!(row[3], Value::Blob(vec![1, 2, 3]));
        assert!(row[4].is_null());

        assert_eq!(row[0].as_i64(), Some(42));
        assert_eq!(row[1].as_f64(), Some(2.5));
        assert_eq!(row[2].as_str(), Some("hello"));
        assert_eq!(row[4].as_i64(), None);
    }

    #[test]
    fn test_query_returns_empty_result_set() {
        let db = Database::open_in_memory().unwrap();
        db.execute("create table", "CREATE TABLE t (v INTEGER)", [])
            .unwrap();

        let rs = db.query("read rows", "SELECT v FROM t", []).unwrap();
        assert!(rs.is_empty());
        assert_eq!(rs.columns, vec!["v"]);
    }

    #[test]
    fn test_with_txn_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();
        db.execute("create table", "CREATE TABLE t (v INTEGER)", [])
            .unwrap();

        db.with_txn("insert", |tx| {
            exec(tx, "insert", "INSERT INTO t (v) VALUES (1)", [])?;
            exec(tx, "insert", "INSERT INTO t (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();

        let rs = db.query("count", "SELECT COUNT(*) FROM t", []).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(2));
    }

    #[test]
    fn test_with_txn_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.execute("create table", "CREATE TABLE t (v INTEGER)", [])
            .unwrap();

        let result: StoreResult<()> = db.with_txn("insert", |tx| {
            exec(tx, "insert", "INSERT INTO t (v) VALUES (1)", [])?;
            Err(StoreError::Cancelled)
        });
        assert!(matches!(result, Err(StoreError::Cancelled)));

        let rs = db.query("count", "SELECT COUNT(*) FROM t", []).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(0));
    }

    #[test]
    fn test_clones_share_one_connection() {
        let db = Database::open_in_memory().unwrap();
        db.execute("create table", "CREATE TABLE t (v INTEGER)", [])
            .unwrap();

        let clone = db.clone();
        clone
            .execute("insert", "INSERT INTO t (v) VALUES (7)", [])
            .unwrap();

        let rs = db.query("read", "SELECT v FROM t", []).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(7));
    }
}
