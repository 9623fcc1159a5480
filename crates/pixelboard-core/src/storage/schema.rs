//! Schema bootstrap and migrations
//!
//! Migrations are forward-only and numbered; the `schema_version` table
//! records the last applied step, which makes bootstrap idempotent on
//! every startup. After migrating, the grid is seeded to its initial state
//! exactly once.
//!
//! The whole bootstrap runs in a single transaction: a failed commit or a
//! cancellation mid-seed rolls everything back, and the next attempt
//! starts from scratch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::{params, Transaction};
use tracing::{debug, info};

use crate::models::GRID_PIXELS;
use crate::storage::db::{self, Database};
use crate::storage::error::{StoreError, StoreResult};

/// Schema version after all migrations have run
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Forward-only migration steps; index + 1 is the resulting version.
///
/// Steps are never edited once shipped, only appended.
const MIGRATIONS: &[&str] = &[
    // v1: base tables and indexes
    r#"
    CREATE TABLE IF NOT EXISTS pixels (
        id INTEGER PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'free',
        color TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL DEFAULT '',
        updated_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_pixels_status ON pixels(status);

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s','now') AS INTEGER) * 1000)
    );

    CREATE TABLE IF NOT EXISTS email_verification_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s','now') AS INTEGER) * 1000),
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_verification_tokens_user_id
        ON email_verification_tokens(user_id);
    "#,
    // v2: ownership and verified-address columns
    r#"
    ALTER TABLE pixels ADD COLUMN owner_id INTEGER;
    ALTER TABLE users ADD COLUMN email_verified_at INTEGER;
    "#,
];

/// Cooperative cancellation flag, checked between seed insertions.
///
/// A statement already issued always runs to completion; cancellation is
/// only observed at the seam between statements.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bring the database to the current schema and seed the grid.
///
/// Safe to run on every startup. Until this has committed once, the
/// stores are unusable.
pub fn bootstrap(db: &Database, cancel: &CancelToken) -> StoreResult<()> {
    db.with_txn("bootstrap", |tx| {
        migrate(tx)?;
        seed_grid(tx, cancel)
    })
}

/// Apply pending migration steps and record the resulting version.
pub(crate) fn migrate(tx: &Transaction<'_>) -> StoreResult<()> {
    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| StoreError::db("create schema_version", e))?;

    let current = current_version(tx)?;
    for (idx, step) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        tx.execute_batch(step)
            .map_err(|e| StoreError::db(format!("migrate to v{version}"), e))?;
        info!(version, "applied schema migration");
    }

    if current == 0 {
        db::exec(
            tx,
            "record schema version",
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    } else if current < SCHEMA_VERSION {
        db::exec(
            tx,
            "record schema version",
            "UPDATE schema_version SET version = ?1",
            params![SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

fn current_version(tx: &Transaction<'_>) -> StoreResult<i64> {
    let rs = db::query(
        tx,
        "read schema version",
        "SELECT version FROM schema_version LIMIT 1",
        [],
    )?;
    match rs.rows.first() {
        Some(row) => row.first().and_then(|v| v.as_i64()).ok_or_else(|| {
            StoreError::DataIntegrity("schema_version.version is not an integer".to_string())
        }),
        None => Ok(0),
    }
}

/// Insert the full grid when, and only when, no pixel rows exist.
///
/// An interrupted seed rolls back with the enclosing transaction, so the
/// count is zero again on retry; a nonzero count of any size skips
/// seeding entirely (no partial repair).
fn seed_grid(tx: &Transaction<'_>, cancel: &CancelToken) -> StoreResult<()> {
    let rs = db::query(tx, "count pixels", "SELECT COUNT(*) FROM pixels", [])?;
    let count = rs
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::DataIntegrity("pixel count is not an integer".to_string()))?;
    if count > 0 {
        return Ok(());
    }

    info!(pixels = GRID_PIXELS, "seeding empty grid");
    let mut stmt = tx
        .prepare(
            "INSERT INTO pixels (id, status, color, url, owner_id, updated_at) \
             VALUES (?1, 'free', '', '', NULL, NULL)",
        )
        .map_err(|e| StoreError::db("prepare seed insert", e))?;

    for id in 0..GRID_PIXELS {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        stmt.execute(params![id])
            .map_err(|e| StoreError::db("seed pixel row", e))?;
        if id > 0 && id % 100_000 == 0 {
            debug!(seeded = id, "grid seed progress");
        }
    }

    info!("grid seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::Value;

    fn table_names(db: &Database) -> Vec<String> {
        let rs = db
            .query(
                "list tables",
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
                [],
            )
            .unwrap();
        rs.rows
            .into_iter()
            .filter_map(|row| row.into_iter().next()?.as_str().map(str::to_string))
            .collect()
    }

    fn pixel_count(db: &Database) -> i64 {
        let rs = db
            .query("count pixels", "SELECT COUNT(*) FROM pixels", [])
            .unwrap();
        rs.rows[0][0].as_i64().unwrap()
    }

    #[test]
    fn test_bootstrap_creates_tables_and_seeds_grid() {
        let db = Database::open_in_memory().unwrap();
        bootstrap(&db, &CancelToken::new()).unwrap();

        let tables = table_names(&db);
        assert!(tables.contains(&"pixels".to_string()));
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"email_verification_tokens".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));

        assert_eq!(pixel_count(&db), GRID_PIXELS);

        let rs = db
            .query(
                "read version",
                "SELECT version FROM schema_version",
                [],
            )
            .unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(SCHEMA_VERSION));
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        bootstrap(&db, &CancelToken::new()).unwrap();
        bootstrap(&db, &CancelToken::new()).unwrap();

        assert_eq!(pixel_count(&db), GRID_PIXELS);

        let rs = db
            .query(
                "count versions",
                "SELECT COUNT(*) FROM schema_version",
                [],
            )
            .unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(1));
    }

    #[test]
    fn test_indexes_exist() {
        let db = Database::open_in_memory().unwrap();
        bootstrap(&db, &CancelToken::new()).unwrap();

        let rs = db
            .query(
                "list indexes",
                "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
                [],
            )
            .unwrap();
        let indexes: Vec<&str> = rs
            .rows
            .iter()
            .filter_map(|row| row[0].as_str())
            .collect();
        assert!(indexes.contains(&"idx_pixels_status"));
        assert!(indexes.contains(&"idx_verification_tokens_user_id"));
    }

    #[test]
    fn test_cancelled_bootstrap_rolls_back_everything() {
        let db = Database::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = bootstrap(&db, &cancel).unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));

        // Migrations rolled back with the seed: no tables at all.
        assert!(table_names(&db).is_empty());

        // A clean retry succeeds from scratch.
        bootstrap(&db, &CancelToken::new()).unwrap();
        assert_eq!(pixel_count(&db), GRID_PIXELS);
    }

    #[test]
    fn test_seed_never_reruns_once_rows_exist() {
        let db = Database::open_in_memory().unwrap();
        bootstrap(&db, &CancelToken::new()).unwrap();

        // Simulate an externally shrunk grid; no partial repair happens.
        db.execute("delete pixels", "DELETE FROM pixels WHERE id >= 10", [])
            .unwrap();
        assert_eq!(pixel_count(&db), 10);

        bootstrap(&db, &CancelToken::new()).unwrap();
        assert_eq!(pixel_count(&db), 10);
    }

    #[test]
    fn test_migrate_without_seed_leaves_grid_empty() {
        let db = Database::open_in_memory().unwrap();
        db.with_txn("migrate", |tx| migrate(tx)).unwrap();

        assert_eq!(pixel_count(&db), 0);
        let tables = table_names(&db);
        assert!(tables.contains(&"users".to_string()));
    }
}
