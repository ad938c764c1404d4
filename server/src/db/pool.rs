use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::ApiError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a read-write SQLite pool for the given database file,
/// creating the file if missing. WAL keeps readers unblocked while
/// a sync transaction is committing pages.
pub fn open_pool(path: &Path, max_size: u32) -> Result<DbPool, ApiError> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    });
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| ApiError::Db(e.to_string()))
}

/// Single-connection in-memory pool, used by tests.
#[cfg(test)]
pub fn open_memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    Pool::builder()
        .max_size(1)
        .build(manager)
        .unwrap()
}
