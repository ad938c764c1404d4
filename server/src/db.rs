pub mod candles;
pub mod drawings;
pub mod pool;

use rusqlite::Connection;

use crate::error::ApiError;

/// Create tables and indexes. Safe to run against an existing file.
pub fn init_schema(conn: &Connection) -> Result<(), ApiError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS candles (
            symbol     TEXT    NOT NULL,
            interval   TEXT    NOT NULL,
            open_time  INTEGER NOT NULL,
            close_time INTEGER NOT NULL,
            open       REAL    NOT NULL,
            high       REAL    NOT NULL,
            low        REAL    NOT NULL,
            close      REAL    NOT NULL,
            volume     REAL    NOT NULL,
            PRIMARY KEY (symbol, interval, open_time)
        );
        CREATE TABLE IF NOT EXISTS drawings (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol     TEXT    NOT NULL,
            type       TEXT    NOT NULL,
            points     TEXT    NOT NULL,
            style      TEXT    NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_drawings_symbol ON drawings(symbol);",
    )?;
    Ok(())
}
