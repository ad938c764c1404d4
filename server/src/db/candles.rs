use exchange::{Candle, Interval};
use rusqlite::{Connection, params};

use crate::error::ApiError;

/// Candles for a symbol/interval within `[from_ms, to_ms]`, ascending
/// by open time.
pub fn list(
    conn: &Connection,
    symbol: &str,
    interval: Interval,
    from_ms: u64,
    to_ms: u64,
) -> Result<Vec<Candle>, ApiError> {
    let mut stmt = conn.prepare_cached(
        "SELECT open_time, close_time, open, high, low, close, volume
         FROM candles
         WHERE symbol = ?1 AND interval = ?2 AND open_time BETWEEN ?3 AND ?4
         ORDER BY open_time ASC",
    )?;

    let rows = stmt
        .query_map(
            params![symbol, interval.to_string(), from_ms, to_ms],
            |row| {
                Ok(Candle {
                    open_time: row.get(0)?,
                    close_time: row.get(1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Open time of the most recent persisted bar, if any.
pub fn last_open_time(
    conn: &Connection,
    symbol: &str,
    interval: Interval,
) -> Result<Option<u64>, ApiError> {
    let last = conn.query_row(
        "SELECT MAX(open_time) FROM candles WHERE symbol = ?1 AND interval = ?2",
        params![symbol, interval.to_string()],
        |row| row.get::<_, Option<u64>>(0),
    )?;
    Ok(last)
}

/// Persist one fetched page inside a single transaction, skipping
/// rows that already exist. Returns how many rows were actually
/// inserted; a failure rolls the whole page back.
pub fn insert_page(
    conn: &mut Connection,
    symbol: &str,
    interval: Interval,
    candles: &[Candle],
) -> Result<u64, ApiError> {
    let tx = conn.transaction()?;
    let mut inserted = 0_u64;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO candles
             (symbol, interval, open_time, close_time, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for candle in candles {
            inserted += stmt.execute(params![
                symbol,
                interval.to_string(),
                candle.open_time,
                candle.close_time,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            ])? as u64;
        }
    }
    tx.commit()?;
    Ok(inserted)
}
