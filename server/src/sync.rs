use std::future::Future;

use exchange::{AdapterError, Candle, Interval};

use crate::db::{candles, pool::DbPool};
use crate::error::ApiError;

/// Upstream page size; Binance caps kline pages at 1000 rows.
pub const PAGE_LIMIT: u32 = 1_000;

const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

/// Incrementally backfill missing bars up to `now_ms`.
///
/// The cursor starts one step before the last persisted bar so the
/// boundary bar is re-fetched, healing any gap left by a previous
/// partial run; upsert-ignore makes the overlap free. Each page is
/// committed in its own transaction, so a failure mid-sync keeps
/// every previously committed page and the call can simply be rerun.
///
/// Returns the number of newly inserted rows.
pub async fn backfill<F, Fut>(
    pool: &DbPool,
    symbol: &str,
    interval: Interval,
    now_ms: u64,
    history_days: u32,
    mut fetch_page: F,
) -> Result<u64, ApiError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<Candle>, AdapterError>>,
{
    let step = interval.to_milliseconds();
    let horizon = now_ms.saturating_sub(u64::from(history_days) * DAY_MS);

    let mut conn = pool.get()?;
    let mut cursor = match candles::last_open_time(&conn, symbol, interval)? {
        Some(last_open) => last_open.saturating_sub(step).max(horizon),
        None => horizon,
    };

    let mut total_inserted = 0_u64;
    while cursor < now_ms {
        let page = fetch_page(cursor, now_ms).await?;
        if page.is_empty() {
            break;
        }

        let fetched = page.len();
        let last_open = page[fetched - 1].open_time;
        total_inserted += candles::insert_page(&mut conn, symbol, interval, &page)?;
        cursor = last_open + step;

        if fetched < PAGE_LIMIT as usize {
            break;
        }
    }

    tracing::info!("sync {symbol} {interval}: {total_inserted} new bars");
    Ok(total_inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, pool::open_memory_pool};

    const STEP: u64 = 300_000; // 5m

    fn candle(open_time: u64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + STEP - 1,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1.0,
        }
    }

    fn bars(from: u64, count: usize) -> Vec<Candle> {
        (0..count as u64).map(|i| candle(from + i * STEP)).collect()
    }

    fn seeded_pool() -> DbPool {
        let pool = open_memory_pool();
        init_schema(&pool.get().unwrap()).unwrap();
        pool
    }

    #[tokio::test]
    async fn second_run_with_no_new_data_inserts_nothing() {
        let pool = seeded_pool();
        let now = 100 * STEP;
        let page = bars(0, 10);

        let fetch = |_from: u64, _to: u64| std::future::ready(Ok(page.clone()));

        let first = backfill(&pool, "BTCUSDT", Interval::M5, now, 730, fetch)
            .await
            .unwrap();
        let second = backfill(&pool, "BTCUSDT", Interval::M5, now, 730, fetch)
            .await
            .unwrap();

        assert_eq!(first, 10);
        assert_eq!(second, 0);

        let conn = pool.get().unwrap();
        let rows = candles::list(&conn, "BTCUSDT", Interval::M5, 0, now).unwrap();
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn full_pages_advance_the_cursor() {
        let pool = seeded_pool();
        let limit = PAGE_LIMIT as usize;
        let now = 2_000 * STEP;

        let requests = std::sync::Mutex::new(Vec::new());
        let fetch = |from: u64, _to: u64| {
            requests.lock().unwrap().push(from);
            let page = if from == 0 {
                bars(0, limit)
            } else {
                bars(from, 100)
            };
            std::future::ready(Ok(page))
        };

        let inserted = backfill(&pool, "BTCUSDT", Interval::M5, now, 730, fetch)
            .await
            .unwrap();
        assert_eq!(inserted, (limit + 100) as u64);

        // Second request starts one step after the first page's last bar.
        let requests = requests.into_inner().unwrap();
        assert_eq!(requests, vec![0, limit as u64 * STEP]);
    }

    #[tokio::test]
    async fn resumes_one_step_before_the_last_bar() {
        let pool = seeded_pool();
        let now = 100 * STEP;

        {
            let mut conn = pool.get().unwrap();
            candles::insert_page(&mut conn, "BTCUSDT", Interval::M5, &bars(0, 5)).unwrap();
        }

        let requests = std::sync::Mutex::new(Vec::new());
        let fetch = |from: u64, _to: u64| {
            requests.lock().unwrap().push(from);
            std::future::ready(Ok(bars(from, 3)))
        };

        let inserted = backfill(&pool, "BTCUSDT", Interval::M5, now, 730, fetch)
            .await
            .unwrap();

        // Re-fetch starts at bar 3 (last bar 4, minus one step); bars
        // 3 and 4 already exist, bar 5 is new.
        assert_eq!(requests.into_inner().unwrap(), vec![3 * STEP]);
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn upstream_failure_keeps_committed_pages() {
        let pool = seeded_pool();
        let limit = PAGE_LIMIT as usize;
        let now = 5_000 * STEP;

        let calls = std::sync::Mutex::new(0_u32);
        let fetch = |from: u64, _to: u64| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            let result = if *calls == 1 {
                Ok(bars(from, limit))
            } else {
                Err(AdapterError::ParseError("truncated body".to_owned()))
            };
            std::future::ready(result)
        };

        let err = backfill(&pool, "BTCUSDT", Interval::M5, now, 730, fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));

        // The first page survived the failed second one.
        let conn = pool.get().unwrap();
        let rows = candles::list(&conn, "BTCUSDT", Interval::M5, 0, now).unwrap();
        assert_eq!(rows.len(), limit);
    }

    #[tokio::test]
    async fn empty_upstream_history_is_a_clean_no_op() {
        let pool = seeded_pool();
        let fetch = |_from: u64, _to: u64| std::future::ready(Ok(vec![]));
        let inserted = backfill(&pool, "BTCUSDT", Interval::M5, 1_000_000, 730, fetch)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }
}
