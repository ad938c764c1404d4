use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use exchange::adapter::binance;
use exchange::{Candle, Interval};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;
use crate::sync;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

fn parse_interval(raw: &str) -> Result<Interval, ApiError> {
    raw.parse()
        .map_err(|e: exchange::InvalidInterval| ApiError::BadRequest(e.to_string()))
}

fn normalize_symbol(raw: &str) -> Result<String, ApiError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(format!("invalid symbol: {raw:?}")));
    }
    Ok(symbol)
}

#[derive(Debug, Deserialize)]
pub struct CandleQuery {
    symbol: String,
    interval: String,
    #[serde(default)]
    from: u64,
    #[serde(default)]
    to: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    symbol: String,
    interval: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/candles", get(api_candles))
        .route("/api/sync", post(api_sync))
}

async fn api_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = state
        .pool
        .get()
        .ok()
        .is_some_and(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok());
    Json(json!({ "ok": true, "db": db_ok }))
}

async fn api_candles(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CandleQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let symbol = normalize_symbol(&q.symbol)?;
    let interval = parse_interval(&q.interval)?;
    let to = q.to.unwrap_or_else(now_ms);

    let conn = state.pool.get()?;
    let candles = crate::db::candles::list(&conn, &symbol, interval, q.from, to)?;
    Ok(Json(candles))
}

/// Run the backfill to completion before answering, so the client can
/// immediately re-read the candle range it asked to fill.
async fn api_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<Value>, ApiError> {
    let symbol = normalize_symbol(&req.symbol)?;
    let interval = parse_interval(&req.interval)?;
    let now = now_ms();

    let inserted = sync::backfill(
        &state.pool,
        &symbol,
        interval,
        now,
        state.config.history_days,
        |start, end| binance::fetch_bars(&symbol, interval, start, end, sync::PAGE_LIMIT),
    )
    .await?;

    Ok(Json(json!({
        "ok": true,
        "inserted": inserted,
        "symbol": symbol,
        "interval": interval.to_string(),
    })))
}
