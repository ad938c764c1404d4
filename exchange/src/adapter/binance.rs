use std::time::Duration;

use serde::Deserialize;

use super::AdapterError;
use crate::{Candle, Interval, de_string_to_f64};

const SPOT_DOMAIN: &str = "https://api.binance.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Raw kline row as Binance returns it: a positional JSON array with
/// numbers-as-strings for all price/volume fields.
#[derive(Deserialize, Debug, Clone)]
struct FetchedKline(
    u64,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    u64,
    String,
    u32,
    #[serde(deserialize_with = "de_string_to_f64")] f64,
    String,
    String,
);

impl From<FetchedKline> for Candle {
    fn from(fetched: FetchedKline) -> Self {
        Self {
            open_time: fetched.0,
            open: fetched.1,
            high: fetched.2,
            low: fetched.3,
            close: fetched.4,
            volume: fetched.5,
            close_time: fetched.6,
        }
    }
}

fn interval_code(interval: Interval) -> &'static str {
    match interval {
        Interval::M5 => "5m",
        Interval::M15 => "15m",
        Interval::H1 => "1h",
        Interval::H4 => "4h",
        Interval::D1 => "1d",
        Interval::W1 => "1w",
        Interval::Mo1 => "1M",
    }
}

/// Fetch one page of spot klines, ordered ascending by open time.
///
/// `limit` is clamped to Binance's page maximum of 1000. A transport
/// failure or timeout surfaces as `AdapterError::FetchError`; partial
/// pages are returned as-is so callers can detect the end of history.
pub async fn fetch_bars(
    symbol: &str,
    interval: Interval,
    start_ms: u64,
    end_ms: u64,
    limit: u32,
) -> Result<Vec<Candle>, AdapterError> {
    if start_ms >= end_ms {
        return Ok(vec![]);
    }

    let limit = limit.clamp(1, 1000);
    let url = format!(
        "{SPOT_DOMAIN}/api/v3/klines?symbol={symbol}&interval={}&startTime={start_ms}&endTime={end_ms}&limit={limit}",
        interval_code(interval),
    );

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(AdapterError::FetchError)?;

    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::InvalidRequest(format!(
            "{status}: {body}"
        )));
    }

    let fetched: Vec<FetchedKline> = response
        .json()
        .await
        .map_err(|e| AdapterError::ParseError(e.to_string()))?;

    Ok(fetched.into_iter().map(Candle::from).collect())
}
