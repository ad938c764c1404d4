use chrono::{DateTime, Datelike, Utc};
use exchange::{Candle, Interval};
use rustc_hash::FxHashMap;

use crate::util::round_dp;

const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Exponential moving average over the displayed closes, seeded with
/// the first close and rounded to 4 decimal places. Recomputed from
/// scratch over the (bounded) window on every change; no incremental
/// state survives a replay tick.
pub fn ema(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.is_empty() {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(candles.len());
    let mut value = candles[0].close;
    out.push(round_dp(value, 4));

    for candle in &candles[1..] {
        value = (candle.close - value) * multiplier + value;
        out.push(round_dp(value, 4));
    }
    out
}

/// Weekly high/low band derived from Monday's bars only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MondayRange {
    pub week_start: u64,
    pub week_end: u64,
    pub high: f64,
    pub low: f64,
}

/// Group displayed candles by their UTC week and take the high/low of
/// the bars that opened on Monday. Weeks without a Monday bar yield
/// no band. Disabled for weekly and monthly intervals, where a bar
/// spans far more than one weekday.
pub fn monday_ranges(candles: &[Candle], interval: Interval) -> Vec<MondayRange> {
    if !interval.is_intraweek() {
        return vec![];
    }
    let step = interval.to_milliseconds();

    let mut buckets: FxHashMap<u64, (f64, f64)> = FxHashMap::default();
    for candle in candles {
        let Some(week_start) = monday_week_start(candle.open_time) else {
            continue;
        };
        buckets
            .entry(week_start)
            .and_modify(|(high, low)| {
                *high = high.max(candle.high);
                *low = low.min(candle.low);
            })
            .or_insert((candle.high, candle.low));
    }

    let mut ranges: Vec<MondayRange> = buckets
        .into_iter()
        .map(|(week_start, (high, low))| MondayRange {
            week_start,
            week_end: week_start + WEEK_MS - step,
            high,
            low,
        })
        .collect();
    ranges.sort_by_key(|r| r.week_start);
    ranges
}

/// Midnight of the bar's own Monday, but only when the bar itself
/// opened on a Monday.
fn monday_week_start(open_time: u64) -> Option<u64> {
    let dt = DateTime::<Utc>::from_timestamp_millis(open_time as i64)?;
    if dt.weekday().num_days_from_monday() != 0 {
        return None;
    }
    let midnight = dt.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    Some(midnight.timestamp_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: u64, close: f64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 1,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 0.0,
        }
    }

    fn bar(open_time: u64, high: f64, low: f64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 1,
            open: low,
            high,
            low,
            close: high,
            volume: 0.0,
        }
    }

    // 2024-01-01 was a Monday.
    const MONDAY: u64 = 1_704_067_200_000;
    const TUESDAY: u64 = MONDAY + 24 * 60 * 60 * 1_000;

    #[test]
    fn ema_period_one_equals_closes() {
        let candles: Vec<Candle> = [100.0, 101.5, 99.25, 103.0]
            .iter()
            .enumerate()
            .map(|(i, close)| candle(i as u64 * 60_000, *close))
            .collect();
        assert_eq!(ema(&candles, 1), vec![100.0, 101.5, 99.25, 103.0]);
    }

    #[test]
    fn ema_seeds_with_first_close_and_rounds() {
        let candles = vec![candle(0, 100.0), candle(60_000, 110.0)];
        // multiplier for period 3 is 0.5: 100 + (110-100)*0.5 = 105.
        assert_eq!(ema(&candles, 3), vec![100.0, 105.0]);
        assert!(ema(&candles, 0).is_empty());
        assert!(ema(&[], 3).is_empty());
    }

    #[test]
    fn week_without_monday_bars_has_no_band() {
        let candles = vec![
            bar(TUESDAY, 110.0, 90.0),
            bar(TUESDAY + 60 * 60 * 1_000, 120.0, 95.0),
        ];
        assert!(monday_ranges(&candles, Interval::H1).is_empty());
    }

    #[test]
    fn two_monday_bars_merge_into_one_band() {
        let candles = vec![
            bar(MONDAY, 110.0, 90.0),
            bar(MONDAY + 60 * 60 * 1_000, 120.0, 95.0),
            bar(TUESDAY, 200.0, 10.0),
        ];
        let ranges = monday_ranges(&candles, Interval::H1);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].week_start, MONDAY);
        assert_eq!(ranges[0].high, 120.0);
        assert_eq!(ranges[0].low, 90.0);
        assert_eq!(
            ranges[0].week_end,
            MONDAY + WEEK_MS - Interval::H1.to_milliseconds()
        );
    }

    #[test]
    fn bands_sort_by_week_start() {
        let next_monday = MONDAY + WEEK_MS;
        let candles = vec![bar(next_monday, 50.0, 40.0), bar(MONDAY, 110.0, 90.0)];
        let ranges = monday_ranges(&candles, Interval::D1);
        assert_eq!(ranges.len(), 2);
        assert!(ranges[0].week_start < ranges[1].week_start);
    }

    #[test]
    fn disabled_for_weekly_and_monthly() {
        let candles = vec![bar(MONDAY, 110.0, 90.0)];
        assert!(monday_ranges(&candles, Interval::W1).is_empty());
        assert!(monday_ranges(&candles, Interval::Mo1).is_empty());
    }
}
