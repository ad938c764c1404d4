pub mod adapter;

pub use adapter::AdapterError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chart/backfill intervals supported across the system.
///
/// Each interval maps to a fixed millisecond step; that step drives
/// logical-index extrapolation on the chart and gap math in the
/// backfill engine, so it is deliberately constant (1M is a flat 30
/// days rather than a calendar month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    M5,
    M15,
    H1,
    H4,
    D1,
    W1,
    Mo1,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
        Interval::W1,
        Interval::Mo1,
    ];

    pub fn to_minutes(self) -> u32 {
        match self {
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::H1 => 60,
            Interval::H4 => 240,
            Interval::D1 => 1_440,
            Interval::W1 => 10_080,
            Interval::Mo1 => 43_200,
        }
    }

    pub fn to_milliseconds(self) -> u64 {
        u64::from(self.to_minutes()) * 60_000
    }

    /// Intervals at or above one week have no meaningful "Monday bar"
    /// inside their own bucket; weekly overlays are disabled for them.
    pub fn is_intraweek(self) -> bool {
        self < Interval::W1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1D",
            Interval::W1 => "1W",
            Interval::Mo1 => "1M",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInterval(pub String);

impl fmt::Display for InvalidInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid interval: {:?}", self.0)
    }
}

impl std::error::Error for InvalidInterval {}

impl FromStr for Interval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1D" => Ok(Interval::D1),
            "1W" => Ok(Interval::W1),
            "1M" => Ok(Interval::Mo1),
            other => Err(InvalidInterval(other.to_owned())),
        }
    }
}

impl Serialize for Interval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One OHLCV bar. Immutable once persisted; uniquely keyed by
/// (symbol, interval, open_time) on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: u64,
    pub close_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

pub(crate) fn de_string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_strings_round_trip() {
        for interval in Interval::ALL {
            let s = interval.to_string();
            assert_eq!(s.parse::<Interval>().unwrap(), interval);
        }
        assert!("3h".parse::<Interval>().is_err());
    }

    #[test]
    fn interval_steps_are_fixed() {
        assert_eq!(Interval::M5.to_milliseconds(), 300_000);
        assert_eq!(Interval::H1.to_milliseconds(), 3_600_000);
        assert_eq!(Interval::W1.to_milliseconds(), 7 * 86_400_000);
        assert_eq!(Interval::Mo1.to_milliseconds(), 30 * 86_400_000);
    }

    #[test]
    fn weekly_and_monthly_are_not_intraweek() {
        assert!(Interval::H4.is_intraweek());
        assert!(Interval::D1.is_intraweek());
        assert!(!Interval::W1.is_intraweek());
        assert!(!Interval::Mo1.is_intraweek());
    }

    #[test]
    fn candle_uses_camel_case_on_the_wire() {
        let candle = Candle {
            open_time: 0,
            close_time: 59_999,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        };
        let json = serde_json::to_value(candle).unwrap();
        assert!(json.get("openTime").is_some());
        assert!(json.get("closeTime").is_some());
    }
}
