
use exchange::{Candle, Interval};

/// Time axis over the displayed candle window, translating between
/// wall-clock milliseconds and the logical bar index. Integer indices
/// address loaded bars exactly; out-of-range positions extrapolate
/// linearly with the interval's fixed step so drawings anchored past
/// either edge (or past a replay truncation) still resolve.
#[derive(Debug, Clone)]
pub struct TimeScale {
    times: Vec<u64>,
    step_ms: u64,
}

impl TimeScale {
    pub fn new(times: Vec<u64>, interval: Interval) -> Self {
        Self {
            times,
            step_ms: interval.to_milliseconds(),
        }
    }

    pub fn from_candles(candles: &[Candle], interval: Interval) -> Self {
        Self::new(candles.iter().map(|c| c.open_time).collect(), interval)
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn step_ms(&self) -> u64 {
        self.step_ms
    }

    pub fn last_index(&self) -> Option<usize> {
        self.times.len().checked_sub(1)
    }

    /// Open time at a logical index. Indices that round into the loaded
    /// array return that bar's open time exactly; anything outside is
    /// extrapolated. `None` when no bars are loaded or the result
    /// would fall before the epoch.
    pub fn logical_to_time(&self, index: f64) -> Option<u64> {
        let first = *self.times.first()?;
        let last = *self.times.last()?;
        let last_index = (self.times.len() - 1) as f64;
        let step = self.step_ms as f64;

        let rounded = index.round();
        if rounded >= 0.0 && (rounded as usize) < self.times.len() {
            return Some(self.times[rounded as usize]);
        }

        let extrapolated = if index < 0.0 {
            first as f64 + index * step
        } else {
            last as f64 + (index - last_index) * step
        };
        (extrapolated >= 0.0).then_some(extrapolated as u64)
    }

    /// Logical index of a timestamp. Inside the loaded range this is
    /// the nearest bar by absolute time difference; outside it, the
    /// elapsed offset divided by the step. `None` when empty.
    pub fn time_to_logical(&self, time_ms: u64) -> Option<f64> {
        let first = *self.times.first()?;
        let last = *self.times.last()?;
        let last_index = (self.times.len() - 1) as f64;
        let step = self.step_ms as f64;

        if time_ms <= first {
            return Some(-((first - time_ms) as f64) / step);
        }
        if time_ms >= last {
            return Some(last_index + (time_ms - last) as f64 / step);
        }

        // Bounded by ~2 years of bars; linear scan is fine here.
        let nearest = self
            .times
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.abs_diff(time_ms))
            .map(|(i, _)| i as f64);
        nearest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute_scale(times: Vec<u64>) -> TimeScale {
        TimeScale::new(times, Interval::M5)
    }

    #[test]
    fn empty_scale_maps_nothing() {
        let scale = minute_scale(vec![]);
        assert_eq!(scale.logical_to_time(0.0), None);
        assert_eq!(scale.time_to_logical(1_000), None);
    }

    #[test]
    fn in_range_index_returns_exact_open_time() {
        let scale = minute_scale(vec![0, 300_000, 600_000]);
        assert_eq!(scale.logical_to_time(1.0), Some(300_000));
        assert_eq!(scale.logical_to_time(1.4), Some(300_000));
        assert_eq!(scale.logical_to_time(2.0), Some(600_000));
    }

    #[test]
    fn extrapolates_past_both_edges() {
        let scale = minute_scale(vec![600_000, 900_000, 1_200_000]);
        assert_eq!(scale.logical_to_time(4.0), Some(1_500_000));
        assert_eq!(scale.logical_to_time(-1.0), Some(300_000));
        // Before the epoch is unresolvable.
        assert_eq!(scale.logical_to_time(-10.0), None);
    }

    #[test]
    fn time_to_logical_snaps_to_nearest_bar() {
        let scale = minute_scale(vec![0, 300_000, 600_000]);
        assert_eq!(scale.time_to_logical(310_000), Some(1.0));
        assert_eq!(scale.time_to_logical(460_000), Some(2.0));
    }

    #[test]
    fn round_trip_beyond_last_bar_is_step_exact() {
        let scale = minute_scale(vec![0, 300_000, 600_000]);
        for t in [600_000_u64, 750_000, 1_200_000, 3_000_000] {
            let idx = scale.time_to_logical(t).unwrap();
            let back = scale.logical_to_time(idx).unwrap();
            assert!(back.abs_diff(t) < scale.step_ms(), "t={t} back={back}");
        }
    }
}
