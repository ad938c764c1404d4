use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical half-window the viewport keeps around the cursor while
/// auto-follow is on.
pub const FOLLOW_HALF_SPAN: f64 = 70.0;

/// Playback speed multiplier. Tick cadence is `1000ms / multiplier`,
/// floored at 80ms so high speeds stay renderable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Speed {
    #[default]
    X1,
    X2,
    X5,
    X10,
}

impl Speed {
    pub const ALL: [Speed; 4] = [Speed::X1, Speed::X2, Speed::X5, Speed::X10];

    pub fn multiplier(self) -> u64 {
        match self {
            Speed::X1 => 1,
            Speed::X2 => 2,
            Speed::X5 => 5,
            Speed::X10 => 10,
        }
    }

    pub fn tick_interval(self) -> Duration {
        Duration::from_millis((1_000 / self.multiplier()).max(80))
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Prepared,
    Running,
    Paused,
}

/// Bar-by-bar playback over the loaded candle series.
///
/// `Idle` until a start bar is marked, `Prepared` once it is, then
/// `Running`/`Paused` while the cursor advances. The cursor never
/// wraps; reaching the last bar pauses in place.
#[derive(Debug, Default, Clone)]
pub struct Replay {
    phase: Phase,
    start_index: Option<usize>,
    current_index: Option<usize>,
    pub speed: Speed,
    pub auto_follow: bool,
}

impl Replay {
    pub fn new() -> Self {
        Self {
            auto_follow: true,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn is_active(&self) -> bool {
        self.current_index.is_some()
    }

    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Mark the start bar. Allowed from any state; playback position
    /// is discarded and any running timer must be dropped by the
    /// caller (`is_running` turns false).
    pub fn set_start(&mut self, index: usize) {
        self.start_index = Some(index);
        self.current_index = None;
        self.phase = Phase::Prepared;
    }

    /// Begin or resume playback. No-op without a start bar.
    pub fn start(&mut self) {
        match self.phase {
            Phase::Idle | Phase::Running => {}
            Phase::Prepared => {
                self.current_index = self.start_index;
                self.phase = Phase::Running;
            }
            Phase::Paused => {
                if self.current_index.is_none() {
                    self.current_index = self.start_index;
                }
                self.phase = Phase::Running;
            }
        }
    }

    pub fn pause(&mut self) {
        if self.phase == Phase::Running {
            self.phase = Phase::Paused;
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.start_index = None;
        self.current_index = None;
    }

    /// Speed changes take effect on the next tick without touching
    /// the playback position.
    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    /// Advance one bar. Returns the new cursor when it moved; at the
    /// last bar the replay auto-pauses in place and returns `None`.
    pub fn tick(&mut self, last_index: usize) -> Option<usize> {
        if self.phase != Phase::Running {
            return None;
        }
        let current = self.current_index?;
        if current >= last_index {
            self.phase = Phase::Paused;
            return None;
        }
        let next = current + 1;
        self.current_index = Some(next);
        Some(next)
    }

    /// Number of bars visible out of `total`: the series truncated at
    /// the cursor while a replay is active, the whole series otherwise.
    pub fn display_len(&self, total: usize) -> usize {
        match self.current_index {
            Some(index) => (index + 1).min(total),
            None => total,
        }
    }

    /// Logical window to recenter on after a tick, when auto-follow
    /// applies.
    pub fn follow_window(&self) -> Option<(f64, f64)> {
        if !self.auto_follow || self.phase != Phase::Running {
            return None;
        }
        let index = self.current_index? as f64;
        Some((index - FOLLOW_HALF_SPAN, index + FOLLOW_HALF_SPAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_cadence_is_floored() {
        assert_eq!(Speed::X1.tick_interval(), Duration::from_millis(1_000));
        assert_eq!(Speed::X2.tick_interval(), Duration::from_millis(500));
        assert_eq!(Speed::X5.tick_interval(), Duration::from_millis(200));
        assert_eq!(Speed::X10.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn start_without_start_bar_is_a_no_op() {
        let mut replay = Replay::new();
        replay.start();
        assert_eq!(replay.phase(), Phase::Idle);
        assert_eq!(replay.current_index(), None);
    }

    #[test]
    fn reset_from_running_lands_in_idle() {
        let mut replay = Replay::new();
        replay.set_start(3);
        replay.start();
        assert!(replay.is_running());

        replay.reset();
        assert_eq!(replay.phase(), Phase::Idle);
        assert_eq!(replay.start_index(), None);
        assert_eq!(replay.current_index(), None);
        assert!(!replay.is_running());
    }

    #[test]
    fn plays_three_bars_and_auto_pauses_at_the_end() {
        // candles at 0, 60000, 120000; last index is 2.
        let mut replay = Replay::new();
        replay.set_start(0);
        replay.start();
        assert_eq!(replay.current_index(), Some(0));

        assert_eq!(replay.tick(2), Some(1));
        assert_eq!(replay.tick(2), Some(2));
        assert_eq!(replay.phase(), Phase::Running);

        // At the last bar the next tick pauses instead of advancing.
        assert_eq!(replay.tick(2), None);
        assert_eq!(replay.phase(), Phase::Paused);
        assert_eq!(replay.current_index(), Some(2));
    }

    #[test]
    fn speed_change_keeps_position() {
        let mut replay = Replay::new();
        replay.set_start(0);
        replay.start();
        replay.tick(10);
        replay.set_speed(Speed::X10);
        assert_eq!(replay.current_index(), Some(1));
        assert!(replay.is_running());
    }

    #[test]
    fn set_start_while_running_reprepares() {
        let mut replay = Replay::new();
        replay.set_start(0);
        replay.start();
        replay.tick(10);

        replay.set_start(5);
        assert_eq!(replay.phase(), Phase::Prepared);
        assert_eq!(replay.start_index(), Some(5));
        assert_eq!(replay.current_index(), None);

        replay.start();
        assert_eq!(replay.current_index(), Some(5));
    }

    #[test]
    fn display_len_truncates_only_while_active() {
        let mut replay = Replay::new();
        assert_eq!(replay.display_len(100), 100);

        replay.set_start(9);
        assert_eq!(replay.display_len(100), 100);

        replay.start();
        assert_eq!(replay.display_len(100), 10);
    }

    #[test]
    fn follow_window_tracks_the_cursor() {
        let mut replay = Replay::new();
        replay.set_start(100);
        replay.start();
        assert_eq!(replay.follow_window(), Some((30.0, 170.0)));

        replay.auto_follow = false;
        assert_eq!(replay.follow_window(), None);
    }
}
