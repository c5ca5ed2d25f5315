//! Fixed-rate tick clock and spawn scheduling.

use crate::config::{SPAWN_RATE_RANGE, check_num};
use anyhow::{Context, Result};

/// Fixed-rate clock driving the simulation.
///
/// Pausing only stops ticks from being issued; nothing else is reset.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    tick_rate: f64,
    paused: bool,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(tick_rate: f64) -> Self {
        Self {
            tick_rate,
            paused: false,
            ticks: 0,
        }
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    /// Elapsed time (in seconds) of a single tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Number of ticks issued so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Issue a tick, returning its elapsed time, unless paused.
    pub fn tick(&mut self) -> Option<f64> {
        if self.paused {
            return None;
        }
        self.ticks += 1;
        Some(self.dt())
    }
}

/// Counter firing once every spawn interval.
#[derive(Debug, Clone)]
pub struct SpawnTimer {
    elapsed_ms: f64,
    interval_ms: f64,
}

impl SpawnTimer {
    /// Timer that never fires until a rate is set.
    pub fn disabled() -> Self {
        Self {
            elapsed_ms: 0.0,
            interval_ms: f64::INFINITY,
        }
    }

    /// Timer firing at the interval mapped from a slider value.
    pub fn with_rate(value: u32) -> Result<Self> {
        let mut timer = Self::disabled();
        timer.set_rate(value)?;
        Ok(timer)
    }

    /// Map a slider value in `[0, 100]` to an interval between 10 s and 1 s.
    ///
    /// The elapsed counter is kept.
    pub fn set_rate(&mut self, value: u32) -> Result<()> {
        check_num(value, SPAWN_RATE_RANGE).context("invalid spawn rate")?;
        self.interval_ms = (10_000.0 - value as f64 * 90.0).max(1_000.0);
        Ok(())
    }

    /// Advance by `dt` seconds and return whether a spawn is due.
    pub fn advance(&mut self, dt: f64) -> bool {
        self.elapsed_ms += dt * 1000.0;
        if self.elapsed_ms < self.interval_ms {
            return false;
        }
        self.elapsed_ms = 0.0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_clock_issues_no_ticks() {
        let mut clock = SimulationClock::new(60.0);
        assert!(clock.tick().is_some());

        clock.toggle_pause();
        assert!(clock.tick().is_none());
        assert!(clock.tick().is_none());
        assert_eq!(clock.ticks(), 1);

        clock.toggle_pause();
        assert_eq!(clock.tick(), Some(1.0 / 60.0));
        assert_eq!(clock.ticks(), 2);
    }

    #[test]
    fn slider_maps_to_interval() {
        let mut timer = SpawnTimer::disabled();
        assert_eq!(timer.interval_ms, f64::INFINITY);

        timer.set_rate(0).expect("failed to set rate");
        assert_eq!(timer.interval_ms, 10_000.0);
        timer.set_rate(50).expect("failed to set rate");
        assert_eq!(timer.interval_ms, 5_500.0);
        timer.set_rate(100).expect("failed to set rate");
        assert_eq!(timer.interval_ms, 1_000.0);

        assert!(timer.set_rate(101).is_err());
        assert_eq!(timer.interval_ms, 1_000.0);
    }

    #[test]
    fn timer_fires_and_resets() {
        let mut timer = SpawnTimer::with_rate(100).expect("failed to create timer");
        for _ in 0..3 {
            assert!(!timer.advance(0.25));
        }
        assert!(timer.advance(0.25));
        assert!(!timer.advance(0.25));
    }

    #[test]
    fn disabled_timer_never_fires() {
        let mut timer = SpawnTimer::disabled();
        assert!((0..100_000).all(|_| !timer.advance(1.0)));
    }
}
