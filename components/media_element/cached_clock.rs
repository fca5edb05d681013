/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Playback position extrapolation.
//!
//! Asking the engine for its position can be expensive, so the element keeps
//! the last sample together with the wall clock time it was taken at, and
//! while playing extrapolates from it for as long as the engine allows.

use std::cell::Cell;
use std::time::Instant;

use log::debug;

/// A source of wall clock time in seconds. Only differences are meaningful.
pub trait WallClock {
    fn now(&self) -> f64;
}

/// Wall clock time elapsed since the clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> MonotonicClock {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl WallClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> ManualClock {
        ManualClock { now: Cell::new(now) }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: f64) {
        self.now.set(self.now.get() + delta);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// What the element knows about playback when it asks for the position.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackSnapshot {
    pub seeking: bool,
    pub last_seek_time: f64,
    pub paused: bool,
    pub playback_rate: f64,
    /// Zero disables extrapolation.
    pub maximum_duration_to_cache: f64,
}

pub struct CachedClock {
    cached_time: Option<f64>,
    clock_time_at_cached_time: f64,
    minimum_clock_time_to_update_cached_time: f64,
    warmup: f64,
}

impl CachedClock {
    pub fn new(warmup: f64) -> CachedClock {
        CachedClock {
            cached_time: None,
            clock_time_at_cached_time: 0.0,
            minimum_clock_time_to_update_cached_time: 0.0,
            warmup,
        }
    }

    pub fn cached_time(&self) -> Option<f64> {
        self.cached_time
    }

    /// Take a fresh sample from the engine.
    pub fn refresh(&mut self, engine_time: f64, now: f64) {
        self.cached_time = Some(engine_time);
        self.clock_time_at_cached_time = now;
    }

    /// Forget the sample. Extrapolation stays off for the warmup period, as
    /// the engine position right after a play, pause, rate change or seek is
    /// not trustworthy yet.
    pub fn invalidate(&mut self, now: f64) {
        debug!("Invalidating cached media time");
        self.minimum_clock_time_to_update_cached_time = now + self.warmup;
        self.cached_time = None;
    }

    /// The current playback position. `engine_time` is only called when the
    /// sample cannot be used.
    pub fn current_time(
        &mut self,
        snapshot: PlaybackSnapshot,
        now: f64,
        engine_time: impl FnOnce() -> f64,
    ) -> f64 {
        if snapshot.seeking {
            return snapshot.last_seek_time;
        }

        if snapshot.paused {
            if let Some(cached) = self.cached_time {
                return cached;
            }
        }

        if snapshot.maximum_duration_to_cache > 0.0 && !snapshot.paused {
            if let Some(cached) = self.cached_time {
                if now > self.minimum_clock_time_to_update_cached_time {
                    let wall_clock_delta = now - self.clock_time_at_cached_time;
                    if wall_clock_delta < snapshot.maximum_duration_to_cache {
                        return cached + snapshot.playback_rate * wall_clock_delta;
                    }
                }
            }
        }

        let time = engine_time();
        self.refresh(time, now);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(rate: f64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            seeking: false,
            last_seek_time: 0.0,
            paused: false,
            playback_rate: rate,
            maximum_duration_to_cache: 2.0,
        }
    }

    #[test]
    fn seeking_reports_the_seek_target() {
        let mut clock = CachedClock::new(0.5);
        let snapshot = PlaybackSnapshot {
            seeking: true,
            last_seek_time: 12.0,
            ..playing(1.0)
        };
        assert_eq!(clock.current_time(snapshot, 0.0, || 3.0), 12.0);
        assert_eq!(clock.cached_time(), None);
    }

    #[test]
    fn paused_sample_is_returned_verbatim() {
        let mut clock = CachedClock::new(0.5);
        clock.refresh(4.0, 1.0);
        let snapshot = PlaybackSnapshot {
            paused: true,
            ..playing(1.0)
        };
        assert_eq!(clock.current_time(snapshot, 50.0, || 9.0), 4.0);
    }

    #[test]
    fn extrapolation_waits_for_the_warmup() {
        let mut clock = CachedClock::new(0.5);
        clock.invalidate(10.0);
        assert_eq!(clock.current_time(playing(1.0), 10.0, || 1.0), 1.0);
        // Still inside the warmup, so the engine is asked again.
        assert_eq!(clock.current_time(playing(1.0), 10.25, || 1.25), 1.25);
        assert_eq!(clock.current_time(playing(2.0), 11.25, || 99.0), 3.25);
    }

    #[test]
    fn disabled_without_a_maximum_cache_duration() {
        let mut clock = CachedClock::new(0.0);
        let snapshot = PlaybackSnapshot {
            maximum_duration_to_cache: 0.0,
            ..playing(1.0)
        };
        assert_eq!(clock.current_time(snapshot, 1.0, || 1.0), 1.0);
        assert_eq!(clock.current_time(snapshot, 1.5, || 7.0), 7.0);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(3.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 3.5);
        clock.set(1.0);
        assert_eq!(clock.now(), 1.0);
    }
}
