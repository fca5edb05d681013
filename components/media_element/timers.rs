/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The timers a media element runs. Each one is a scheduled task with a
//! handle; cancelling the handle guarantees the task never fires.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::VecDeque;

use log::debug;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MediaTimerHandle(u32);

/// Which element algorithm a timer resumes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaTimerSource {
    /// Zero-delay one shot that runs the pending delayed actions.
    Load,
    /// Repeating, active while the network state is loading.
    ProgressEvent,
    /// Repeating, active while playing.
    PlaybackProgress,
}

struct MediaTimer {
    handle: MediaTimerHandle,
    source: MediaTimerSource,
    scheduled_for: f64,
    repeat_interval: Option<f64>,
}

impl Ord for MediaTimer {
    fn cmp(&self, other: &MediaTimer) -> Ordering {
        match self.scheduled_for.total_cmp(&other.scheduled_for).reverse() {
            Ordering::Equal => self.handle.cmp(&other.handle).reverse(),
            res => res,
        }
    }
}

impl PartialOrd for MediaTimer {
    fn partial_cmp(&self, other: &MediaTimer) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for MediaTimer {}
impl PartialEq for MediaTimer {
    fn eq(&self, other: &MediaTimer) -> bool {
        self.handle == other.handle
    }
}

/// Pending timers, ordered so that the next one to fire is at the back.
pub struct MediaTimers {
    next_timer_handle: Cell<MediaTimerHandle>,
    timers: RefCell<VecDeque<MediaTimer>>,
}

impl Default for MediaTimers {
    fn default() -> MediaTimers {
        MediaTimers::new()
    }
}

impl MediaTimers {
    pub fn new() -> MediaTimers {
        MediaTimers {
            next_timer_handle: Cell::new(MediaTimerHandle(1)),
            timers: RefCell::new(VecDeque::new()),
        }
    }

    pub fn schedule_oneshot(
        &self,
        source: MediaTimerSource,
        now: f64,
        delay: f64,
    ) -> MediaTimerHandle {
        self.schedule(source, now + delay, None)
    }

    pub fn schedule_repeating(
        &self,
        source: MediaTimerSource,
        now: f64,
        interval: f64,
    ) -> MediaTimerHandle {
        self.schedule(source, now + interval, Some(interval))
    }

    fn schedule(
        &self,
        source: MediaTimerSource,
        scheduled_for: f64,
        repeat_interval: Option<f64>,
    ) -> MediaTimerHandle {
        let new_handle = self.next_timer_handle.get();
        self.next_timer_handle.set(MediaTimerHandle(new_handle.0 + 1));
        self.insert(MediaTimer {
            handle: new_handle,
            source,
            scheduled_for,
            repeat_interval,
        });
        new_handle
    }

    fn insert(&self, timer: MediaTimer) {
        let mut timers = self.timers.borrow_mut();
        let insertion_index = match timers.binary_search(&timer) {
            Ok(index) | Err(index) => index,
        };
        timers.insert(insertion_index, timer);
    }

    pub fn unschedule(&self, handle: MediaTimerHandle) {
        self.timers.borrow_mut().retain(|timer| timer.handle != handle);
    }

    pub fn is_scheduled(&self, handle: MediaTimerHandle) -> bool {
        self.timers
            .borrow()
            .iter()
            .any(|timer| timer.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.borrow().is_empty()
    }

    /// Remove the earliest timer due at `now` and return its source. A
    /// repeating timer is rearmed, strictly after `now`, before it is
    /// returned, so cancelling it from the fired algorithm still sticks.
    pub fn take_due(&self, now: f64) -> Option<(MediaTimerHandle, MediaTimerSource)> {
        let timer = {
            let mut timers = self.timers.borrow_mut();
            match timers.back() {
                Some(next) if next.scheduled_for <= now => timers.pop_back()?,
                _ => return None,
            }
        };
        debug!("Media timer {:?} ({:?}) is due", timer.handle, timer.source);

        let fired = (timer.handle, timer.source);
        if let Some(interval) = timer.repeat_interval {
            let mut next_time = timer.scheduled_for + interval;
            if next_time <= now {
                next_time = now + interval;
            }
            self.insert(MediaTimer {
                scheduled_for: next_time,
                ..timer
            });
        }
        Some(fired)
    }
}
