/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use log::debug;
use media_engine_traits::{Preload, TimeRanges};

use super::{DisplayMode, MediaElement, ReadyState, log_engine_failure};
use crate::cached_clock::PlaybackSnapshot;
use crate::error::{Error, ErrorResult};
use crate::event_queue::MediaEventName;

impl MediaElement {
    /// <https://html.spec.whatwg.org/multipage/#dom-media-seek>
    pub(super) fn seek(&self, time: f64) -> ErrorResult {
        // Step 1
        if self.ready_state.get() == ReadyState::HaveNothing || !self.has_engine() {
            return Err(Error::InvalidState);
        }

        // An engine told to hold back data has to fetch it now.
        if self.preload.get() < Preload::Auto && self.ready_state.get() < ReadyState::HaveFutureData
        {
            self.prepare_to_play();
        }

        // Sampled before `seeking` is set, after which the last seek time is
        // reported instead.
        self.refresh_cached_time();
        let now = self.current_time();

        // Step 3
        self.seeking.set(true);

        // Steps 5-6
        let (earliest, media_time) = self
            .with_engine(|engine| {
                let earliest = engine.start_time();
                let clamped = time.min(engine.duration()).max(earliest);
                (earliest, engine.media_time_for_time_value(clamped))
            })
            .unwrap_or((0.0, time));
        debug!(
            "Seeking to {} (requested {}, earliest {}, now {})",
            media_time, time, earliest, now
        );

        // Step 7
        let seekable = self.seekable();
        // A poster always needs a real seek to go away.
        let no_seek_required =
            seekable.is_empty() || (media_time == now && self.display_mode() != DisplayMode::Poster);
        if no_seek_required {
            if media_time == now {
                self.schedule_event(MediaEventName::Seeking);
                self.force_timeupdate_event();
                self.schedule_event(MediaEventName::Seeked);
            }
            self.seeking.set(false);
            return Ok(());
        }
        let time = seekable.nearest(media_time);

        if self.playing.get() && self.last_seek_time.get() < now {
            self.add_played_range(self.last_seek_time.get(), now);
        }
        self.last_seek_time.set(time);
        self.sent_end_event.set(false);

        // Step 8
        self.with_engine(|engine| log_engine_failure("seek", engine.seek(time)));

        // Steps 9-10
        self.schedule_event(MediaEventName::Seeking);
        self.force_timeupdate_event();

        // The rest runs when the engine reports the new position.
        Ok(())
    }

    pub(super) fn finish_seek(&self) {
        debug!("Seek to {} finished", self.last_seek_time.get());
        // Step 14
        self.seeking.set(false);

        // Step 15
        self.schedule_event(MediaEventName::Seeked);

        self.display_mode.set(DisplayMode::Video);
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-currenttime>
    pub fn current_time(&self) -> f64 {
        let engine = self.engine.borrow();
        let Some(engine) = engine.as_deref() else {
            return 0.0;
        };
        let snapshot = PlaybackSnapshot {
            seeking: self.seeking.get(),
            last_seek_time: self.last_seek_time.get(),
            paused: self.paused.get(),
            playback_rate: self.playback_rate.get(),
            maximum_duration_to_cache: engine.maximum_duration_to_cache_media_time(),
        };
        self.cached_clock
            .borrow_mut()
            .current_time(snapshot, self.now(), || engine.current_time())
    }

    /// Setting `currentTime` from script.
    pub fn set_current_time(&self, time: f64) -> ErrorResult {
        if self.controller().is_some() {
            return Err(Error::InvalidState);
        }
        if !time.is_finite() {
            return Err(Error::NotSupported);
        }
        self.seek(time)
    }

    /// The last position the engine was sampled at, if still valid.
    pub fn cached_time(&self) -> Option<f64> {
        self.cached_clock.borrow().cached_time()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-played>
    pub fn played(&self) -> TimeRanges {
        if self.playing.get() {
            let time = self.current_time();
            if time > self.last_seek_time.get() {
                self.add_played_range(self.last_seek_time.get(), time);
            }
        }
        self.played_ranges.borrow().clone()
    }

    pub(super) fn add_played_range(&self, start: f64, end: f64) {
        debug!("Adding played range [{}, {}]", start, end);
        self.played_ranges.borrow_mut().add(start, end);
    }

    pub(super) fn refresh_cached_time(&self) {
        let Some(time) = self.with_engine(|engine| engine.current_time()) else {
            return;
        };
        self.cached_clock.borrow_mut().refresh(time, self.now());
    }

    pub(super) fn invalidate_cached_time(&self) {
        self.cached_clock.borrow_mut().invalidate(self.now());
    }
}
