/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Keeps the set of active cues in step with the playback position.
//!
//! <https://html.spec.whatwg.org/multipage/#time-marches-on>

use log::debug;
use smallvec::SmallVec;

use crate::cue_tree::{Interval, IntervalTree};
use crate::event_queue::{EventTarget, MediaEvent, MediaEventName};
use crate::text_tracks::{
    CueId, CueOrderKey, TextTrackCue, TextTrackList, TextTrackType, TrackId,
};

/// The element state a scheduler run looks at.
#[derive(Clone, Copy, Debug)]
pub struct CueUpdateParams {
    pub movie_time: f64,
    pub last_seek_time: f64,
    /// No cue is active while the element has nothing to show.
    pub have_nothing: bool,
    pub paused: bool,
}

/// What the element has to do after a scheduler run, in this order:
/// schedule a periodic `timeupdate`, pause, then queue `events`.
#[derive(Debug, Default, PartialEq)]
pub struct CueUpdate {
    pub schedule_timeupdate: bool,
    pub pause: bool,
    pub events: Vec<MediaEvent>,
}

pub struct CueScheduler {
    cue_tree: IntervalTree<CueId>,
    currently_active_cues: Vec<CueId>,
    last_text_track_update_time: f64,
    ignore_track_display_update_requests: u32,
}

impl Default for CueScheduler {
    fn default() -> CueScheduler {
        CueScheduler::new()
    }
}

impl CueScheduler {
    pub fn new() -> CueScheduler {
        CueScheduler {
            cue_tree: IntervalTree::new(),
            currently_active_cues: vec![],
            last_text_track_update_time: -1.0,
            ignore_track_display_update_requests: 0,
        }
    }

    /// Store a cue. Adding a cue that is already stored does nothing.
    pub fn add_cue(&mut self, cue: &TextTrackCue) {
        let interval = Interval::new(cue.start_time, cue.end_time, cue.id);
        if !self.cue_tree.contains(&interval) {
            self.cue_tree.insert(interval);
        }
    }

    /// Forget a cue, using the times it was added with. Returns whether it
    /// was active.
    pub fn remove_cue(&mut self, cue: &TextTrackCue) -> bool {
        self.cue_tree
            .remove(&Interval::new(cue.start_time, cue.end_time, cue.id));
        let active_before = self.currently_active_cues.len();
        self.currently_active_cues.retain(|active| *active != cue.id);
        active_before != self.currently_active_cues.len()
    }

    pub fn cue_count(&self) -> usize {
        self.cue_tree.len()
    }

    pub fn currently_active_cues(&self) -> &[CueId] {
        &self.currently_active_cues
    }

    pub fn begin_ignoring_updates(&mut self) {
        self.ignore_track_display_update_requests += 1;
    }

    pub fn end_ignoring_updates(&mut self) {
        self.ignore_track_display_update_requests =
            self.ignore_track_display_update_requests.saturating_sub(1);
    }

    pub fn is_ignoring_updates(&self) -> bool {
        self.ignore_track_display_update_requests > 0
    }

    /// Start the next load cycle as if the scheduler had never run.
    pub fn reset_last_update_time(&mut self) {
        self.last_text_track_update_time = -1.0;
    }

    /// Recompute the active cues at `params.movie_time`. Returns `None`
    /// while updates are being ignored.
    pub fn update(
        &mut self,
        tracks: &mut TextTrackList,
        params: CueUpdateParams,
    ) -> Option<CueUpdate> {
        if self.is_ignoring_updates() {
            return None;
        }
        let movie_time = params.movie_time;
        let last_seek_time = params.last_seek_time;
        let mut result = CueUpdate::default();

        // Step 1
        let mut current_cues: Vec<CueId> = if params.have_nothing {
            vec![]
        } else {
            self.cue_tree
                .all_overlaps(movie_time, movie_time)
                .iter()
                .map(|interval| interval.data)
                .collect()
        };
        current_cues.sort_by_cached_key(|cue| tracks.cue_order_key(*cue));

        // Step 2
        let previous_cues = self.currently_active_cues.clone();

        // Steps 3-4: cues jumped over by normal playback since the last run.
        let last_time = self.last_text_track_update_time;
        let mut missed_cues: Vec<CueId> = vec![];
        if last_time >= 0.0 && last_seek_time < movie_time {
            let earliest = last_seek_time.max(last_time);
            missed_cues = self
                .cue_tree
                .all_overlaps(last_time, movie_time)
                .iter()
                .filter(|interval| interval.low > earliest && interval.high < movie_time)
                .map(|interval| interval.data)
                .collect();
        }
        self.last_text_track_update_time = movie_time;

        // Step 5
        result.schedule_timeupdate = last_seek_time <= last_time;

        // Step 6
        let is_active = |tracks: &TextTrackList, cue: CueId| {
            tracks.cue(cue).is_some_and(|cue| cue.is_active)
        };
        let active_set_changed = !missed_cues.is_empty() ||
            previous_cues
                .iter()
                .any(|cue| !current_cues.contains(cue) && is_active(tracks, *cue)) ||
            current_cues.iter().any(|cue| !is_active(tracks, *cue));
        if !active_set_changed {
            return Some(result);
        }

        // Step 7
        if !params.paused {
            let leaving_pauses = previous_cues.iter().any(|cue| {
                !current_cues.contains(cue) &&
                    tracks
                        .cue(*cue)
                        .is_some_and(|cue| cue.pause_on_exit && cue.is_active)
            });
            let missed_pauses = missed_cues
                .iter()
                .any(|cue| tracks.cue(*cue).is_some_and(|cue| cue.pause_on_exit));
            result.pause = leaving_pauses || missed_pauses;
        }

        // Step 8
        let mut event_tasks: Vec<(f64, CueOrderKey, CueId)> = vec![];
        for cue in missed_cues.iter().filter_map(|cue| tracks.cue(*cue)) {
            let key = tracks.cue_order_key(cue.id);
            event_tasks.push((cue.start_time, key, cue.id));
            // A zero or negative length cue gets its exit when the enter is
            // queued below.
            if cue.start_time < cue.end_time {
                event_tasks.push((cue.end_time, key, cue.id));
            }
        }
        for cue in previous_cues
            .iter()
            .filter(|cue| !current_cues.contains(cue))
            .filter_map(|cue| tracks.cue(*cue))
        {
            event_tasks.push((cue.end_time, tracks.cue_order_key(cue.id), cue.id));
        }
        for cue in current_cues
            .iter()
            .filter(|cue| !previous_cues.contains(cue))
            .filter_map(|cue| tracks.cue(*cue))
        {
            event_tasks.push((cue.start_time, tracks.cue_order_key(cue.id), cue.id));
        }

        // Step 9
        event_tasks.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        // Step 10
        let mut affected_tracks: SmallVec<[TrackId; 4]> = SmallVec::new();
        for (time, _, cue_id) in event_tasks {
            let Some(cue) = tracks.cue(cue_id) else {
                continue;
            };
            affected_tracks.push(cue.track);
            let target = EventTarget::Cue(cue_id);
            if cue.start_time >= cue.end_time {
                result
                    .events
                    .push(MediaEvent::new(MediaEventName::Enter, target));
                result
                    .events
                    .push(MediaEvent::new(MediaEventName::Exit, target));
            } else if time == cue.start_time {
                result
                    .events
                    .push(MediaEvent::new(MediaEventName::Enter, target));
            } else {
                result
                    .events
                    .push(MediaEvent::new(MediaEventName::Exit, target));
            }
        }

        // Step 11
        affected_tracks.sort_by_key(|track| tracks.track_index(*track));
        affected_tracks.dedup();
        for track in affected_tracks {
            result.events.push(MediaEvent::new(
                MediaEventName::CueChange,
                EventTarget::Track(track),
            ));
            if tracks
                .track(track)
                .is_some_and(|track| track.track_type == TextTrackType::TrackElement)
            {
                result.events.push(MediaEvent::new(
                    MediaEventName::CueChange,
                    EventTarget::TrackElement(track),
                ));
            }
        }

        // Step 12
        for cue in &current_cues {
            if let Some(cue) = tracks.cue_mut(*cue) {
                cue.is_active = true;
            }
        }
        for cue in previous_cues.iter().filter(|cue| !current_cues.contains(cue)) {
            if let Some(cue) = tracks.cue_mut(*cue) {
                cue.is_active = false;
            }
        }
        debug!(
            "Active cues at {}: {:?} (was {:?})",
            movie_time, current_cues, previous_cues
        );
        self.currently_active_cues = current_cues;

        Some(result)
    }
}
