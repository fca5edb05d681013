/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The element side of text tracks: keeping the cue store in step with the
//! tracks and their modes, and running the cue scheduler.

use log::debug;

use super::{DelayedActionType, MediaElement, ReadyState};
use crate::cue_scheduler::CueUpdateParams;
use crate::event_queue::EventTarget;
use crate::text_tracks::{
    CueId, TextTrack, TextTrackCue, TextTrackKind, TextTrackMode, TextTrackReadiness,
    TextTrackType, TrackId,
};

/// Holds back active cue updates while alive. When the last scope on the
/// element ends, the active cues are recomputed once.
pub struct TrackDisplayUpdateScope<'a> {
    element: &'a MediaElement,
}

impl Drop for TrackDisplayUpdateScope<'_> {
    fn drop(&mut self) {
        self.element.end_ignoring_track_display_update_requests();
    }
}

impl MediaElement {
    pub fn track_display_update_scope(&self) -> TrackDisplayUpdateScope<'_> {
        self.begin_ignoring_track_display_update_requests();
        TrackDisplayUpdateScope { element: self }
    }

    pub fn begin_ignoring_track_display_update_requests(&self) {
        self.cue_scheduler.borrow_mut().begin_ignoring_updates();
    }

    pub fn end_ignoring_track_display_update_requests(&self) {
        let ignoring = {
            let mut scheduler = self.cue_scheduler.borrow_mut();
            scheduler.end_ignoring_updates();
            scheduler.is_ignoring_updates()
        };
        if !ignoring {
            self.update_active_text_track_cues(self.current_time());
        }
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-addtexttrack>
    pub fn add_text_track(&self, kind: TextTrackKind, label: &str, language: &str) -> TrackId {
        let mut tracks = self.text_tracks.borrow_mut();
        let id = tracks.add_track(TextTrackType::AddTrack, kind, label, language);
        if let Some(track) = tracks.track_mut(id) {
            track.configured = true;
        }
        id
    }

    /// A `<track>` child was inserted. Its cues arrive once it loads.
    pub fn add_track_element(
        &self,
        kind: TextTrackKind,
        label: &str,
        language: &str,
        is_default: bool,
    ) -> TrackId {
        let id = {
            let mut tracks = self.text_tracks.borrow_mut();
            let id = tracks.add_track(TextTrackType::TrackElement, kind, label, language);
            if let Some(track) = tracks.track_mut(id) {
                track.is_default = is_default;
            }
            id
        };
        self.schedule_delayed_action(DelayedActionType::CONFIGURE_TEXT_TRACKS);
        id
    }

    /// The engine found a text track inside the resource.
    pub fn add_in_band_track(&self, kind: TextTrackKind, label: &str, language: &str) -> TrackId {
        let id = self.text_tracks.borrow_mut().add_track(
            TextTrackType::InBand,
            kind,
            label,
            language,
        );
        self.schedule_delayed_action(DelayedActionType::CONFIGURE_TEXT_TRACKS);
        id
    }

    pub fn remove_text_track(&self, track: TrackId) {
        let _scope = self.track_display_update_scope();
        let Some(removed) = self.text_tracks.borrow_mut().remove_track(track) else {
            return;
        };
        {
            let mut scheduler = self.cue_scheduler.borrow_mut();
            let mut queue = self.event_queue.borrow_mut();
            for cue in removed.cues() {
                scheduler.remove_cue(cue);
                queue.cancel_for_target(EventTarget::Cue(cue.id));
            }
            queue.cancel_for_target(EventTarget::Track(track));
            queue.cancel_for_target(EventTarget::TrackElement(track));
        }
        self.text_tracks_when_resource_selection_began
            .borrow_mut()
            .retain(|candidate| *candidate != track);
    }

    pub fn text_track(&self, track: TrackId) -> Option<TextTrack> {
        self.text_tracks.borrow().track(track).cloned()
    }

    pub fn text_track_ids(&self) -> Vec<TrackId> {
        self.text_tracks.borrow().iter().map(|track| track.id).collect()
    }

    pub fn text_track_mode(&self, track: TrackId) -> Option<TextTrackMode> {
        self.text_tracks.borrow().track(track).map(|track| track.mode)
    }

    pub fn add_cue(
        &self,
        track: TrackId,
        identifier: &str,
        start_time: f64,
        end_time: f64,
        pause_on_exit: bool,
    ) -> Option<CueId> {
        let _scope = self.track_display_update_scope();
        let (cue, enabled) = {
            let mut tracks = self.text_tracks.borrow_mut();
            let id = tracks.add_cue(track, identifier, start_time, end_time, pause_on_exit)?;
            let enabled = tracks
                .track(track)
                .is_some_and(|track| track.mode != TextTrackMode::Disabled);
            (tracks.cue(id).cloned(), enabled)
        };
        let cue = cue?;
        if enabled {
            self.cue_scheduler.borrow_mut().add_cue(&cue);
        }
        Some(cue.id)
    }

    pub fn remove_cue(&self, cue: CueId) -> bool {
        let _scope = self.track_display_update_scope();
        let Some(removed) = self.text_tracks.borrow_mut().remove_cue(cue) else {
            return false;
        };
        self.cue_scheduler.borrow_mut().remove_cue(&removed);
        self.event_queue
            .borrow_mut()
            .cancel_for_target(EventTarget::Cue(cue));
        true
    }

    /// Move a cue, taking it out of the store under its old times first.
    pub fn set_cue_times(&self, cue: CueId, start_time: f64, end_time: f64) -> bool {
        let _scope = self.track_display_update_scope();
        let Some(old) = self.text_tracks.borrow().cue(cue).cloned() else {
            return false;
        };
        let was_stored = self.cue_scheduler.borrow_mut().remove_cue(&old);

        let updated = {
            let mut tracks = self.text_tracks.borrow_mut();
            tracks.set_cue_times(cue, start_time, end_time);
            if was_stored {
                if let Some(cue) = tracks.cue_mut(cue) {
                    cue.is_active = false;
                }
            }
            let enabled = tracks
                .track(old.track)
                .is_some_and(|track| track.mode != TextTrackMode::Disabled);
            tracks.cue(cue).cloned().filter(|_| enabled)
        };
        if let Some(updated) = updated {
            self.cue_scheduler.borrow_mut().add_cue(&updated);
        }
        true
    }

    pub fn cue(&self, cue: CueId) -> Option<TextTrackCue> {
        self.text_tracks.borrow().cue(cue).cloned()
    }

    pub fn cue_is_active(&self, cue: CueId) -> bool {
        self.text_tracks
            .borrow()
            .cue(cue)
            .is_some_and(|cue| cue.is_active)
    }

    /// Active cues in cue order.
    pub fn active_cues(&self) -> Vec<CueId> {
        self.cue_scheduler.borrow().currently_active_cues().to_vec()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-texttrack-mode>
    pub fn set_text_track_mode(&self, track: TrackId, mode: TextTrackMode) {
        let old_mode = {
            let mut tracks = self.text_tracks.borrow_mut();
            let Some(track) = tracks.track_mut(track) else {
                return;
            };
            std::mem::replace(&mut track.mode, mode)
        };
        if old_mode == mode {
            return;
        }
        debug!("Text track {:?} mode {:?} -> {:?}", track, old_mode, mode);

        let _scope = self.track_display_update_scope();
        if mode == TextTrackMode::Disabled {
            self.remove_track_cues(track);
        }
        self.text_track_mode_changed(track);
    }

    fn text_track_mode_changed(&self, track: TrackId) {
        let add_cues = {
            let mut tracks = self.text_tracks.borrow_mut();
            let Some(track) = tracks.track_mut(track) else {
                return;
            };
            track.configured = true;
            track.mode != TextTrackMode::Disabled && cues_are_available(track)
        };
        if add_cues {
            self.add_track_cues(track);
        }
    }

    /// The fetch of a `<track>` made progress.
    pub fn set_text_track_readiness(&self, track: TrackId, readiness: TextTrackReadiness) {
        let add_cues = {
            let mut tracks = self.text_tracks.borrow_mut();
            let Some(track) = tracks.track_mut(track) else {
                return;
            };
            track.readiness = readiness;
            track.mode != TextTrackMode::Disabled && readiness == TextTrackReadiness::Loaded
        };
        if add_cues {
            let _scope = self.track_display_update_scope();
            self.add_track_cues(track);
        }
        self.text_track_ready_state_changed(track, readiness);
    }

    fn text_track_ready_state_changed(&self, track: TrackId, readiness: TextTrackReadiness) {
        let gates_ready_state = self
            .text_tracks_when_resource_selection_began
            .borrow()
            .contains(&track);
        if !gates_ready_state || readiness == TextTrackReadiness::Loading {
            return;
        }
        if let Some(state) = self.with_engine(|engine| engine.ready_state()) {
            self.set_ready_state(state.into());
        }
    }

    fn add_track_cues(&self, track: TrackId) {
        let cues: Vec<TextTrackCue> = self
            .text_tracks
            .borrow()
            .track(track)
            .map(|track| track.cues().to_vec())
            .unwrap_or_default();
        let mut scheduler = self.cue_scheduler.borrow_mut();
        for cue in &cues {
            scheduler.add_cue(cue);
        }
    }

    fn remove_track_cues(&self, track: TrackId) {
        let cues: Vec<TextTrackCue> = self
            .text_tracks
            .borrow()
            .track(track)
            .map(|track| track.cues().to_vec())
            .unwrap_or_default();
        {
            let mut scheduler = self.cue_scheduler.borrow_mut();
            for cue in &cues {
                scheduler.remove_cue(cue);
            }
        }
        let mut tracks = self.text_tracks.borrow_mut();
        for cue in &cues {
            if let Some(cue) = tracks.cue_mut(cue.id) {
                cue.is_active = false;
            }
        }
    }

    /// <https://html.spec.whatwg.org/multipage/#honor-user-preferences-for-automatic-text-track-selection>
    pub(super) fn configure_text_tracks(&self) {
        let mut to_show: Vec<(TrackId, TextTrackMode)> = vec![];
        let mut to_mark: Vec<TrackId> = vec![];
        {
            let tracks = self.text_tracks.borrow();
            let mut shown_groups: Vec<TextTrackKind> = vec![];
            for track in tracks.iter().filter(|track| !track.configured) {
                to_mark.push(track.id);
                if track.track_type != TextTrackType::TrackElement ||
                    !track.is_default ||
                    track.mode != TextTrackMode::Disabled
                {
                    continue;
                }
                if track.kind == TextTrackKind::Metadata {
                    to_show.push((track.id, TextTrackMode::Hidden));
                    continue;
                }
                // Captions and subtitles share a group.
                let group = match track.kind {
                    TextTrackKind::Captions => TextTrackKind::Subtitles,
                    kind => kind,
                };
                if !shown_groups.contains(&group) {
                    shown_groups.push(group);
                    to_show.push((track.id, TextTrackMode::Showing));
                }
            }
        }

        let _scope = self.track_display_update_scope();
        for (track, mode) in to_show {
            self.set_text_track_mode(track, mode);
        }
        let mut tracks = self.text_tracks.borrow_mut();
        for track in to_mark {
            if let Some(track) = tracks.track_mut(track) {
                track.configured = true;
            }
        }
    }

    /// Whether every track that was enabled when resource selection began has
    /// finished loading, successfully or not.
    pub(super) fn text_tracks_are_ready(&self) -> bool {
        let tracks = self.text_tracks.borrow();
        self.text_tracks_when_resource_selection_began
            .borrow()
            .iter()
            .filter_map(|track| tracks.track(*track))
            .all(|track| {
                !matches!(
                    track.readiness,
                    TextTrackReadiness::Loading | TextTrackReadiness::NotLoaded
                )
            })
    }

    /// <https://html.spec.whatwg.org/multipage/#time-marches-on>
    pub(super) fn update_active_text_track_cues(&self, movie_time: f64) {
        if !self.prefs.text_tracks_enabled {
            return;
        }
        let params = CueUpdateParams {
            movie_time,
            last_seek_time: self.last_seek_time.get(),
            have_nothing: self.ready_state.get() == ReadyState::HaveNothing,
            paused: self.paused(),
        };
        let update = {
            let mut tracks = self.text_tracks.borrow_mut();
            self.cue_scheduler.borrow_mut().update(&mut tracks, params)
        };
        let Some(update) = update else {
            return;
        };

        if update.schedule_timeupdate {
            self.schedule_timeupdate_event(false);
        }
        if update.pause && !self.paused() {
            self.pause_internal();
        }
        for event in update.events {
            self.queue_event(event);
        }
    }
}

/// A `<track>` delivers cues while it is still loading.
fn cues_are_available(track: &TextTrack) -> bool {
    match track.readiness {
        TextTrackReadiness::Loaded => true,
        TextTrackReadiness::Loading => track.track_type == TextTrackType::TrackElement,
        TextTrackReadiness::NotLoaded | TextTrackReadiness::FailedToLoad => false,
    }
}
