/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Text tracks and their cues, owned by the media element.
//!
//! <https://html.spec.whatwg.org/multipage/#text-track>

use std::cmp::Ordering;
use std::collections::HashMap;

use strum::{EnumString, IntoStaticStr};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrackId(u32);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CueId(u32);

impl CueId {
    pub fn from_raw(id: u32) -> CueId {
        CueId(id)
    }
}

/// <https://html.spec.whatwg.org/multipage/#text-track-kind>
#[derive(Clone, Copy, Debug, Default, EnumString, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum TextTrackKind {
    #[default]
    Subtitles,
    Captions,
    Descriptions,
    Chapters,
    Metadata,
}

/// <https://html.spec.whatwg.org/multipage/#text-track-mode>
#[derive(Clone, Copy, Debug, EnumString, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum TextTrackMode {
    Disabled,
    Hidden,
    Showing,
}

/// <https://html.spec.whatwg.org/multipage/#text-track-readiness-state>
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextTrackReadiness {
    NotLoaded,
    Loading,
    Loaded,
    FailedToLoad,
}

/// Where a track came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextTrackType {
    /// `addTextTrack()`.
    AddTrack,
    /// A `<track>` child.
    TrackElement,
    /// Carried inside the media resource.
    InBand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextTrackCue {
    pub id: CueId,
    pub track: TrackId,
    pub identifier: String,
    pub start_time: f64,
    pub end_time: f64,
    pub pause_on_exit: bool,
    pub is_active: bool,
}

#[derive(Clone, Debug)]
pub struct TextTrack {
    pub id: TrackId,
    pub track_type: TextTrackType,
    pub kind: TextTrackKind,
    pub label: String,
    pub language: String,
    pub mode: TextTrackMode,
    pub readiness: TextTrackReadiness,
    /// The `default` attribute of a `<track>` element.
    pub is_default: bool,
    /// Set once automatic configuration has considered this track.
    pub configured: bool,
    /// Kept sorted by start time, then by end time with the longest first.
    cues: Vec<TextTrackCue>,
}

impl TextTrack {
    pub fn cues(&self) -> &[TextTrackCue] {
        &self.cues
    }

    fn cue_position(&self, cue: CueId) -> Option<usize> {
        self.cues.iter().position(|candidate| candidate.id == cue)
    }

    /// Insert after every cue that sorts equal to `cue`.
    fn insert_sorted(&mut self, cue: TextTrackCue) {
        let index = self
            .cues
            .partition_point(|existing| compare_cue_times(existing, &cue) != Ordering::Greater);
        self.cues.insert(index, cue);
    }
}

/// Sorts cues by start time, then by track position, then by position in
/// the track.
#[derive(Clone, Copy, Debug)]
pub struct CueOrderKey {
    pub start_time: f64,
    pub track_index: usize,
    pub cue_index: usize,
}

impl CueOrderKey {
    const MISSING: CueOrderKey = CueOrderKey {
        start_time: f64::INFINITY,
        track_index: usize::MAX,
        cue_index: usize::MAX,
    };
}

impl PartialEq for CueOrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CueOrderKey {}

impl PartialOrd for CueOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CueOrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_time
            .total_cmp(&other.start_time)
            .then_with(|| self.track_index.cmp(&other.track_index))
            .then_with(|| self.cue_index.cmp(&other.cue_index))
    }
}

/// The element's list of text tracks, in the order they were added.
#[derive(Default)]
pub struct TextTrackList {
    tracks: Vec<TextTrack>,
    /// The track each live cue belongs to.
    cue_tracks: HashMap<CueId, TrackId>,
    next_track_id: u32,
    next_cue_id: u32,
}

impl TextTrackList {
    pub fn new() -> TextTrackList {
        TextTrackList::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextTrack> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TextTrack> {
        self.tracks.iter_mut()
    }

    pub fn add_track(
        &mut self,
        track_type: TextTrackType,
        kind: TextTrackKind,
        label: &str,
        language: &str,
    ) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        let (mode, readiness) = match track_type {
            TextTrackType::TrackElement => (TextTrackMode::Disabled, TextTrackReadiness::NotLoaded),
            TextTrackType::AddTrack | TextTrackType::InBand => {
                (TextTrackMode::Hidden, TextTrackReadiness::Loaded)
            },
        };
        self.tracks.push(TextTrack {
            id,
            track_type,
            kind,
            label: label.to_owned(),
            language: language.to_owned(),
            mode,
            readiness,
            is_default: false,
            configured: false,
            cues: vec![],
        });
        id
    }

    pub fn remove_track(&mut self, track: TrackId) -> Option<TextTrack> {
        let index = self.track_index(track)?;
        let removed = self.tracks.remove(index);
        for cue in &removed.cues {
            self.cue_tracks.remove(&cue.id);
        }
        Some(removed)
    }

    pub fn track(&self, track: TrackId) -> Option<&TextTrack> {
        self.tracks.iter().find(|candidate| candidate.id == track)
    }

    pub fn track_mut(&mut self, track: TrackId) -> Option<&mut TextTrack> {
        self.tracks.iter_mut().find(|candidate| candidate.id == track)
    }

    /// Position of the track in the list.
    pub fn track_index(&self, track: TrackId) -> Option<usize> {
        self.tracks.iter().position(|candidate| candidate.id == track)
    }

    pub fn add_cue(
        &mut self,
        track: TrackId,
        identifier: &str,
        start_time: f64,
        end_time: f64,
        pause_on_exit: bool,
    ) -> Option<CueId> {
        let id = CueId(self.next_cue_id);
        let track = self.track_mut(track)?;
        let track_id = track.id;
        track.insert_sorted(TextTrackCue {
            id,
            track: track_id,
            identifier: identifier.to_owned(),
            start_time,
            end_time,
            pause_on_exit,
            is_active: false,
        });
        self.cue_tracks.insert(id, track_id);
        self.next_cue_id += 1;
        Some(id)
    }

    fn track_of_cue_mut(&mut self, cue: CueId) -> Option<&mut TextTrack> {
        let track = *self.cue_tracks.get(&cue)?;
        self.track_mut(track)
    }

    pub fn remove_cue(&mut self, cue: CueId) -> Option<TextTrackCue> {
        let track = self.track_of_cue_mut(cue)?;
        let index = track.cue_position(cue)?;
        let removed = track.cues.remove(index);
        self.cue_tracks.remove(&cue);
        Some(removed)
    }

    pub fn cue(&self, cue: CueId) -> Option<&TextTrackCue> {
        let track = self.track(*self.cue_tracks.get(&cue)?)?;
        track.cues.iter().find(|candidate| candidate.id == cue)
    }

    pub fn cue_mut(&mut self, cue: CueId) -> Option<&mut TextTrackCue> {
        let track = self.track_of_cue_mut(cue)?;
        track.cues.iter_mut().find(|candidate| candidate.id == cue)
    }

    /// Change the times of a cue, keeping its track sorted.
    pub fn set_cue_times(&mut self, cue: CueId, start_time: f64, end_time: f64) -> bool {
        let Some(track) = self.track_of_cue_mut(cue) else {
            return false;
        };
        let Some(index) = track.cue_position(cue) else {
            return false;
        };
        let mut moved = track.cues.remove(index);
        moved.start_time = start_time;
        moved.end_time = end_time;
        track.insert_sorted(moved);
        true
    }

    pub fn cue_order_key(&self, cue: CueId) -> CueOrderKey {
        let Some(&track) = self.cue_tracks.get(&cue) else {
            return CueOrderKey::MISSING;
        };
        let Some(track_index) = self.track_index(track) else {
            return CueOrderKey::MISSING;
        };
        let cues = &self.tracks[track_index].cues;
        match cues.iter().position(|candidate| candidate.id == cue) {
            Some(cue_index) => CueOrderKey {
                start_time: cues[cue_index].start_time,
                track_index,
                cue_index,
            },
            None => CueOrderKey::MISSING,
        }
    }
}

/// Start time, then end time with the longest cue first.
fn compare_cue_times(a: &TextTrackCue, b: &TextTrackCue) -> Ordering {
    a.start_time
        .total_cmp(&b.start_time)
        .then_with(|| b.end_time.total_cmp(&a.end_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_are_kept_in_track_order() {
        let mut tracks = TextTrackList::new();
        let track = tracks.add_track(TextTrackType::AddTrack, TextTrackKind::Captions, "", "en");
        let late = tracks.add_cue(track, "late", 4.0, 5.0, false).unwrap();
        let short = tracks.add_cue(track, "short", 1.0, 2.0, false).unwrap();
        let long = tracks.add_cue(track, "long", 1.0, 3.0, false).unwrap();

        assert_eq!(tracks.cue_order_key(long).cue_index, 0);
        assert_eq!(tracks.cue_order_key(short).cue_index, 1);
        assert_eq!(tracks.cue_order_key(late).cue_index, 2);

        assert!(tracks.set_cue_times(late, 0.0, 1.0));
        let key = tracks.cue_order_key(late);
        assert_eq!((key.start_time, key.track_index, key.cue_index), (0.0, 0, 0));
        assert_eq!(tracks.remove_cue(short).map(|cue| cue.identifier), Some("short".into()));
        assert_eq!(tracks.cue(short), None);
        assert!(!tracks.set_cue_times(short, 0.0, 1.0));
    }

    #[test]
    fn cues_with_equal_times_keep_insertion_order() {
        let mut tracks = TextTrackList::new();
        let first_track = tracks.add_track(TextTrackType::AddTrack, TextTrackKind::Captions, "", "");
        let second_track = tracks.add_track(TextTrackType::AddTrack, TextTrackKind::Captions, "", "");
        let later = tracks.add_cue(second_track, "later", 1.0, 2.0, false).unwrap();
        let first = tracks.add_cue(first_track, "first", 1.0, 2.0, false).unwrap();
        let second = tracks.add_cue(first_track, "second", 1.0, 2.0, false).unwrap();

        assert_eq!(tracks.cue_order_key(first).cue_index, 0);
        assert_eq!(tracks.cue_order_key(second).cue_index, 1);
        assert!(tracks.cue_order_key(first) < tracks.cue_order_key(second));
        assert!(tracks.cue_order_key(second) < tracks.cue_order_key(later));

        tracks.remove_track(first_track);
        assert_eq!(tracks.cue(first), None);
        assert_eq!(tracks.cue_order_key(first), CueOrderKey::MISSING);
        assert_eq!(tracks.cue_order_key(later).track_index, 0);
    }

    #[test]
    fn track_element_tracks_start_disabled() {
        let mut tracks = TextTrackList::new();
        let added = tracks.add_track(TextTrackType::AddTrack, TextTrackKind::Subtitles, "", "");
        let element = tracks.add_track(TextTrackType::TrackElement, TextTrackKind::Subtitles, "", "");
        assert_eq!(tracks.track(added).unwrap().mode, TextTrackMode::Hidden);
        let element_track = tracks.track(element).unwrap();
        assert_eq!(element_track.mode, TextTrackMode::Disabled);
        assert_eq!(element_track.readiness, TextTrackReadiness::NotLoaded);
        assert_eq!(tracks.track_index(element), Some(1));
        assert!(tracks.add_cue(TrackId(42), "", 0.0, 1.0, false).is_none());
    }

    #[test]
    fn kinds_parse_from_attributes() {
        assert_eq!("chapters".parse::<TextTrackKind>(), Ok(TextTrackKind::Chapters));
        assert!("karaoke".parse::<TextTrackKind>().is_err());
    }
}
