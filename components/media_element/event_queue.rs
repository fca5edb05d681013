/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Events queued by a media element and fired on a later turn.
//!
//! Algorithms only ever enqueue. The owner drains the queue in turns; a turn
//! covers the events that were pending when it started, so anything a
//! listener causes to be queued waits for the next turn. Cancelling bumps a
//! generation, which also ends the turn in progress.

use std::collections::VecDeque;

use log::debug;
use strum::{Display, IntoStaticStr};

use crate::document::SourceId;
use crate::text_tracks::{CueId, TrackId};

/// The names of the events a media element fires.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum MediaEventName {
    LoadStart,
    Progress,
    Suspend,
    Abort,
    Error,
    Emptied,
    Stalled,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    CanPlayThrough,
    Playing,
    Waiting,
    Seeking,
    Seeked,
    TimeUpdate,
    Ended,
    DurationChange,
    RateChange,
    VolumeChange,
    Play,
    Pause,
    Enter,
    Exit,
    CueChange,
    NeedKey,
}

/// Where an event is dispatched.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventTarget {
    Element,
    Source(SourceId),
    Track(TrackId),
    /// The `<track>` element that owns a track.
    TrackElement(TrackId),
    Cue(CueId),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MediaEvent {
    pub name: MediaEventName,
    pub target: EventTarget,
}

impl MediaEvent {
    pub fn new(name: MediaEventName, target: EventTarget) -> MediaEvent {
        MediaEvent { name, target }
    }

    pub fn simple(name: MediaEventName) -> MediaEvent {
        MediaEvent::new(name, EventTarget::Element)
    }
}

/// The part of the queue a single drain is allowed to dispatch: every event
/// queued before the turn began.
#[derive(Clone, Copy, Debug)]
pub struct EventTurn {
    end: u64,
    generation: u32,
}

#[derive(Default)]
pub struct AsyncEventQueue {
    /// Events paired with the order they were queued in.
    pending: VecDeque<(u64, MediaEvent)>,
    next_sequence: u64,
    generation: u32,
    dispatching_can_play: bool,
}

impl AsyncEventQueue {
    pub fn new() -> AsyncEventQueue {
        AsyncEventQueue::default()
    }

    pub fn enqueue(&mut self, event: MediaEvent) {
        debug!("Queueing {} on {:?}", event.name, event.target);
        self.pending.push_back((self.next_sequence, event));
        self.next_sequence += 1;
    }

    /// Drop every pending event without firing it, and end the current turn.
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            debug!("Cancelling {} queued media events", self.pending.len());
        }
        self.pending.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Drop pending events for one target, for example a cue that was removed.
    pub fn cancel_for_target(&mut self, target: EventTarget) {
        self.pending.retain(|(_, event)| event.target != target);
    }

    pub fn begin_turn(&self) -> EventTurn {
        EventTurn {
            end: self.next_sequence,
            generation: self.generation,
        }
    }

    pub fn next_in_turn(&mut self, turn: &EventTurn) -> Option<MediaEvent> {
        if turn.generation != self.generation {
            return None;
        }
        match self.pending.front() {
            Some((sequence, _)) if *sequence < turn.end => {
                self.pending.pop_front().map(|(_, event)| event)
            },
            _ => None,
        }
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &MediaEvent> {
        self.pending.iter().map(|(_, event)| event)
    }

    pub fn set_dispatching_can_play(&mut self, dispatching: bool) {
        self.dispatching_can_play = dispatching;
    }

    /// Whether a `canplay` listener is running right now.
    pub fn is_dispatching_can_play(&self) -> bool {
        self.dispatching_can_play
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_dom_names() {
        assert_eq!(MediaEventName::LoadedMetadata.to_string(), "loadedmetadata");
        assert_eq!(MediaEventName::CanPlayThrough.to_string(), "canplaythrough");
        let name: &'static str = MediaEventName::CueChange.into();
        assert_eq!(name, "cuechange");
    }

    #[test]
    fn events_queued_during_a_turn_wait_for_the_next() {
        let mut queue = AsyncEventQueue::new();
        queue.enqueue(MediaEvent::simple(MediaEventName::LoadStart));
        queue.enqueue(MediaEvent::simple(MediaEventName::Progress));

        let turn = queue.begin_turn();
        assert_eq!(
            queue.next_in_turn(&turn).map(|event| event.name),
            Some(MediaEventName::LoadStart)
        );
        queue.enqueue(MediaEvent::simple(MediaEventName::Suspend));
        assert_eq!(
            queue.next_in_turn(&turn).map(|event| event.name),
            Some(MediaEventName::Progress)
        );
        assert_eq!(queue.next_in_turn(&turn), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancelling_ends_the_turn() {
        let mut queue = AsyncEventQueue::new();
        queue.enqueue(MediaEvent::simple(MediaEventName::Play));
        queue.enqueue(MediaEvent::simple(MediaEventName::Playing));

        let turn = queue.begin_turn();
        assert!(queue.next_in_turn(&turn).is_some());
        queue.cancel_all();
        queue.enqueue(MediaEvent::simple(MediaEventName::Emptied));
        assert_eq!(queue.next_in_turn(&turn), None);
        assert!(queue.has_pending_events());
    }

    #[test]
    fn cancelling_a_target_mid_turn_keeps_later_events_back() {
        let mut queue = AsyncEventQueue::new();
        let source = EventTarget::Source(SourceId(0));
        queue.enqueue(MediaEvent::simple(MediaEventName::LoadStart));
        queue.enqueue(MediaEvent::new(MediaEventName::Error, source));

        let turn = queue.begin_turn();
        assert_eq!(
            queue.next_in_turn(&turn).map(|event| event.name),
            Some(MediaEventName::LoadStart)
        );
        queue.cancel_for_target(source);
        queue.enqueue(MediaEvent::simple(MediaEventName::VolumeChange));
        assert_eq!(queue.next_in_turn(&turn), None);

        let turn = queue.begin_turn();
        assert_eq!(
            queue.next_in_turn(&turn).map(|event| event.name),
            Some(MediaEventName::VolumeChange)
        );
    }

    #[test]
    fn cancel_for_target_keeps_other_events() {
        let mut queue = AsyncEventQueue::new();
        let cue = EventTarget::Cue(CueId::from_raw(7));
        queue.enqueue(MediaEvent::new(MediaEventName::Enter, cue));
        queue.enqueue(MediaEvent::simple(MediaEventName::TimeUpdate));
        queue.cancel_for_target(cue);
        let names: Vec<_> = queue.pending().map(|event| event.name).collect();
        assert_eq!(names, vec![MediaEventName::TimeUpdate]);
    }
}
