/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The loading and playback state machine behind `<audio>` and `<video>`.
//!
//! A [`MediaElement`] is driven entirely from its owner thread. The host
//! feeds it time through a [`WallClock`], hands it a [`DocumentContext`] for
//! everything that lives in the DOM, and calls [`MediaElement::spin`] (or the
//! individual steps it is made of) to fire timers, handle engine callbacks and
//! dispatch queued events.

#![deny(unsafe_code)]

pub mod cached_clock;
pub mod cue_scheduler;
pub mod cue_tree;
pub mod document;
pub mod error;
pub mod event_queue;
mod htmlmediaelement;
pub mod media_controller;
pub mod media_fragment;
pub mod prefs;
pub mod resource_selection;
pub mod text_tracks;
pub mod timers;

pub use cached_clock::{ManualClock, MonotonicClock, WallClock};
pub use document::{DocumentContext, SourceCandidate, SourceId};
pub use error::{Error, ErrorResult, Fallible, MediaError, MediaErrorCode};
pub use event_queue::{EventTarget, MediaEvent, MediaEventName};
pub use htmlmediaelement::{
    BehaviorRestrictions, DelayedActionType, DisplayMode, MediaElement, MediaElementContext,
    MediaElementKind, NetworkState, ReadyState, TrackDisplayUpdateScope,
};
pub use media_controller::{MediaController, MediaElementId, MediaGroupRegistry};
pub use prefs::MediaPrefs;
pub use resource_selection::LoadState;
