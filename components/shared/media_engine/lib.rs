/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The interface between a media element and a playback engine.
//!
//! An engine fetches, demuxes, decodes and renders a single resource. It never
//! calls back into the element directly: state changes are reported as
//! [`EngineEvent`]s over the channel handed to
//! [`MediaEngineBackend::create_engine`], and the element drains that channel
//! on its owner thread.

#![deny(unsafe_code)]

mod content_type;
mod time_ranges;

pub use content_type::ContentType;
use crossbeam_channel::Sender;
use strum::{EnumString, IntoStaticStr};
pub use time_ranges::{TimeRange, TimeRanges};
use url::Url;

/// Network activity as reported by the engine. Unlike the element's own
/// network state this carries the terminal error outcomes of a fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineNetworkState {
    Empty,
    Idle,
    Loading,
    Loaded,
    /// The resource could not be demuxed or no track is playable.
    FormatError,
    /// The fetch failed.
    NetworkError,
    /// The resource was fetched but could not be decoded.
    DecodeError,
}

/// <https://html.spec.whatwg.org/multipage/#ready-states>
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum EngineReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// <https://html.spec.whatwg.org/multipage/#attr-media-preload>
#[derive(Clone, Copy, Debug, EnumString, Eq, IntoStaticStr, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Preload {
    None,
    Metadata,
    Auto,
}

impl Preload {
    /// Parse the `preload` content attribute. A missing or invalid value
    /// behaves as `auto`.
    pub fn from_attribute(value: Option<&str>) -> Preload {
        value
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(Preload::Auto)
    }
}

/// How confident an engine is that it can play a given type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SupportsMediaType {
    No,
    Maybe,
    Probably,
}

impl SupportsMediaType {
    /// The string returned by `canPlayType()`.
    pub fn as_can_play_type(self) -> &'static str {
        match self {
            SupportsMediaType::No => "",
            SupportsMediaType::Maybe => "maybe",
            SupportsMediaType::Probably => "probably",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// Backend specific error.
    Backend(String),
    /// A command was issued before any resource was loaded.
    NotLoaded,
    /// Tried to seek out of range.
    SeekOutOfRange,
}

/// Callbacks from the engine. They are delivered in the order the engine
/// produced them and only ever handled on the element's owner thread.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    NetworkStateChanged(EngineNetworkState),
    ReadyStateChanged(EngineReadyState),
    /// The playback position moved discontinuously: a seek completed or the
    /// end of the media was reached.
    TimeChanged,
    DurationChanged,
    RateChanged,
    VolumeChanged,
    MuteChanged,
    /// The engine paused or resumed on its own, for example from a media key.
    PlaybackStateChanged,
    SawUnsupportedTracks,
    /// Decryption keys are required to continue.
    KeyNeeded { key_system: String, init_data: Vec<u8> },
}

/// A single resource being played.
///
/// Times are in seconds. An unknown duration is `NaN`, an unbounded stream
/// has an infinite duration.
pub trait PlaybackEngine {
    /// Start loading `url`. Returns false if the engine refuses the resource
    /// outright, without any asynchronous failure being reported later.
    fn load(&self, url: &Url, content_type: &ContentType, key_system: &str) -> bool;
    fn cancel_load(&self);
    fn prepare_to_play(&self);
    fn set_preload(&self, preload: Preload);

    fn play(&self) -> Result<(), EngineError>;
    fn pause(&self) -> Result<(), EngineError>;
    fn paused(&self) -> bool;

    fn seek(&self, time: f64) -> Result<(), EngineError>;
    fn seeking(&self) -> bool;

    fn set_rate(&self, rate: f64) -> Result<(), EngineError>;
    fn rate(&self) -> f64;
    fn set_volume(&self, volume: f64) -> Result<(), EngineError>;
    fn volume(&self) -> f64;
    fn set_muted(&self, muted: bool) -> Result<(), EngineError>;
    fn muted(&self) -> bool;

    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn start_time(&self) -> f64 {
        0.0
    }
    /// Round `time` to the closest value representable in the engine's own
    /// timescale.
    fn media_time_for_time_value(&self, time: f64) -> f64 {
        time
    }
    /// How long, in seconds, a position sample may be extrapolated before it
    /// has to be refreshed. Zero disables extrapolation.
    fn maximum_duration_to_cache_media_time(&self) -> f64 {
        0.0
    }

    fn buffered(&self) -> TimeRanges;
    fn seekable(&self) -> TimeRanges;

    fn network_state(&self) -> EngineNetworkState;
    fn ready_state(&self) -> EngineReadyState;
    /// Whether any data arrived since the last call.
    fn did_loading_progress(&self) -> bool;
}

/// Creates engines and answers capability queries.
pub trait MediaEngineBackend {
    fn create_engine(&self, events: Sender<EngineEvent>) -> Box<dyn PlaybackEngine>;
    fn supports_type(&self, content_type: &ContentType, key_system: &str) -> SupportsMediaType;
}
