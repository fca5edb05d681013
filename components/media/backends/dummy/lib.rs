/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A playback engine backend with no decoder behind it.
//!
//! Every command the element issues is recorded, and all state the element
//! observes (network and ready state, position, duration, seekable ranges) is
//! set from the outside through a [`DummyEngineHandle`]. Hosts without a real
//! decoder use it to get a well-behaved element, and tests use it to script
//! engine callbacks.

#![deny(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use crossbeam_channel::Sender;
use log::debug;
use media_engine_traits::{
    ContentType, EngineError, EngineEvent, EngineNetworkState, EngineReadyState,
    MediaEngineBackend, PlaybackEngine, Preload, SupportsMediaType, TimeRanges,
};
use url::Url;

/// A command received by a [`DummyEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Load(Url),
    CancelLoad,
    PrepareToPlay,
    SetPreload(Preload),
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    SetVolume(f64),
    SetMuted(bool),
}

struct DummyEngineState {
    events: Sender<EngineEvent>,
    refuse_load: bool,
    url: Option<Url>,
    content_type: ContentType,
    key_system: String,
    calls: Vec<EngineCall>,
    paused: bool,
    seeking: bool,
    rate: f64,
    volume: f64,
    muted: bool,
    current_time: f64,
    duration: f64,
    start_time: f64,
    max_cache_duration: f64,
    buffered: TimeRanges,
    seekable: TimeRanges,
    network_state: EngineNetworkState,
    ready_state: EngineReadyState,
    loading_progress: bool,
}

pub struct DummyEngine {
    state: Rc<RefCell<DummyEngineState>>,
}

impl DummyEngine {
    fn record(&self, call: EngineCall) {
        debug!("Dummy engine received {:?}", call);
        self.state.borrow_mut().calls.push(call);
    }
}

impl PlaybackEngine for DummyEngine {
    fn load(&self, url: &Url, content_type: &ContentType, key_system: &str) -> bool {
        self.record(EngineCall::Load(url.clone()));
        let mut state = self.state.borrow_mut();
        if state.refuse_load {
            return false;
        }
        state.url = Some(url.clone());
        state.content_type = content_type.clone();
        state.key_system = key_system.to_owned();
        true
    }

    fn cancel_load(&self) {
        self.record(EngineCall::CancelLoad);
    }

    fn prepare_to_play(&self) {
        self.record(EngineCall::PrepareToPlay);
    }

    fn set_preload(&self, preload: Preload) {
        self.record(EngineCall::SetPreload(preload));
    }

    fn play(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Play);
        self.state.borrow_mut().paused = false;
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Pause);
        self.state.borrow_mut().paused = true;
        Ok(())
    }

    fn paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn seek(&self, time: f64) -> Result<(), EngineError> {
        self.record(EngineCall::Seek(time));
        let mut state = self.state.borrow_mut();
        if state.url.is_none() {
            return Err(EngineError::NotLoaded);
        }
        if time < state.start_time || time > state.duration {
            return Err(EngineError::SeekOutOfRange);
        }
        state.seeking = true;
        state.current_time = time;
        Ok(())
    }

    fn seeking(&self) -> bool {
        self.state.borrow().seeking
    }

    fn set_rate(&self, rate: f64) -> Result<(), EngineError> {
        self.record(EngineCall::SetRate(rate));
        self.state.borrow_mut().rate = rate;
        Ok(())
    }

    fn rate(&self) -> f64 {
        self.state.borrow().rate
    }

    fn set_volume(&self, volume: f64) -> Result<(), EngineError> {
        self.record(EngineCall::SetVolume(volume));
        self.state.borrow_mut().volume = volume;
        Ok(())
    }

    fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    fn set_muted(&self, muted: bool) -> Result<(), EngineError> {
        self.record(EngineCall::SetMuted(muted));
        self.state.borrow_mut().muted = muted;
        Ok(())
    }

    fn muted(&self) -> bool {
        self.state.borrow().muted
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().current_time
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn start_time(&self) -> f64 {
        self.state.borrow().start_time
    }

    fn maximum_duration_to_cache_media_time(&self) -> f64 {
        self.state.borrow().max_cache_duration
    }

    fn buffered(&self) -> TimeRanges {
        self.state.borrow().buffered.clone()
    }

    fn seekable(&self) -> TimeRanges {
        self.state.borrow().seekable.clone()
    }

    fn network_state(&self) -> EngineNetworkState {
        self.state.borrow().network_state
    }

    fn ready_state(&self) -> EngineReadyState {
        self.state.borrow().ready_state
    }

    fn did_loading_progress(&self) -> bool {
        let mut state = self.state.borrow_mut();
        std::mem::replace(&mut state.loading_progress, false)
    }
}

/// Drives a [`DummyEngine`] from outside: sets the state it reports and
/// sends the matching callbacks.
#[derive(Clone)]
pub struct DummyEngineHandle {
    state: Rc<RefCell<DummyEngineState>>,
}

impl DummyEngineHandle {
    fn send(&self, event: EngineEvent) {
        let _ = self.state.borrow().events.send(event);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn url(&self) -> Option<Url> {
        self.state.borrow().url.clone()
    }

    pub fn content_type(&self) -> ContentType {
        self.state.borrow().content_type.clone()
    }

    pub fn key_system(&self) -> String {
        self.state.borrow().key_system.clone()
    }

    pub fn paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn rate(&self) -> f64 {
        self.state.borrow().rate
    }

    pub fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    pub fn muted(&self) -> bool {
        self.state.borrow().muted
    }

    pub fn report_network_state(&self, network_state: EngineNetworkState) {
        self.state.borrow_mut().network_state = network_state;
        self.send(EngineEvent::NetworkStateChanged(network_state));
    }

    pub fn report_ready_state(&self, ready_state: EngineReadyState) {
        self.state.borrow_mut().ready_state = ready_state;
        self.send(EngineEvent::ReadyStateChanged(ready_state));
    }

    /// Set the duration and make the whole resource seekable.
    pub fn report_duration(&self, duration: f64) {
        {
            let mut state = self.state.borrow_mut();
            state.duration = duration;
            state.seekable = TimeRanges::new();
            if duration.is_finite() {
                let start_time = state.start_time;
                state.seekable.add(start_time, duration);
            }
        }
        self.send(EngineEvent::DurationChanged);
    }

    /// Move the position without telling the element, as continuous playback
    /// does.
    pub fn set_current_time(&self, time: f64) {
        self.state.borrow_mut().current_time = time;
    }

    pub fn report_time_changed(&self) {
        self.send(EngineEvent::TimeChanged);
    }

    /// Complete an outstanding seek.
    pub fn report_seek_completed(&self) {
        self.state.borrow_mut().seeking = false;
        self.send(EngineEvent::TimeChanged);
    }

    pub fn report_rate(&self, rate: f64) {
        self.state.borrow_mut().rate = rate;
        self.send(EngineEvent::RateChanged);
    }

    pub fn report_volume(&self, volume: f64) {
        self.state.borrow_mut().volume = volume;
        self.send(EngineEvent::VolumeChanged);
    }

    pub fn report_muted(&self, muted: bool) {
        self.state.borrow_mut().muted = muted;
        self.send(EngineEvent::MuteChanged);
    }

    pub fn report_playback_state(&self, paused: bool) {
        self.state.borrow_mut().paused = paused;
        self.send(EngineEvent::PlaybackStateChanged);
    }

    pub fn report_unsupported_tracks(&self) {
        self.send(EngineEvent::SawUnsupportedTracks);
    }

    pub fn report_key_needed(&self, key_system: &str, init_data: Vec<u8>) {
        self.send(EngineEvent::KeyNeeded {
            key_system: key_system.to_owned(),
            init_data,
        });
    }

    pub fn set_seekable(&self, seekable: TimeRanges) {
        self.state.borrow_mut().seekable = seekable;
    }

    pub fn set_buffered(&self, buffered: TimeRanges) {
        self.state.borrow_mut().buffered = buffered;
    }

    pub fn set_start_time(&self, start_time: f64) {
        self.state.borrow_mut().start_time = start_time;
    }

    /// Whether the next progress poll reports that data arrived.
    pub fn set_loading_progress(&self, progress: bool) {
        self.state.borrow_mut().loading_progress = progress;
    }

    pub fn set_max_cache_duration(&self, duration: f64) {
        self.state.borrow_mut().max_cache_duration = duration;
    }
}

/// Hands out [`DummyEngine`]s and keeps a handle to each one it created.
#[derive(Default)]
pub struct DummyBackend {
    supported_types: Vec<String>,
    supported_key_systems: Vec<String>,
    refuse_loads: bool,
    engines: RefCell<Vec<DummyEngineHandle>>,
}

impl DummyBackend {
    pub fn new() -> DummyBackend {
        DummyBackend::default()
    }

    /// A backend claiming support for the given `type/subtype` essences.
    pub fn with_supported_types(types: &[&str]) -> DummyBackend {
        DummyBackend {
            supported_types: types.iter().map(|ty| ty.to_ascii_lowercase()).collect(),
            ..DummyBackend::default()
        }
    }

    pub fn support_key_system(&mut self, key_system: &str) {
        self.supported_key_systems.push(key_system.to_owned());
    }

    /// Make every future `load()` fail synchronously.
    pub fn refuse_loads(&mut self, refuse: bool) {
        self.refuse_loads = refuse;
    }

    pub fn engine_count(&self) -> usize {
        self.engines.borrow().len()
    }

    /// The most recently created engine.
    pub fn current_engine(&self) -> Option<DummyEngineHandle> {
        self.engines.borrow().last().cloned()
    }
}

impl MediaEngineBackend for DummyBackend {
    fn create_engine(&self, events: Sender<EngineEvent>) -> Box<dyn PlaybackEngine> {
        let state = Rc::new(RefCell::new(DummyEngineState {
            events,
            refuse_load: self.refuse_loads,
            url: None,
            content_type: ContentType::default(),
            key_system: String::new(),
            calls: vec![],
            paused: true,
            seeking: false,
            rate: 1.0,
            volume: 1.0,
            muted: false,
            current_time: 0.0,
            duration: f64::NAN,
            start_time: 0.0,
            max_cache_duration: 0.0,
            buffered: TimeRanges::new(),
            seekable: TimeRanges::new(),
            network_state: EngineNetworkState::Empty,
            ready_state: EngineReadyState::HaveNothing,
            loading_progress: false,
        }));
        self.engines.borrow_mut().push(DummyEngineHandle {
            state: state.clone(),
        });
        Box::new(DummyEngine { state })
    }

    fn supports_type(&self, content_type: &ContentType, key_system: &str) -> SupportsMediaType {
        if !key_system.is_empty() &&
            !self
                .supported_key_systems
                .iter()
                .any(|supported| supported == key_system)
        {
            return SupportsMediaType::No;
        }
        let Some(essence) = content_type.essence() else {
            return SupportsMediaType::No;
        };
        if !self.supported_types.contains(&essence) {
            return SupportsMediaType::No;
        }
        if content_type.codecs().is_some() {
            SupportsMediaType::Probably
        } else {
            SupportsMediaType::Maybe
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_only_listed_types() {
        let backend = DummyBackend::with_supported_types(&["video/webm"]);
        let webm = ContentType::new("video/webm");
        let with_codecs = ContentType::new("video/webm; codecs=vp9");
        let mp4 = ContentType::new("video/mp4");
        assert_eq!(backend.supports_type(&webm, ""), SupportsMediaType::Maybe);
        assert_eq!(
            backend.supports_type(&with_codecs, ""),
            SupportsMediaType::Probably
        );
        assert_eq!(backend.supports_type(&mp4, ""), SupportsMediaType::No);
        assert_eq!(
            backend.supports_type(&webm, "org.w3.clearkey"),
            SupportsMediaType::No
        );
    }

    #[test]
    fn key_systems_must_be_registered() {
        let mut backend = DummyBackend::with_supported_types(&["video/webm"]);
        backend.support_key_system("org.w3.clearkey");
        let webm = ContentType::new("video/webm");
        assert_eq!(
            backend.supports_type(&webm, "org.w3.clearkey"),
            SupportsMediaType::Maybe
        );
        assert_eq!(
            backend.supports_type(&webm, "com.example.drm"),
            SupportsMediaType::No
        );
    }

    #[test]
    fn handle_reports_through_the_channel() {
        let backend = DummyBackend::new();
        let (sender, receiver) = crossbeam_channel::unbounded();
        let engine = backend.create_engine(sender);
        let handle = backend.current_engine().unwrap();

        handle.report_ready_state(EngineReadyState::HaveMetadata);
        assert_eq!(engine.ready_state(), EngineReadyState::HaveMetadata);
        assert_eq!(
            receiver.try_recv(),
            Ok(EngineEvent::ReadyStateChanged(EngineReadyState::HaveMetadata))
        );

        assert_eq!(engine.seek(3.0), Err(EngineError::NotLoaded));
        let url = Url::parse("https://example.com/a.webm").unwrap();
        assert!(engine.load(&url, &ContentType::default(), ""));
        assert_eq!(engine.seek(3.0), Ok(()));
        assert!(engine.seeking());
        handle.report_seek_completed();
        assert!(!engine.seeking());
        assert_eq!(
            handle.calls(),
            vec![
                EngineCall::Seek(3.0),
                EngineCall::Load(url),
                EngineCall::Seek(3.0)
            ]
        );
    }

    #[test]
    fn seeks_past_the_duration_are_refused() {
        let backend = DummyBackend::new();
        let (sender, _receiver) = crossbeam_channel::unbounded();
        let engine = backend.create_engine(sender);
        let handle = backend.current_engine().unwrap();
        let url = Url::parse("https://example.com/a.webm").unwrap();
        assert!(engine.load(&url, &ContentType::default(), ""));

        handle.report_duration(5.0);
        assert_eq!(engine.seekable(), TimeRanges::from(vec![0.0..5.0]));
        assert_eq!(engine.seek(6.0), Err(EngineError::SeekOutOfRange));
        assert_eq!(engine.seek(-1.0), Err(EngineError::SeekOutOfRange));
        assert!(!engine.seeking());
        assert_eq!(engine.seek(5.0), Ok(()));
        assert_eq!(engine.current_time(), 5.0);
    }
}
