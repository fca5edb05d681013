/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The media element: resource selection, the network and ready state
//! machine, play/pause and the plumbing between the element, its playback
//! engine and its group controller.
//!
//! All methods take `&self`. State lives in `Cell`s and `RefCell`s and no
//! borrow is held across a call into the document, a listener or another
//! element algorithm, so listeners may re-enter any method while an
//! algorithm is running.

mod seeking;
mod text_tracks;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use media_engine_traits::{
    ContentType, EngineError, EngineEvent, EngineNetworkState, EngineReadyState,
    MediaEngineBackend, PlaybackEngine, Preload, TimeRanges,
};
pub use text_tracks::TrackDisplayUpdateScope;
use url::Url;

use crate::cached_clock::{CachedClock, WallClock};
use crate::cue_scheduler::CueScheduler;
use crate::document::{DocumentContext, SourceId};
use crate::error::{Error, ErrorResult, MediaError, MediaErrorCode};
use crate::event_queue::{AsyncEventQueue, EventTarget, MediaEvent, MediaEventName};
use crate::media_controller::{
    ControllerReport, MediaController, MediaElementId, MediaGroupRegistry,
};
use crate::media_fragment::FragmentWindow;
use crate::prefs::MediaPrefs;
use crate::resource_selection::{
    InvalidUrlAction, LoadState, ResourceSelection, SourceAddedAction,
};
use crate::text_tracks::{TextTrackList, TrackId};
use crate::timers::{MediaTimerHandle, MediaTimerSource, MediaTimers};

/// Everything a media element needs from its surroundings.
#[derive(Clone)]
pub struct MediaElementContext {
    pub document: Rc<dyn DocumentContext>,
    pub backend: Rc<dyn MediaEngineBackend>,
    pub groups: Rc<MediaGroupRegistry>,
    pub clock: Rc<dyn WallClock>,
    pub prefs: MediaPrefs,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaElementKind {
    Audio,
    Video,
}

/// <https://html.spec.whatwg.org/multipage/#dom-media-networkstate>
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(u16)]
pub enum NetworkState {
    Empty = 0,
    Idle = 1,
    Loading = 2,
    NoSource = 3,
}

/// <https://html.spec.whatwg.org/multipage/#dom-media-readystate>
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(u16)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl From<EngineReadyState> for ReadyState {
    fn from(state: EngineReadyState) -> ReadyState {
        match state {
            EngineReadyState::HaveNothing => ReadyState::HaveNothing,
            EngineReadyState::HaveMetadata => ReadyState::HaveMetadata,
            EngineReadyState::HaveCurrentData => ReadyState::HaveCurrentData,
            EngineReadyState::HaveFutureData => ReadyState::HaveFutureData,
            EngineReadyState::HaveEnoughData => ReadyState::HaveEnoughData,
        }
    }
}

/// What a video element shows.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum DisplayMode {
    Unknown,
    Poster,
    Video,
}

bitflags! {
    /// Work deferred to the next run of the load timer.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DelayedActionType: u8 {
        const LOAD_MEDIA_RESOURCE = 1 << 0;
        const CONFIGURE_TEXT_TRACKS = 1 << 1;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct BehaviorRestrictions: u8 {
        const REQUIRE_USER_GESTURE_FOR_LOAD = 1 << 0;
        const REQUIRE_USER_GESTURE_FOR_RATE_CHANGE = 1 << 1;
        const REQUIRE_PAGE_CONSENT_TO_LOAD = 1 << 2;
    }
}

impl BehaviorRestrictions {
    pub fn from_prefs(prefs: &MediaPrefs) -> BehaviorRestrictions {
        let mut restrictions = BehaviorRestrictions::empty();
        restrictions.set(
            BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_LOAD,
            prefs.require_user_gesture_for_load,
        );
        restrictions.set(
            BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_RATE_CHANGE,
            prefs.require_user_gesture_for_rate_change,
        );
        restrictions.set(
            BehaviorRestrictions::REQUIRE_PAGE_CONSENT_TO_LOAD,
            prefs.require_page_consent_to_load,
        );
        restrictions
    }
}

/// Marks the element as handling an engine callback for as long as it lives.
/// Setters skip pushing state back to the engine while one is alive.
struct EngineCallbackScope<'a> {
    element: &'a MediaElement,
}

impl<'a> EngineCallbackScope<'a> {
    fn new(element: &'a MediaElement) -> EngineCallbackScope<'a> {
        element
            .processing_engine_callback
            .set(element.processing_engine_callback.get() + 1);
        EngineCallbackScope { element }
    }
}

impl Drop for EngineCallbackScope<'_> {
    fn drop(&mut self) {
        let depth = self.element.processing_engine_callback.get();
        self.element
            .processing_engine_callback
            .set(depth.saturating_sub(1));
    }
}

fn log_engine_failure(operation: &str, result: Result<(), EngineError>) {
    if let Err(error) = result {
        warn!("Media engine {} failed: {:?}", operation, error);
    }
}

fn log_seek_failure(result: ErrorResult) {
    if let Err(error) = result {
        warn!("Seek failed: {:?}", error);
    }
}

pub struct MediaElement {
    id: MediaElementId,
    kind: MediaElementKind,
    document: Rc<dyn DocumentContext>,
    backend: Rc<dyn MediaEngineBackend>,
    groups: Rc<MediaGroupRegistry>,
    clock: Rc<dyn WallClock>,
    prefs: MediaPrefs,

    // Content attributes.
    src: RefCell<Option<String>>,
    autoplay: Cell<bool>,
    loop_: Cell<bool>,
    default_muted: Cell<bool>,
    preload: Cell<Preload>,
    poster: RefCell<Option<String>>,
    media_group: RefCell<Option<String>>,

    /// The engine for the current load cycle and the receiving end of its
    /// callbacks. Both are replaced together.
    engine: RefCell<Option<Box<dyn PlaybackEngine>>>,
    engine_events: RefCell<Option<Receiver<EngineEvent>>>,
    processing_engine_callback: Cell<u32>,

    event_queue: RefCell<AsyncEventQueue>,
    timers: MediaTimers,
    load_timer: Cell<Option<MediaTimerHandle>>,
    progress_event_timer: Cell<Option<MediaTimerHandle>>,
    playback_progress_timer: Cell<Option<MediaTimerHandle>>,
    pending_action_flags: Cell<DelayedActionType>,
    restrictions: Cell<BehaviorRestrictions>,

    network_state: Cell<NetworkState>,
    ready_state: Cell<ReadyState>,
    ready_state_maximum: Cell<ReadyState>,
    error: Cell<Option<MediaError>>,
    current_src: RefCell<Option<Url>>,
    selection: Cell<ResourceSelection>,
    display_mode: Cell<DisplayMode>,

    playback_rate: Cell<f64>,
    default_playback_rate: Cell<f64>,
    volume: Cell<f64>,
    muted: Cell<bool>,
    paused: Cell<bool>,
    /// Paused by the user agent rather than by script, for example after
    /// `stop()`.
    paused_internal: Cell<bool>,
    seeking: Cell<bool>,
    playing: Cell<bool>,
    autoplaying: Cell<bool>,

    sent_end_event: Cell<bool>,
    sent_stalled_event: Cell<bool>,
    have_fired_loaded_data: Cell<bool>,
    completely_loaded: Cell<bool>,
    have_prepared_to_play: Cell<bool>,
    tracks_are_ready: Cell<bool>,
    should_delay_load_event: Cell<bool>,
    waiting_until_media_can_start: Cell<bool>,
    load_initiated_by_user_gesture: Cell<bool>,
    has_need_key_listener: Cell<bool>,

    last_seek_time: Cell<f64>,
    previous_progress_time: Cell<f64>,
    clock_time_at_last_timeupdate: Cell<f64>,
    last_timeupdate_movie_time: Cell<f64>,
    fragment: Cell<FragmentWindow>,
    played_ranges: RefCell<TimeRanges>,
    cached_clock: RefCell<CachedClock>,

    text_tracks: RefCell<TextTrackList>,
    cue_scheduler: RefCell<CueScheduler>,
    /// Tracks that were not disabled when resource selection last started.
    /// Their readiness gates `HAVE_FUTURE_DATA` and above.
    text_tracks_when_resource_selection_began: RefCell<Vec<TrackId>>,

    controller: RefCell<Option<Rc<MediaController>>>,
    controller_state_generation: Cell<u64>,
    controller_play_generation: Cell<u64>,
}

impl MediaElement {
    pub fn new(kind: MediaElementKind, context: MediaElementContext) -> MediaElement {
        let MediaElementContext {
            document,
            backend,
            groups,
            clock,
            prefs,
        } = context;
        let id = groups.allocate_element_id();
        let restrictions = BehaviorRestrictions::from_prefs(&prefs);
        let cached_clock = CachedClock::new(prefs.cached_time_warmup());
        MediaElement {
            id,
            kind,
            document,
            backend,
            groups,
            clock,
            prefs,
            src: RefCell::new(None),
            autoplay: Cell::new(false),
            loop_: Cell::new(false),
            default_muted: Cell::new(false),
            preload: Cell::new(Preload::Auto),
            poster: RefCell::new(None),
            media_group: RefCell::new(None),
            engine: RefCell::new(None),
            engine_events: RefCell::new(None),
            processing_engine_callback: Cell::new(0),
            event_queue: RefCell::new(AsyncEventQueue::new()),
            timers: MediaTimers::new(),
            load_timer: Cell::new(None),
            progress_event_timer: Cell::new(None),
            playback_progress_timer: Cell::new(None),
            pending_action_flags: Cell::new(DelayedActionType::empty()),
            restrictions: Cell::new(restrictions),
            network_state: Cell::new(NetworkState::Empty),
            ready_state: Cell::new(ReadyState::HaveNothing),
            ready_state_maximum: Cell::new(ReadyState::HaveNothing),
            error: Cell::new(None),
            current_src: RefCell::new(None),
            selection: Cell::new(ResourceSelection::default()),
            display_mode: Cell::new(DisplayMode::Unknown),
            playback_rate: Cell::new(1.0),
            default_playback_rate: Cell::new(1.0),
            volume: Cell::new(1.0),
            muted: Cell::new(false),
            paused: Cell::new(true),
            paused_internal: Cell::new(false),
            seeking: Cell::new(false),
            playing: Cell::new(false),
            autoplaying: Cell::new(true),
            sent_end_event: Cell::new(false),
            sent_stalled_event: Cell::new(false),
            have_fired_loaded_data: Cell::new(false),
            completely_loaded: Cell::new(false),
            have_prepared_to_play: Cell::new(false),
            tracks_are_ready: Cell::new(true),
            should_delay_load_event: Cell::new(false),
            waiting_until_media_can_start: Cell::new(false),
            load_initiated_by_user_gesture: Cell::new(false),
            has_need_key_listener: Cell::new(false),
            last_seek_time: Cell::new(0.0),
            previous_progress_time: Cell::new(f64::MAX),
            clock_time_at_last_timeupdate: Cell::new(0.0),
            last_timeupdate_movie_time: Cell::new(f64::MAX),
            fragment: Cell::new(FragmentWindow::default()),
            played_ranges: RefCell::new(TimeRanges::new()),
            cached_clock: RefCell::new(cached_clock),
            text_tracks: RefCell::new(TextTrackList::new()),
            cue_scheduler: RefCell::new(CueScheduler::new()),
            text_tracks_when_resource_selection_began: RefCell::new(vec![]),
            controller: RefCell::new(None),
            controller_state_generation: Cell::new(0),
            controller_play_generation: Cell::new(0),
        }
    }

    pub fn id(&self) -> MediaElementId {
        self.id
    }

    pub fn kind(&self) -> MediaElementKind {
        self.kind
    }

    pub fn prefs(&self) -> &MediaPrefs {
        &self.prefs
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn has_engine(&self) -> bool {
        self.engine.borrow().is_some()
    }

    /// Run `f` against the current engine. Engines never call back into the
    /// element synchronously, so the borrow cannot be re-entered.
    fn with_engine<R>(&self, f: impl FnOnce(&dyn PlaybackEngine) -> R) -> Option<R> {
        self.engine.borrow().as_deref().map(f)
    }

    fn processing_engine_callback(&self) -> bool {
        self.processing_engine_callback.get() > 0
    }

    // Content attributes.

    pub fn src(&self) -> Option<String> {
        self.src.borrow().clone()
    }

    /// <https://html.spec.whatwg.org/multipage/#attr-media-src>
    pub fn set_src(&self, value: Option<&str>) {
        *self.src.borrow_mut() = value.map(str::to_owned);
        // Trigger a reload, as long as the attribute is present.
        if value.is_some() {
            self.clear_media_player(DelayedActionType::LOAD_MEDIA_RESOURCE);
            self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
        }
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay.get()
    }

    pub fn set_autoplay(&self, autoplay: bool) {
        self.autoplay.set(autoplay);
    }

    pub fn loop_(&self) -> bool {
        self.loop_.get()
    }

    pub fn set_loop(&self, loop_: bool) {
        self.loop_.set(loop_);
    }

    /// The `muted` content attribute.
    pub fn default_muted(&self) -> bool {
        self.default_muted.get()
    }

    pub fn set_default_muted(&self, muted: bool) {
        self.default_muted.set(muted);
    }

    pub fn preload(&self) -> Preload {
        self.preload.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#attr-media-preload>
    pub fn set_preload(&self, value: Option<&str>) {
        let preload = Preload::from_attribute(value);
        self.preload.set(preload);
        // The attribute is ignored while autoplay is present.
        if !self.autoplay() {
            self.with_engine(|engine| engine.set_preload(preload));
        }
    }

    pub fn poster(&self) -> Option<String> {
        self.poster.borrow().clone()
    }

    /// Only video elements have a poster.
    pub fn set_poster(&self, value: Option<&str>) {
        if self.kind != MediaElementKind::Video {
            return;
        }
        *self.poster.borrow_mut() = value.filter(|value| !value.is_empty()).map(str::to_owned);
        self.update_display_state();
    }

    pub fn media_group(&self) -> Option<String> {
        self.media_group.borrow().clone()
    }

    /// <https://html.spec.whatwg.org/multipage/#attr-media-mediagroup>
    pub fn set_media_group(&self, group: Option<&str>) {
        let group = group.map(str::to_owned);
        if *self.media_group.borrow() == group {
            return;
        }
        *self.media_group.borrow_mut() = group.clone();

        // Step 2
        self.set_controller(None);

        // Step 3
        let Some(group) = group.filter(|group| !group.is_empty()) else {
            return;
        };

        // Steps 4-6
        let controller = self.groups.controller_for_group(&group);
        self.set_controller(Some(controller));
    }

    // Readonly state.

    pub fn network_state(&self) -> NetworkState {
        self.network_state.get()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state.get()
    }

    /// The highest ready state reached in this load cycle.
    pub fn ready_state_maximum(&self) -> ReadyState {
        self.ready_state_maximum.get()
    }

    pub fn error(&self) -> Option<MediaError> {
        self.error.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-currentsrc>
    pub fn current_src(&self) -> String {
        self.current_src
            .borrow()
            .as_ref()
            .map(|url| url.as_str().to_owned())
            .unwrap_or_default()
    }

    pub fn load_state(&self) -> LoadState {
        self.selection.get().load_state
    }

    pub fn current_source(&self) -> Option<SourceId> {
        self.selection.get().current_source_node
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode.get()
    }

    pub fn paused(&self) -> bool {
        self.paused.get()
    }

    pub fn seeking(&self) -> bool {
        self.seeking.get()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn autoplaying(&self) -> bool {
        self.autoplaying.get()
    }

    pub fn pending_actions(&self) -> DelayedActionType {
        self.pending_action_flags.get()
    }

    pub fn behavior_restrictions(&self) -> BehaviorRestrictions {
        self.restrictions.get()
    }

    pub fn is_delaying_load_event(&self) -> bool {
        self.should_delay_load_event.get()
    }

    pub fn is_waiting_until_media_can_start(&self) -> bool {
        self.waiting_until_media_can_start.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-buffered>
    pub fn buffered(&self) -> TimeRanges {
        self.with_engine(|engine| engine.buffered()).unwrap_or_default()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-seekable>
    pub fn seekable(&self) -> TimeRanges {
        self.with_engine(|engine| engine.seekable()).unwrap_or_default()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-duration>
    pub fn duration(&self) -> f64 {
        if self.ready_state.get() < ReadyState::HaveMetadata {
            return f64::NAN;
        }
        self.with_engine(|engine| engine.duration())
            .unwrap_or(f64::NAN)
    }

    /// The earliest possible position.
    pub fn start_time(&self) -> f64 {
        self.with_engine(|engine| engine.start_time()).unwrap_or(0.0)
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-navigator-canplaytype>
    pub fn can_play_type(&self, mime_type: &str) -> &'static str {
        let content_type = ContentType::new(mime_type);
        self.backend
            .supports_type(&content_type, "")
            .as_can_play_type()
    }

    /// Whether a play button would start playback.
    pub fn can_play(&self) -> bool {
        self.paused() || self.ended() || self.ready_state.get() < ReadyState::HaveMetadata
    }

    /// Whether script listens for `needkey`. Without a listener a key request
    /// fails the load.
    pub fn set_has_need_key_listener(&self, has_listener: bool) {
        self.has_need_key_listener.set(has_listener);
    }

    // Events.

    fn schedule_event(&self, name: MediaEventName) {
        self.queue_event(MediaEvent::simple(name));
    }

    fn queue_event(&self, event: MediaEvent) {
        self.event_queue.borrow_mut().enqueue(event);
    }

    fn cancel_pending_events(&self) {
        self.event_queue.borrow_mut().cancel_all();
    }

    pub fn has_pending_events(&self) -> bool {
        self.event_queue.borrow().has_pending_events()
    }

    /// Events waiting for the next turn, in dispatch order.
    pub fn pending_events(&self) -> Vec<MediaEvent> {
        self.event_queue.borrow().pending().copied().collect()
    }

    /// Dispatch the events queued before this call, in order. Events queued by
    /// `handler` wait for the next turn; cancelling the queue ends this one.
    pub fn dispatch_pending_events(
        &self,
        handler: &mut dyn FnMut(&MediaElement, &MediaEvent),
    ) -> usize {
        let turn = self.event_queue.borrow().begin_turn();
        let mut dispatched = 0;
        loop {
            let Some(event) = self.event_queue.borrow_mut().next_in_turn(&turn) else {
                break;
            };
            let can_play =
                event.name == MediaEventName::CanPlay && event.target == EventTarget::Element;
            if can_play {
                self.event_queue.borrow_mut().set_dispatching_can_play(true);
            }
            handler(self, &event);
            if can_play {
                self.event_queue
                    .borrow_mut()
                    .set_dispatching_can_play(false);
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Fire due timers, handle engine callbacks and dispatch events until
    /// nothing is left to do at the current time.
    pub fn spin(&self, handler: &mut dyn FnMut(&MediaElement, &MediaEvent)) {
        loop {
            let mut work = 0;
            if self.sync_with_media_controller() {
                work += 1;
            }
            work += self.run_timers();
            work += self.process_engine_events();
            work += self.dispatch_pending_events(handler);
            if work == 0 {
                return;
            }
        }
    }

    // Timers.

    fn timer_is_active(&self, timer: &Cell<Option<MediaTimerHandle>>) -> bool {
        timer
            .get()
            .is_some_and(|handle| self.timers.is_scheduled(handle))
    }

    fn stop_timer(&self, timer: &Cell<Option<MediaTimerHandle>>) {
        if let Some(handle) = timer.take() {
            self.timers.unschedule(handle);
        }
    }

    fn start_load_timer(&self) {
        if self.timer_is_active(&self.load_timer) {
            return;
        }
        let handle = self
            .timers
            .schedule_oneshot(MediaTimerSource::Load, self.now(), 0.0);
        self.load_timer.set(Some(handle));
    }

    fn start_progress_event_timer(&self) {
        if self.timer_is_active(&self.progress_event_timer) {
            return;
        }
        let now = self.now();
        self.previous_progress_time.set(now);
        let handle = self.timers.schedule_repeating(
            MediaTimerSource::ProgressEvent,
            now,
            self.prefs.progress_event_interval(),
        );
        self.progress_event_timer.set(Some(handle));
    }

    fn start_playback_progress_timer(&self) {
        if self.timer_is_active(&self.playback_progress_timer) {
            return;
        }
        let now = self.now();
        self.previous_progress_time.set(now);
        let handle = self.timers.schedule_repeating(
            MediaTimerSource::PlaybackProgress,
            now,
            self.prefs.timeupdate_interval(),
        );
        self.playback_progress_timer.set(Some(handle));
    }

    fn stop_periodic_timers(&self) {
        self.stop_timer(&self.progress_event_timer);
        self.stop_timer(&self.playback_progress_timer);
    }

    pub fn has_active_load_timer(&self) -> bool {
        self.timer_is_active(&self.load_timer)
    }

    pub fn has_active_progress_event_timer(&self) -> bool {
        self.timer_is_active(&self.progress_event_timer)
    }

    pub fn has_active_playback_progress_timer(&self) -> bool {
        self.timer_is_active(&self.playback_progress_timer)
    }

    /// Fire every timer that is due. Returns how many fired.
    pub fn run_timers(&self) -> usize {
        let now = self.now();
        let mut fired = 0;
        while let Some((_, source)) = self.timers.take_due(now) {
            fired += 1;
            match source {
                MediaTimerSource::Load => self.load_timer_fired(),
                MediaTimerSource::ProgressEvent => self.progress_event_timer_fired(),
                MediaTimerSource::PlaybackProgress => self.playback_progress_timer_fired(),
            }
        }
        fired
    }

    fn schedule_delayed_action(&self, action: DelayedActionType) {
        debug!("Scheduling delayed action {:?}", action);
        let pending = self.pending_action_flags.get();
        if action.contains(DelayedActionType::LOAD_MEDIA_RESOURCE) &&
            !pending.contains(DelayedActionType::LOAD_MEDIA_RESOURCE)
        {
            self.prepare_for_load();
            self.pending_action_flags
                .set(self.pending_action_flags.get() | DelayedActionType::LOAD_MEDIA_RESOURCE);
        }
        if action.contains(DelayedActionType::CONFIGURE_TEXT_TRACKS) &&
            self.prefs.text_tracks_enabled
        {
            self.pending_action_flags
                .set(self.pending_action_flags.get() | DelayedActionType::CONFIGURE_TEXT_TRACKS);
        }
        self.start_load_timer();
    }

    /// Try the next `<source>` without resetting the element.
    fn schedule_next_source_child(&self) {
        self.pending_action_flags
            .set(self.pending_action_flags.get() | DelayedActionType::LOAD_MEDIA_RESOURCE);
        self.start_load_timer();
    }

    fn load_timer_fired(&self) {
        let pending = self.pending_action_flags.replace(DelayedActionType::empty());
        debug!("Load timer fired with {:?}", pending);

        if pending.contains(DelayedActionType::CONFIGURE_TEXT_TRACKS) {
            self.configure_text_tracks();
        }

        if pending.contains(DelayedActionType::LOAD_MEDIA_RESOURCE) {
            if self.load_state() == LoadState::LoadingFromSourceElement {
                self.load_next_source_child();
            } else {
                self.load_internal();
            }
        }
    }

    fn progress_event_timer_fired(&self) {
        if self.network_state.get() != NetworkState::Loading {
            return;
        }
        let now = self.now();
        let elapsed = now - self.previous_progress_time.get();

        let progressed = self
            .with_engine(|engine| engine.did_loading_progress())
            .unwrap_or(false);
        if progressed {
            self.schedule_event(MediaEventName::Progress);
            self.previous_progress_time.set(now);
            self.sent_stalled_event.set(false);
        } else if elapsed > self.prefs.stall_timeout() && !self.sent_stalled_event.get() {
            info!("Media load stalled after {:.1}s", elapsed);
            self.schedule_event(MediaEventName::Stalled);
            self.sent_stalled_event.set(true);
            self.set_should_delay_load_event(false);
        }
    }

    fn playback_progress_timer_fired(&self) {
        let fragment = self.fragment.get();
        if let Some(end) = fragment.end {
            if self.current_time() >= end && self.playback_rate.get() > 0.0 {
                self.fragment.set(FragmentWindow { end: None, ..fragment });
                if self.controller().is_none() && !self.paused() {
                    self.pause_internal();
                }
            }
        }

        self.schedule_timeupdate_event(true);
        if self.playback_rate.get() == 0.0 {
            return;
        }
        self.update_active_text_track_cues(self.current_time());
    }

    /// <https://html.spec.whatwg.org/multipage/#event-media-timeupdate>
    fn schedule_timeupdate_event(&self, periodic: bool) {
        let now = self.now();
        let delta = now - self.clock_time_at_last_timeupdate.get();

        if periodic && delta < self.prefs.timeupdate_interval() {
            return;
        }

        // Engines may report the same time more than once; one event per
        // position is enough.
        let movie_time = self.current_time();
        if movie_time != self.last_timeupdate_movie_time.get() {
            self.schedule_event(MediaEventName::TimeUpdate);
            self.clock_time_at_last_timeupdate.set(now);
            self.last_timeupdate_movie_time.set(movie_time);
        }
    }

    /// A `timeupdate` that is never de-duplicated.
    fn force_timeupdate_event(&self) {
        self.schedule_event(MediaEventName::TimeUpdate);
        self.clock_time_at_last_timeupdate.set(self.now());
        self.last_timeupdate_movie_time.set(self.current_time());
    }

    // Loading.

    fn set_should_delay_load_event(&self, should_delay: bool) {
        if self.should_delay_load_event.get() == should_delay {
            return;
        }
        self.should_delay_load_event.set(should_delay);
        if should_delay {
            self.document.increment_load_event_delay_count();
        } else {
            self.document.decrement_load_event_delay_count();
        }
    }

    fn user_gesture_required_for_load(&self) -> bool {
        self.restrictions
            .get()
            .contains(BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_LOAD)
    }

    fn user_gesture_required_for_rate_change(&self) -> bool {
        self.restrictions
            .get()
            .contains(BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_RATE_CHANGE)
    }

    fn page_consent_required_for_load(&self) -> bool {
        self.restrictions
            .get()
            .contains(BehaviorRestrictions::REQUIRE_PAGE_CONSENT_TO_LOAD)
    }

    fn remove_behavior_restriction(&self, restriction: BehaviorRestrictions) {
        self.restrictions
            .set(self.restrictions.get().difference(restriction));
    }

    fn remove_behavior_restrictions_after_first_user_gesture(&self) {
        self.remove_behavior_restriction(
            BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_LOAD |
                BehaviorRestrictions::REQUIRE_USER_GESTURE_FOR_RATE_CHANGE,
        );
    }

    fn create_engine(&self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let engine = self.backend.create_engine(sender);
        // Dropping the old receiver discards callbacks from the old engine.
        *self.engine_events.borrow_mut() = Some(receiver);
        *self.engine.borrow_mut() = Some(engine);
    }

    fn clear_media_player(&self, flags: DelayedActionType) {
        self.engine.borrow_mut().take();
        self.engine_events.borrow_mut().take();
        self.stop_periodic_timers();
        self.stop_timer(&self.load_timer);
        self.pending_action_flags
            .set(self.pending_action_flags.get().difference(flags));
        self.update_selection(|selection| selection.load_state = LoadState::WaitingForSource);
    }

    fn update_selection(&self, f: impl FnOnce(&mut ResourceSelection)) {
        let mut selection = self.selection.get();
        f(&mut selection);
        self.selection.set(selection);
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-load>
    pub fn load(&self) {
        let gesture = self.document.processing_user_gesture();
        if self.user_gesture_required_for_load() && !gesture {
            debug!("Ignoring load() without a user gesture");
            return;
        }

        self.load_initiated_by_user_gesture.set(gesture);
        if gesture {
            self.remove_behavior_restrictions_after_first_user_gesture();
        }
        self.prepare_for_load();
        self.load_internal();
        self.prepare_to_play();
    }

    /// <https://html.spec.whatwg.org/multipage/#media-element-load-algorithm>
    fn prepare_for_load(&self) {
        debug!("Preparing media element {:?} for load", self.id);

        self.stop_periodic_timers();
        self.stop_timer(&self.load_timer);
        self.sent_end_event.set(false);
        self.sent_stalled_event.set(false);
        self.have_fired_loaded_data.set(false);
        self.completely_loaded.set(false);
        self.have_prepared_to_play.set(false);
        self.display_mode.set(DisplayMode::Unknown);
        self.fragment.set(FragmentWindow::default());
        self.last_timeupdate_movie_time.set(f64::MAX);
        self.cue_scheduler.borrow_mut().reset_last_update_time();

        // Step 1
        self.update_selection(|selection| {
            selection.load_state = LoadState::WaitingForSource;
            selection.current_source_node = None;
        });

        // Step 2
        self.cancel_pending_events();

        // Step 3
        let network_state = self.network_state.get();
        if matches!(network_state, NetworkState::Loading | NetworkState::Idle) {
            self.schedule_event(MediaEventName::Abort);
        }

        self.create_engine();

        // Step 4
        if network_state != NetworkState::Empty {
            self.network_state.set(NetworkState::Empty);
            self.ready_state.set(ReadyState::HaveNothing);
            self.ready_state_maximum.set(ReadyState::HaveNothing);
            self.refresh_cached_time();
            self.paused.set(true);
            self.seeking.set(false);
            self.invalidate_cached_time();
            self.schedule_event(MediaEventName::Emptied);
            self.update_media_controller();
            self.update_active_text_track_cues(0.0);
        }

        // Step 5
        if let Err(error) = self.set_playback_rate(self.default_playback_rate.get()) {
            warn!("Resetting the playback rate failed: {:?}", error);
        }

        // Step 6
        self.error.set(None);
        self.autoplaying.set(true);

        // Step 7
        self.played_ranges.borrow_mut().clear();
        self.last_seek_time.set(0.0);
        self.network_state.set(NetworkState::NoSource);

        // The load event is delayed right away rather than once the
        // asynchronous section runs, which may be after it fired.
        if self.preload.get() != Preload::None {
            self.set_should_delay_load_event(true);
        }
    }

    fn load_internal(&self) {
        if self.page_consent_required_for_load() && !self.document.can_start_media() {
            self.set_should_delay_load_event(false);
            if !self.waiting_until_media_can_start.get() {
                debug!("Waiting until media can start");
                self.waiting_until_media_can_start.set(true);
            }
            return;
        }

        self.pending_action_flags.set(
            self.pending_action_flags
                .get()
                .difference(DelayedActionType::LOAD_MEDIA_RESOURCE),
        );

        // Once allowed to load, the element keeps loading at will.
        self.remove_behavior_restriction(BehaviorRestrictions::REQUIRE_PAGE_CONSENT_TO_LOAD);

        let enabled_tracks: Vec<TrackId> = self
            .text_tracks
            .borrow()
            .iter()
            .filter(|track| track.mode != crate::text_tracks::TextTrackMode::Disabled)
            .map(|track| track.id)
            .collect();
        *self.text_tracks_when_resource_selection_began.borrow_mut() = enabled_tracks;

        self.select_media_resource();
    }

    /// The page now allows media to load.
    pub fn media_can_start(&self) {
        if !self.waiting_until_media_can_start.get() {
            return;
        }
        self.waiting_until_media_can_start.set(false);
        self.load_internal();
    }

    /// <https://html.spec.whatwg.org/multipage/#concept-media-load-algorithm>
    fn select_media_resource(&self) {
        // Step 3
        let children_mode = if self.src.borrow().is_some() {
            false
        } else if let Some(first) = self.document.next_source_sibling(None) {
            self.update_selection(|selection| {
                selection.next_child_node_to_consider = Some(first);
                selection.current_source_node = None;
            });
            true
        } else {
            self.update_selection(|selection| selection.load_state = LoadState::WaitingForSource);
            self.set_should_delay_load_event(false);
            self.network_state.set(NetworkState::Empty);
            return;
        };

        // Step 4
        self.set_should_delay_load_event(true);
        self.network_state.set(NetworkState::Loading);

        // Step 5
        self.schedule_event(MediaEventName::LoadStart);

        // Step 6
        if children_mode {
            self.load_next_source_child();
            return;
        }

        self.update_selection(|selection| selection.load_state = LoadState::LoadingFromSrcAttribute);
        let src = self.src().unwrap_or_default();
        let url = match src.trim() {
            "" => None,
            src => self.document.base_url().join(src).ok(),
        };
        let Some(url) = url else {
            warn!("Cannot load media from {:?}", src);
            self.media_loading_failed(EngineNetworkState::FormatError);
            return;
        };
        if !self.document.is_safe_to_load(&url) || !self.document.dispatch_before_load(&url, None)
        {
            warn!("Not allowed to load media from {}", url);
            self.media_loading_failed(EngineNetworkState::FormatError);
            return;
        }

        // No type is known for the src attribute; the engine sniffs it.
        self.load_resource(url, ContentType::default(), "");
    }

    fn load_next_source_child(&self) {
        let selection = self.selection.get().select_next_source_child(
            &*self.document,
            &*self.backend,
            InvalidUrlAction::Complain,
        );
        for rejected in &selection.rejected {
            self.queue_event(MediaEvent::new(
                MediaEventName::Error,
                EventTarget::Source(*rejected),
            ));
        }
        self.update_selection(|cursor| cursor.commit(&*self.document, &selection));

        let Some(selected) = selection.selected else {
            self.wait_for_source_change();
            return;
        };

        // Every candidate gets a fresh engine.
        self.create_engine();
        self.update_selection(|cursor| cursor.load_state = LoadState::LoadingFromSourceElement);
        self.load_resource(selected.url, selected.content_type, &selected.key_system);
    }

    /// <https://html.spec.whatwg.org/multipage/#concept-media-load-resource>
    fn load_resource(&self, url: Url, content_type: ContentType, key_system: &str) {
        info!("Loading media resource {} ({})", url, content_type);
        if !self.has_engine() {
            self.create_engine();
        }

        self.network_state.set(NetworkState::Loading);
        *self.current_src.borrow_mut() = Some(url.clone());
        if self.prefs.send_progress_events {
            self.start_progress_event_timer();
        }

        // A new resource has to work out what to show again.
        self.display_mode.set(DisplayMode::Unknown);

        if !self.autoplay() {
            let preload = self.preload.get();
            self.with_engine(|engine| engine.set_preload(preload));
        }
        if self.default_muted.get() {
            self.muted.set(true);
        }
        self.update_volume();

        let loaded = self
            .with_engine(|engine| engine.load(&url, &content_type, key_system))
            .unwrap_or(false);
        if !loaded {
            self.media_loading_failed(EngineNetworkState::FormatError);
        }

        self.update_display_state();
    }

    fn wait_for_source_change(&self) {
        debug!("Waiting for a new <source> child");
        self.stop_periodic_timers();
        self.update_selection(|selection| selection.load_state = LoadState::WaitingForSource);
        self.network_state.set(NetworkState::NoSource);
        self.set_should_delay_load_event(false);
        self.update_display_state();
    }

    /// <https://html.spec.whatwg.org/multipage/#dedicated-media-source-failure-steps>
    fn none_supported(&self) {
        warn!("No supported media source for element {:?}", self.id);
        self.stop_periodic_timers();
        self.update_selection(|selection| {
            selection.load_state = LoadState::WaitingForSource;
            selection.current_source_node = None;
        });

        self.error
            .set(Some(MediaError::new(MediaErrorCode::SrcNotSupported)));
        self.network_state.set(NetworkState::NoSource);
        self.schedule_event(MediaEventName::Error);
        self.set_should_delay_load_event(false);
        self.update_display_state();
    }

    /// A fatal error for the current load cycle.
    fn media_engine_error(&self, error: MediaError) {
        warn!("Media engine error {:?}", error.code());
        self.stop_periodic_timers();
        self.update_selection(|selection| selection.load_state = LoadState::WaitingForSource);

        self.error.set(Some(error));
        self.schedule_event(MediaEventName::Error);

        // Metadata that was already obtained stays usable.
        if self.ready_state.get() >= ReadyState::HaveMetadata ||
            self.ready_state_maximum.get() >= ReadyState::HaveMetadata
        {
            self.network_state.set(NetworkState::Idle);
        } else {
            self.network_state.set(NetworkState::Empty);
            self.schedule_event(MediaEventName::Emptied);
        }

        self.set_should_delay_load_event(false);
        self.update_selection(|selection| selection.current_source_node = None);
        self.with_engine(|engine| engine.cancel_load());
    }

    fn media_loading_failed(&self, error: EngineNetworkState) {
        self.stop_periodic_timers();

        // A failed <source> before metadata moves on to the next candidate.
        if self.ready_state.get() < ReadyState::HaveMetadata &&
            self.load_state() == LoadState::LoadingFromSourceElement
        {
            match self.current_source() {
                Some(source) => {
                    self.queue_event(MediaEvent::new(
                        MediaEventName::Error,
                        EventTarget::Source(source),
                    ));
                },
                None => debug!("Load of a removed <source> failed"),
            }

            if self
                .selection
                .get()
                .have_potential_source_child(&*self.document, &*self.backend)
            {
                self.schedule_next_source_child();
            } else {
                self.wait_for_source_change();
            }
            return;
        }

        match error {
            EngineNetworkState::NetworkError
                if self.ready_state.get() >= ReadyState::HaveMetadata =>
            {
                self.media_engine_error(MediaError::new(MediaErrorCode::Network));
            },
            EngineNetworkState::DecodeError => {
                self.media_engine_error(MediaError::new(MediaErrorCode::Decode));
            },
            EngineNetworkState::FormatError | EngineNetworkState::NetworkError
                if self.load_state() == LoadState::LoadingFromSrcAttribute =>
            {
                self.none_supported();
            },
            _ => {},
        }

        self.update_display_state();
    }

    fn set_network_state(&self, state: EngineNetworkState) {
        debug!(
            "Engine network state {:?}, element is {:?}",
            state,
            self.network_state.get()
        );
        match state {
            EngineNetworkState::Empty => {
                self.network_state.set(NetworkState::Empty);
            },
            EngineNetworkState::FormatError |
            EngineNetworkState::NetworkError |
            EngineNetworkState::DecodeError => {
                self.media_loading_failed(state);
            },
            EngineNetworkState::Idle => {
                if self.network_state.get() > NetworkState::Idle {
                    self.change_network_state_from_loading_to_idle();
                    self.set_should_delay_load_event(false);
                } else {
                    self.network_state.set(NetworkState::Idle);
                }
            },
            EngineNetworkState::Loading => {
                let network_state = self.network_state.get();
                if network_state < NetworkState::Loading || network_state == NetworkState::NoSource
                {
                    self.start_progress_event_timer();
                }
                self.network_state.set(NetworkState::Loading);
            },
            EngineNetworkState::Loaded => {
                if self.network_state.get() != NetworkState::Idle {
                    self.change_network_state_from_loading_to_idle();
                }
                self.completely_loaded.set(true);
            },
        }
    }

    fn change_network_state_from_loading_to_idle(&self) {
        self.stop_timer(&self.progress_event_timer);
        // At least one progress event, even for resources that load at once.
        self.schedule_event(MediaEventName::Progress);
        self.schedule_event(MediaEventName::Suspend);
        self.network_state.set(NetworkState::Idle);
    }

    /// <https://html.spec.whatwg.org/multipage/#ready-states>
    fn set_ready_state(&self, state: ReadyState) {
        // Depends on the old ready state.
        let was_potentially_playing = self.potentially_playing();

        let old_state = self.ready_state.get();
        let tracks_are_ready = self.text_tracks_are_ready();
        if state == old_state && self.tracks_are_ready.get() == tracks_are_ready {
            return;
        }
        self.tracks_are_ready.set(tracks_are_ready);

        // Text tracks that are still loading hold the element at current data.
        let new_state = if tracks_are_ready || state <= ReadyState::HaveMetadata {
            state
        } else {
            ReadyState::HaveCurrentData
        };
        self.ready_state.set(new_state);
        let maximum = self.ready_state_maximum.get().max(old_state).max(new_state);
        self.ready_state_maximum.set(maximum);
        debug!("Ready state {:?} -> {:?}", old_state, new_state);

        if self.network_state.get() == NetworkState::Empty {
            return;
        }

        if self.seeking.get() {
            if was_potentially_playing && new_state < ReadyState::HaveFutureData {
                self.schedule_event(MediaEventName::Waiting);
            }
            if new_state >= ReadyState::HaveCurrentData {
                self.finish_seek();
            }
        } else if was_potentially_playing && new_state < ReadyState::HaveFutureData {
            self.schedule_timeupdate_event(false);
            self.schedule_event(MediaEventName::Waiting);
        }

        if new_state >= ReadyState::HaveMetadata && old_state < ReadyState::HaveMetadata {
            self.prepare_media_fragment();
            self.schedule_event(MediaEventName::DurationChange);
            self.schedule_event(MediaEventName::LoadedMetadata);
        }

        let mut should_update_display_state = false;
        if new_state >= ReadyState::HaveCurrentData &&
            old_state < ReadyState::HaveCurrentData &&
            !self.have_fired_loaded_data.get()
        {
            self.have_fired_loaded_data.set(true);
            should_update_display_state = true;
            self.schedule_event(MediaEventName::LoadedData);
            self.set_should_delay_load_event(false);
            self.apply_media_fragment();
        }

        let is_potentially_playing = self.potentially_playing();
        if new_state == ReadyState::HaveFutureData &&
            old_state <= ReadyState::HaveCurrentData &&
            tracks_are_ready
        {
            self.schedule_event(MediaEventName::CanPlay);
            if is_potentially_playing {
                self.schedule_event(MediaEventName::Playing);
            }
            should_update_display_state = true;
        }

        if new_state == ReadyState::HaveEnoughData &&
            old_state < ReadyState::HaveEnoughData &&
            tracks_are_ready
        {
            if old_state <= ReadyState::HaveCurrentData {
                self.schedule_event(MediaEventName::CanPlay);
            }
            self.schedule_event(MediaEventName::CanPlayThrough);
            if is_potentially_playing && old_state <= ReadyState::HaveCurrentData {
                self.schedule_event(MediaEventName::Playing);
            }

            if self.autoplaying.get() &&
                self.paused() &&
                self.autoplay() &&
                !self.user_gesture_required_for_rate_change()
            {
                info!("Autoplaying media element {:?}", self.id);
                self.paused.set(false);
                self.invalidate_cached_time();
                self.schedule_event(MediaEventName::Play);
                self.schedule_event(MediaEventName::Playing);
            }
            should_update_display_state = true;
        }

        if should_update_display_state {
            self.update_display_state();
        }

        self.update_play_state();
        self.update_media_controller();
        self.update_active_text_track_cues(self.current_time());
    }

    fn prepare_to_play(&self) {
        if self.have_prepared_to_play.get() || !self.has_engine() {
            return;
        }
        self.have_prepared_to_play.set(true);
        self.with_engine(|engine| engine.prepare_to_play());
    }

    fn prepare_media_fragment(&self) {
        let fragment = self
            .current_src
            .borrow()
            .as_ref()
            .and_then(crate::media_fragment::MediaFragmentTime::from_url);
        let window = FragmentWindow::prepare(fragment, self.duration());
        debug!("Media fragment window {:?}", window);
        self.fragment.set(window);

        if window.start.is_some() && self.ready_state.get() < ReadyState::HaveFutureData {
            self.prepare_to_play();
        }
    }

    fn apply_media_fragment(&self) {
        if let Some(start) = self.fragment.get().start {
            self.sent_end_event.set(false);
            log_seek_failure(self.seek(start));
        }
    }

    // Display.

    fn update_display_state(&self) {
        if self.kind != MediaElementKind::Video {
            return;
        }
        if self.poster.borrow().is_none() {
            self.display_mode.set(DisplayMode::Video);
        } else if self.display_mode.get() < DisplayMode::Poster {
            self.display_mode.set(DisplayMode::Poster);
        }
    }

    // Playback.

    /// <https://html.spec.whatwg.org/multipage/#potentially-playing>
    pub fn potentially_playing(&self) -> bool {
        // Ran out of buffered data while playing.
        let paused_to_buffer = self.ready_state_maximum.get() >= ReadyState::HaveFutureData &&
            self.ready_state.get() < ReadyState::HaveFutureData;
        (paused_to_buffer || self.ready_state.get() >= ReadyState::HaveFutureData) &&
            self.could_play_if_enough_data() &&
            !self.is_blocked_on_media_controller()
    }

    fn could_play_if_enough_data(&self) -> bool {
        !self.paused() && !self.ended_playback() && !self.stopped_due_to_errors()
    }

    /// <https://html.spec.whatwg.org/multipage/#ended-playback>
    fn ended_playback(&self) -> bool {
        let duration = self.duration();
        if !self.has_engine() || duration.is_nan() {
            return false;
        }
        if self.ready_state.get() < ReadyState::HaveMetadata {
            return false;
        }

        let now = self.current_time();
        let rate = self.playback_rate.get();
        if rate > 0.0 {
            return duration > 0.0 &&
                now >= duration &&
                (!self.loop_() || self.controller().is_some());
        }
        if rate < 0.0 {
            return now <= 0.0;
        }
        false
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-ended>
    pub fn ended(&self) -> bool {
        self.ended_playback() && self.playback_rate.get() > 0.0
    }

    fn stopped_due_to_errors(&self) -> bool {
        self.ready_state.get() >= ReadyState::HaveMetadata &&
            self.error.get().is_some() &&
            !self.seekable().contain(self.current_time())
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-play>
    pub fn play(&self) {
        let gesture = self.document.processing_user_gesture();
        if self.user_gesture_required_for_rate_change() && !gesture {
            debug!("Ignoring play() without a user gesture");
            return;
        }
        if gesture {
            self.remove_behavior_restrictions_after_first_user_gesture();
        }

        if self.prefs.site_specific_quirks &&
            self.event_queue.borrow().is_dispatching_can_play() &&
            !self.load_initiated_by_user_gesture.get()
        {
            debug!("Ignoring play() from a canplay listener");
            return;
        }

        self.play_internal();
    }

    fn play_internal(&self) {
        // Step 1
        if !self.has_engine() || self.network_state.get() == NetworkState::Empty {
            self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
        }

        // Step 2
        if self.ended_playback() {
            log_seek_failure(self.seek(self.start_time()));
        }

        // Step 4
        if self.paused() {
            self.paused.set(false);
            self.invalidate_cached_time();
            self.schedule_event(MediaEventName::Play);
            if self.ready_state.get() <= ReadyState::HaveCurrentData {
                self.schedule_event(MediaEventName::Waiting);
            } else {
                self.schedule_event(MediaEventName::Playing);
            }
        }

        self.autoplaying.set(false);
        self.update_play_state();
        self.update_media_controller();
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-pause>
    pub fn pause(&self) {
        if self.user_gesture_required_for_rate_change() && !self.document.processing_user_gesture()
        {
            debug!("Ignoring pause() without a user gesture");
            return;
        }
        self.pause_internal();
    }

    fn pause_internal(&self) {
        // Step 1
        if !self.has_engine() || self.network_state.get() == NetworkState::Empty {
            self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
        }

        // Step 2
        self.autoplaying.set(false);

        // Step 3
        if !self.paused() {
            self.paused.set(true);
            self.schedule_timeupdate_event(false);
            self.schedule_event(MediaEventName::Pause);
        }

        self.update_play_state();
    }

    fn set_paused_internal(&self, paused: bool) {
        self.paused_internal.set(paused);
        self.update_play_state();
    }

    /// Bring the engine in line with whether the element should be playing.
    fn update_play_state(&self) {
        let Some(engine_paused) = self.with_engine(|engine| engine.paused()) else {
            return;
        };

        if self.paused_internal.get() {
            if !engine_paused {
                self.with_engine(|engine| log_engine_failure("pause", engine.pause()));
            }
            self.refresh_cached_time();
            self.stop_timer(&self.playback_progress_timer);
            return;
        }

        let should_be_playing = self.potentially_playing();
        debug!(
            "Updating play state: should be playing {}, engine paused {}",
            should_be_playing, engine_paused
        );

        if should_be_playing {
            self.display_mode.set(DisplayMode::Video);
            self.invalidate_cached_time();

            if engine_paused {
                // The engine only stashes these until it actually plays.
                let rate = self.effective_playback_rate();
                let muted = self.effective_muted();
                self.with_engine(|engine| {
                    log_engine_failure("set_rate", engine.set_rate(rate));
                    log_engine_failure("set_muted", engine.set_muted(muted));
                    log_engine_failure("play", engine.play());
                });
            }

            self.start_playback_progress_timer();
            self.playing.set(true);
        } else {
            if !engine_paused {
                self.with_engine(|engine| log_engine_failure("pause", engine.pause()));
            }
            self.refresh_cached_time();

            self.stop_timer(&self.playback_progress_timer);
            self.playing.set(false);
            let time = self.current_time();
            if time > self.last_seek_time.get() {
                self.add_played_range(self.last_seek_time.get(), time);
            }

            if self.could_play_if_enough_data() {
                self.prepare_to_play();
            }
        }

        self.update_media_controller();
    }

    // Rate and volume.

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-playbackrate>
    pub fn set_playback_rate(&self, rate: f64) -> ErrorResult {
        if !rate.is_finite() {
            return Err(Error::NotSupported);
        }
        if self.playback_rate.get() != rate {
            self.playback_rate.set(rate);
            self.invalidate_cached_time();
            self.schedule_event(MediaEventName::RateChange);
        }

        if self.controller().is_none() && self.potentially_playing() {
            self.with_engine(|engine| {
                if engine.rate() != rate {
                    log_engine_failure("set_rate", engine.set_rate(rate));
                }
            });
        }
        Ok(())
    }

    pub fn default_playback_rate(&self) -> f64 {
        self.default_playback_rate.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-defaultplaybackrate>
    pub fn set_default_playback_rate(&self, rate: f64) -> ErrorResult {
        if !rate.is_finite() {
            return Err(Error::NotSupported);
        }
        if self.default_playback_rate.get() != rate {
            self.default_playback_rate.set(rate);
            self.schedule_event(MediaEventName::RateChange);
        }
        Ok(())
    }

    /// The rate the engine plays at: the controller's when there is one.
    fn effective_playback_rate(&self) -> f64 {
        match self.controller() {
            Some(controller) => controller.playback_rate(),
            None => self.playback_rate.get(),
        }
    }

    fn update_playback_rate(&self) {
        let rate = self.effective_playback_rate();
        if !self.potentially_playing() {
            return;
        }
        self.with_engine(|engine| {
            if engine.rate() != rate {
                log_engine_failure("set_rate", engine.set_rate(rate));
            }
        });
    }

    pub fn volume(&self) -> f64 {
        self.volume.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-volume>
    pub fn set_volume(&self, volume: f64) -> ErrorResult {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::IndexSize);
        }
        if self.volume.get() != volume {
            self.volume.set(volume);
            self.update_volume();
            self.schedule_event(MediaEventName::VolumeChange);
        }
        Ok(())
    }

    pub fn muted(&self) -> bool {
        self.muted.get()
    }

    /// <https://html.spec.whatwg.org/multipage/#dom-media-muted>
    pub fn set_muted(&self, muted: bool) {
        if self.muted.get() == muted {
            return;
        }
        self.muted.set(muted);
        self.update_volume();
        self.schedule_event(MediaEventName::VolumeChange);
    }

    /// A bridged element is muted by its controller only.
    fn effective_muted(&self) -> bool {
        match self.controller() {
            Some(controller) => controller.muted(),
            None => self.muted.get(),
        }
    }

    fn update_volume(&self) {
        // The engine already knows about changes it reported itself.
        if self.processing_engine_callback() {
            return;
        }
        let mut multiplier = self.document.media_volume();
        if let Some(controller) = self.controller() {
            multiplier *= controller.volume();
        }
        let should_mute = self.effective_muted();
        let volume = self.volume.get() * multiplier;
        self.with_engine(|engine| {
            log_engine_failure("set_muted", engine.set_muted(should_mute));
            log_engine_failure("set_volume", engine.set_volume(volume));
        });
    }

    // Engine callbacks.

    /// Handle every callback the current engine has sent. Returns how many
    /// were handled.
    pub fn process_engine_events(&self) -> usize {
        if self.processing_engine_callback() {
            return 0;
        }
        let mut handled = 0;
        loop {
            let event = match self.engine_events.borrow().as_ref() {
                Some(receiver) => receiver.try_recv().ok(),
                None => None,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_engine_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_engine_event(&self, event: EngineEvent) {
        debug!("Handling engine event {:?}", event);
        match event {
            EngineEvent::NetworkStateChanged(state) => {
                let _scope = EngineCallbackScope::new(self);
                self.set_network_state(state);
            },
            EngineEvent::ReadyStateChanged(state) => {
                let _scope = EngineCallbackScope::new(self);
                self.set_ready_state(state.into());
            },
            EngineEvent::TimeChanged => self.engine_time_changed(),
            EngineEvent::DurationChanged => {
                let _scope = EngineCallbackScope::new(self);
                self.schedule_event(MediaEventName::DurationChange);
                let now = self.current_time();
                let duration = self.duration();
                if now > duration {
                    log_seek_failure(self.seek(duration));
                }
            },
            EngineEvent::RateChanged => {
                let _scope = EngineCallbackScope::new(self);
                // The engine may not support the rate that was asked for.
                if let Some(rate) = self.with_engine(|engine| engine.rate()) {
                    self.playback_rate.set(rate);
                }
                if self.playing.get() {
                    self.invalidate_cached_time();
                }
            },
            EngineEvent::VolumeChanged => {
                let _scope = EngineCallbackScope::new(self);
                if let Some(volume) = self.with_engine(|engine| engine.volume()) {
                    if volume != self.volume.get() {
                        self.volume.set(volume);
                        self.update_volume();
                        self.schedule_event(MediaEventName::VolumeChange);
                    }
                }
            },
            EngineEvent::MuteChanged => {
                let _scope = EngineCallbackScope::new(self);
                if let Some(muted) = self.with_engine(|engine| engine.muted()) {
                    self.set_muted(muted);
                }
            },
            EngineEvent::PlaybackStateChanged => {
                if self.paused_internal.get() {
                    return;
                }
                let Some(engine_paused) = self.with_engine(|engine| engine.paused()) else {
                    return;
                };
                let _scope = EngineCallbackScope::new(self);
                if engine_paused {
                    self.pause_internal();
                } else {
                    self.play_internal();
                }
            },
            EngineEvent::SawUnsupportedTracks => {
                info!("Media element {:?} has tracks it cannot play", self.id);
            },
            EngineEvent::KeyNeeded {
                key_system,
                init_data,
            } => {
                debug!(
                    "Key needed for {:?} ({} bytes of init data)",
                    key_system,
                    init_data.len()
                );
                if !self.has_need_key_listener.get() {
                    self.error
                        .set(Some(MediaError::new(MediaErrorCode::Encrypted)));
                    self.schedule_event(MediaEventName::Error);
                    return;
                }
                self.schedule_event(MediaEventName::NeedKey);
            },
        }
    }

    fn engine_time_changed(&self) {
        self.update_active_text_track_cues(self.current_time());

        let _scope = EngineCallbackScope::new(self);
        self.invalidate_cached_time();

        // Needed when no ready state change accompanies the seek.
        let engine_seeking = self
            .with_engine(|engine| engine.seeking())
            .unwrap_or(false);
        if self.seeking.get() && self.ready_state.get() >= ReadyState::HaveCurrentData && !engine_seeking
        {
            self.finish_seek();
        }

        // Only queued if no timeupdate went out at this movie time yet.
        self.schedule_timeupdate_event(false);

        let now = self.current_time();
        let duration = self.duration();
        if !duration.is_nan() && duration != 0.0 && now >= duration && self.playback_rate.get() > 0.0
        {
            if self.loop_() && self.controller().is_none() {
                self.sent_end_event.set(false);
                log_seek_failure(self.seek(self.start_time()));
            } else {
                if self.controller().is_none() && !self.paused() {
                    self.paused.set(true);
                    self.schedule_event(MediaEventName::Pause);
                }
                if !self.sent_end_event.get() {
                    self.sent_end_event.set(true);
                    self.schedule_event(MediaEventName::Ended);
                }
                self.update_media_controller();
            }
        } else {
            self.sent_end_event.set(false);
        }

        self.update_play_state();
    }

    // Teardown.

    /// The user cancelled the fetch.
    pub fn user_cancelled_load(&self) {
        if self.network_state.get() == NetworkState::Empty || self.completely_loaded.get() {
            return;
        }
        info!("Load of media element {:?} cancelled", self.id);

        // Step 1
        self.with_engine(|engine| engine.cancel_load());
        self.clear_media_player(DelayedActionType::all());

        // Step 2
        self.error.set(Some(MediaError::new(MediaErrorCode::Aborted)));

        // Step 3
        self.schedule_event(MediaEventName::Abort);

        // Step 4
        if self.ready_state.get() == ReadyState::HaveNothing {
            self.network_state.set(NetworkState::Empty);
            self.schedule_event(MediaEventName::Emptied);
        } else {
            self.network_state.set(NetworkState::Idle);
        }

        // Step 5
        self.set_should_delay_load_event(false);

        // Step 6
        self.update_selection(|selection| selection.current_source_node = None);

        // The engine is gone.
        self.ready_state.set(ReadyState::HaveNothing);
        self.update_media_controller();
        self.update_active_text_track_cues(0.0);
    }

    /// The element's document is going away. Stops loading and playback
    /// without firing playback events until [`MediaElement::resume`].
    pub fn stop(&self) {
        debug!("Stopping media element {:?}", self.id);
        self.user_cancelled_load();

        self.playing.set(false);
        self.set_paused_internal(true);

        self.stop_periodic_timers();
        self.engine.borrow_mut().take();
        self.engine_events.borrow_mut().take();
    }

    /// The document is active again.
    pub fn resume(&self) {
        self.set_paused_internal(false);

        if self
            .error
            .get()
            .is_some_and(|error| error.code() == MediaErrorCode::Aborted)
        {
            // The load was cancelled by `stop()`; start over.
            self.error.set(None);
            self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
        }
    }

    pub fn paused_internally(&self) -> bool {
        self.paused_internal.get()
    }

    pub fn inserted_into_document(&self) {
        let has_src = self.src.borrow().as_deref().is_some_and(|src| !src.is_empty());
        if has_src && self.network_state.get() == NetworkState::Empty {
            self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
        }
    }

    pub fn removed_from_document(&self) {
        if self.network_state.get() > NetworkState::Empty {
            self.pause();
        }
    }

    // Source children.

    /// A `<source>` child was inserted.
    pub fn source_was_added(&self, source: SourceId) {
        if self.src.borrow().is_some() {
            return;
        }

        let network_state_is_empty = self.network_state.get() == NetworkState::Empty;
        let mut selection = self.selection.get();
        let action = selection.source_was_added(&*self.document, source, network_state_is_empty);
        self.selection.set(selection);

        match action {
            SourceAddedAction::None => {},
            SourceAddedAction::LoadElement => {
                self.schedule_delayed_action(DelayedActionType::LOAD_MEDIA_RESOURCE);
            },
            SourceAddedAction::ResumeSelection => {
                self.set_should_delay_load_event(true);
                self.network_state.set(NetworkState::Loading);
                // Pick up from the cursor instead of restarting selection.
                self.update_selection(|selection| {
                    selection.load_state = LoadState::LoadingFromSourceElement
                });
                self.schedule_next_source_child();
            },
        }
    }

    /// A `<source>` child was removed.
    pub fn source_was_removed(&self, source: SourceId) {
        let mut selection = self.selection.get();
        selection.source_was_removed(&*self.document, source);
        self.selection.set(selection);
        self.event_queue
            .borrow_mut()
            .cancel_for_target(EventTarget::Source(source));
    }

    // Group controller.

    pub fn controller(&self) -> Option<Rc<MediaController>> {
        self.controller.borrow().clone()
    }

    fn set_controller(&self, controller: Option<Rc<MediaController>>) {
        if let Some(old) = self.controller.borrow_mut().take() {
            old.remove_member(self.id);
        }
        if let Some(ref controller) = controller {
            controller.add_member(self.id, self.controller_report());
            self.controller_state_generation
                .set(controller.state_generation());
            self.controller_play_generation
                .set(controller.play_generation());
        }
        *self.controller.borrow_mut() = controller;
        self.update_playback_rate();
        self.update_volume();
    }

    fn controller_report(&self) -> ControllerReport {
        ControllerReport {
            blocked: self.ready_state.get() <= ReadyState::HaveCurrentData,
            autoplaying: self.autoplaying.get(),
            paused: self.paused(),
            current_time: self.current_time(),
        }
    }

    fn update_media_controller(&self) {
        if let Some(controller) = self.controller() {
            controller.report(self.id, self.controller_report());
        }
    }

    fn is_blocked_on_media_controller(&self) -> bool {
        let Some(controller) = self.controller() else {
            return false;
        };
        if controller.is_blocked() {
            return true;
        }
        // The controller position is outside this resource.
        let position = controller.current_time();
        let start = self.start_time();
        position < start || position > start + self.duration()
    }

    /// Apply changes the group controller made since the last call. Returns
    /// whether anything changed.
    pub fn sync_with_media_controller(&self) -> bool {
        let Some(controller) = self.controller() else {
            return false;
        };
        let mut changed = false;

        let play_generation = controller.play_generation();
        if play_generation != self.controller_play_generation.get() {
            self.controller_play_generation.set(play_generation);
            self.play();
            changed = true;
        }

        let state_generation = controller.state_generation();
        if state_generation != self.controller_state_generation.get() {
            self.controller_state_generation.set(state_generation);
            self.update_playback_rate();
            self.update_volume();
            self.update_play_state();
            changed = true;
        }
        changed
    }
}

impl Drop for MediaElement {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.get_mut().take() {
            controller.remove_member(self.id);
        }
        if self.should_delay_load_event.get() {
            self.document.decrement_load_event_delay_count();
        }
    }
}
