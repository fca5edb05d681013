/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A document, clock and backend to drive media elements with.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use media_element::{
    DocumentContext, EventTarget, ManualClock, MediaElement, MediaElementContext,
    MediaElementKind, MediaEvent, MediaEventName, MediaGroupRegistry, MediaPrefs,
    SourceCandidate, SourceId,
};
use media_engine_dummy::{DummyBackend, DummyEngineHandle};
use media_engine_traits::{EngineNetworkState, EngineReadyState};
use url::Url;

#[derive(Default)]
pub struct TestDocument {
    pub sources: RefCell<Vec<(SourceId, SourceCandidate)>>,
    next_source_id: Cell<u32>,
    pub blocks_media: Cell<bool>,
    pub user_gesture: Cell<bool>,
    pub load_event_delay_count: Cell<i32>,
    pub before_load_urls: RefCell<Vec<Url>>,
    /// A `<source>` that a `beforeload` listener takes out of the document.
    pub detach_on_before_load: Cell<Option<SourceId>>,
    pub media_volume: Cell<Option<f64>>,
}

impl TestDocument {
    pub fn add_source(&self, src: &str, mime_type: &str) -> SourceId {
        let id = SourceId(self.next_source_id.get());
        self.next_source_id.set(id.0 + 1);
        self.sources.borrow_mut().push((
            id,
            SourceCandidate {
                src: src.to_owned(),
                mime_type: mime_type.to_owned(),
                ..SourceCandidate::default()
            },
        ));
        id
    }

    pub fn remove_source(&self, source: SourceId) {
        self.sources.borrow_mut().retain(|(id, _)| *id != source);
    }
}

impl DocumentContext for TestDocument {
    fn base_url(&self) -> Url {
        Url::parse("https://media.example/page/").unwrap()
    }

    fn source_children(&self) -> Vec<SourceId> {
        self.sources.borrow().iter().map(|(id, _)| *id).collect()
    }

    fn source_candidate(&self, source: SourceId) -> Option<SourceCandidate> {
        self.sources
            .borrow()
            .iter()
            .find(|(id, _)| *id == source)
            .map(|(_, candidate)| candidate.clone())
    }

    fn dispatch_before_load(&self, url: &Url, source: Option<SourceId>) -> bool {
        self.before_load_urls.borrow_mut().push(url.clone());
        let detached = source.filter(|source| Some(*source) == self.detach_on_before_load.get());
        if let Some(detached) = detached {
            self.remove_source(detached);
        }
        true
    }

    fn can_start_media(&self) -> bool {
        !self.blocks_media.get()
    }

    fn processing_user_gesture(&self) -> bool {
        self.user_gesture.get()
    }

    fn media_volume(&self) -> f64 {
        self.media_volume.get().unwrap_or(1.0)
    }

    fn increment_load_event_delay_count(&self) {
        self.load_event_delay_count
            .set(self.load_event_delay_count.get() + 1);
    }

    fn decrement_load_event_delay_count(&self) {
        self.load_event_delay_count
            .set(self.load_event_delay_count.get() - 1);
    }
}

pub struct Harness {
    pub document: Rc<TestDocument>,
    pub backend: Rc<DummyBackend>,
    pub groups: Rc<MediaGroupRegistry>,
    pub clock: Rc<ManualClock>,
    pub prefs: MediaPrefs,
    pub events: Vec<MediaEvent>,
}

impl Harness {
    pub fn new() -> Harness {
        Harness::with_backend(DummyBackend::with_supported_types(&["video/webm", "audio/ogg"]))
    }

    pub fn with_backend(backend: DummyBackend) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        Harness {
            document: Rc::new(TestDocument::default()),
            backend: Rc::new(backend),
            groups: Rc::new(MediaGroupRegistry::new()),
            clock: Rc::new(ManualClock::new(0.0)),
            prefs: MediaPrefs::default(),
            events: vec![],
        }
    }

    pub fn element(&self, kind: MediaElementKind) -> MediaElement {
        MediaElement::new(
            kind,
            MediaElementContext {
                document: self.document.clone(),
                backend: self.backend.clone(),
                groups: self.groups.clone(),
                clock: self.clock.clone(),
                prefs: self.prefs.clone(),
            },
        )
    }

    pub fn video(&self) -> MediaElement {
        self.element(MediaElementKind::Video)
    }

    pub fn engine(&self) -> DummyEngineHandle {
        self.backend.current_engine().expect("no engine was created")
    }

    /// Run the element until it is idle, recording every dispatched event.
    pub fn spin(&mut self, element: &MediaElement) {
        let events = &mut self.events;
        element.spin(&mut |_, event| events.push(*event));
    }

    pub fn advance(&mut self, element: &MediaElement, seconds: f64) {
        self.clock.advance(seconds);
        self.spin(element);
    }

    /// Names of the events dispatched at the element since the last call.
    pub fn take_element_events(&mut self) -> Vec<MediaEventName> {
        self.events
            .drain(..)
            .filter(|event| event.target == EventTarget::Element)
            .map(|event| event.name)
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }

    /// Load `movie.webm` through the `src` attribute and bring it to
    /// `ready_state` with a ten second duration.
    pub fn load_to(&mut self, element: &MediaElement, ready_state: EngineReadyState) {
        element.set_src(Some("movie.webm"));
        self.spin(element);
        let engine = self.engine();
        engine.report_network_state(EngineNetworkState::Loading);
        engine.report_duration(10.0);
        engine.report_ready_state(ready_state);
        self.spin(element);
    }
}
