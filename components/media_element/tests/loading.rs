/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use common::Harness;
use media_element::{
    DelayedActionType, EventTarget, LoadState, MediaErrorCode, MediaEvent, MediaEventName,
    NetworkState, ReadyState,
};
use media_engine_dummy::{DummyBackend, EngineCall};
use media_engine_traits::{EngineNetworkState, EngineReadyState, Preload};

#[test]
fn src_attribute_load_reaches_enough_data() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveEnoughData);

    assert_eq!(
        harness.take_element_events(),
        vec![
            MediaEventName::LoadStart,
            MediaEventName::DurationChange,
            MediaEventName::DurationChange,
            MediaEventName::LoadedMetadata,
            MediaEventName::LoadedData,
            MediaEventName::CanPlay,
            MediaEventName::CanPlayThrough,
        ]
    );
    assert_eq!(element.ready_state(), ReadyState::HaveEnoughData);
    assert_eq!(element.network_state(), NetworkState::Loading);
    assert_eq!(element.current_src(), "https://media.example/page/movie.webm");
    assert_eq!(element.load_state(), LoadState::LoadingFromSrcAttribute);
    assert_eq!(element.duration(), 10.0);
    assert!(element.paused());
    assert!(!element.is_delaying_load_event());
    assert_eq!(harness.document.load_event_delay_count.get(), 0);

    let engine = harness.engine();
    assert!(engine.calls().contains(&EngineCall::SetPreload(Preload::Auto)));
    assert_eq!(
        engine.url().map(|url| url.to_string()),
        Some(element.current_src())
    );
}

#[test]
fn ready_state_maximum_never_decreases() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveFutureData);
    assert_eq!(element.ready_state_maximum(), ReadyState::HaveFutureData);

    let engine = harness.engine();
    engine.report_ready_state(EngineReadyState::HaveMetadata);
    harness.spin(&element);
    assert_eq!(element.ready_state(), ReadyState::HaveMetadata);
    assert_eq!(element.ready_state_maximum(), ReadyState::HaveFutureData);

    engine.report_ready_state(EngineReadyState::HaveEnoughData);
    harness.spin(&element);
    assert_eq!(element.ready_state_maximum(), ReadyState::HaveEnoughData);
}

#[test]
fn autoplay_starts_playback_at_enough_data() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_autoplay(true);
    harness.load_to(&element, EngineReadyState::HaveEnoughData);

    let events = harness.take_element_events();
    assert_eq!(
        events[events.len() - 4..],
        [
            MediaEventName::CanPlay,
            MediaEventName::CanPlayThrough,
            MediaEventName::Play,
            MediaEventName::Playing,
        ]
    );
    assert!(!element.paused());
    assert!(element.is_playing());
    assert!(!harness.engine().paused());
    // Preload is not forwarded while autoplay is set.
    assert!(
        !harness
            .engine()
            .calls()
            .iter()
            .any(|call| matches!(call, EngineCall::SetPreload(_)))
    );
}

#[test]
fn source_children_fall_back_in_order() {
    let mut harness = Harness::new();
    let mp4 = harness.document.add_source("movie.mp4", "video/mp4");
    let webm = harness.document.add_source("movie.webm", "video/webm");
    let ogg = harness.document.add_source("movie.ogg", "audio/ogg");
    let element = harness.video();

    element.load();
    harness.spin(&element);
    assert_eq!(element.current_source(), Some(webm));
    assert_eq!(element.load_state(), LoadState::LoadingFromSourceElement);
    assert!(
        harness
            .take_events()
            .contains(&MediaEvent::new(MediaEventName::Error, EventTarget::Source(mp4)))
    );

    // The chosen candidate fails before metadata: move on to the next one.
    harness
        .engine()
        .report_network_state(EngineNetworkState::FormatError);
    harness.spin(&element);
    assert_eq!(element.current_source(), Some(ogg));
    assert_eq!(element.current_src(), "https://media.example/page/movie.ogg");
    assert_eq!(element.network_state(), NetworkState::Loading);
    assert_eq!(element.error(), None);

    let events = harness.take_events();
    assert!(events.contains(&MediaEvent::new(MediaEventName::Error, EventTarget::Source(webm))));
    assert!(!events.contains(&MediaEvent::simple(MediaEventName::Error)));
}

#[test]
fn exhausted_sources_wait_and_resume_from_the_cursor() {
    let mut harness = Harness::new();
    let first = harness.document.add_source("first.webm", "video/webm");
    let element = harness.video();
    element.load();
    harness.spin(&element);
    harness
        .engine()
        .report_network_state(EngineNetworkState::FormatError);
    harness.spin(&element);

    assert_eq!(element.network_state(), NetworkState::NoSource);
    assert_eq!(element.load_state(), LoadState::WaitingForSource);
    assert!(
        harness
            .take_events()
            .contains(&MediaEvent::new(MediaEventName::Error, EventTarget::Source(first)))
    );

    harness.document.before_load_urls.borrow_mut().clear();
    let second = harness.document.add_source("second.webm", "video/webm");
    element.source_was_added(second);
    assert_eq!(element.network_state(), NetworkState::Loading);
    assert!(element.is_delaying_load_event());
    harness.spin(&element);

    // Only the new candidate was considered.
    let considered: Vec<String> = harness
        .document
        .before_load_urls
        .borrow()
        .iter()
        .map(|url| url.path().to_owned())
        .collect();
    assert_eq!(considered, vec!["/page/second.webm".to_owned()]);
    assert_eq!(element.current_source(), Some(second));
    assert_eq!(element.load_state(), LoadState::LoadingFromSourceElement);
}

fn loaded_urls(calls: &[EngineCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            EngineCall::Load(url) => Some(url.path().to_owned()),
            _ => None,
        })
        .collect()
}

#[test]
fn source_detached_by_beforeload_is_skipped() {
    let mut harness = Harness::new();
    let first = harness.document.add_source("first.webm", "video/webm");
    let second = harness.document.add_source("second.webm", "video/webm");
    harness.document.detach_on_before_load.set(Some(first));
    let element = harness.video();

    element.load();
    harness.spin(&element);
    assert_eq!(element.current_source(), Some(second));
    assert_eq!(element.current_src(), "https://media.example/page/second.webm");
    assert_eq!(
        loaded_urls(&harness.engine().calls()),
        vec!["/page/second.webm".to_owned()]
    );
    // Detached candidates are not failures.
    assert!(
        !harness
            .take_events()
            .contains(&MediaEvent::new(MediaEventName::Error, EventTarget::Source(first)))
    );
}

#[test]
fn detaching_the_last_source_in_beforeload_waits() {
    let mut harness = Harness::new();
    let only = harness.document.add_source("only.webm", "video/webm");
    harness.document.detach_on_before_load.set(Some(only));
    let element = harness.video();

    element.load();
    harness.spin(&element);
    assert_eq!(element.current_source(), None);
    assert_eq!(element.load_state(), LoadState::WaitingForSource);
    assert_eq!(element.network_state(), NetworkState::NoSource);
    assert!(
        harness
            .backend
            .current_engine()
            .is_none_or(|engine| loaded_urls(&engine.calls()).is_empty())
    );
    assert!(!harness.take_events().iter().any(|event| event.name == MediaEventName::Error));
}

#[test]
fn removing_a_source_during_a_turn_defers_listener_events() {
    let mut harness = Harness::new();
    let mp4 = harness.document.add_source("movie.mp4", "video/mp4");
    harness.document.add_source("movie.webm", "video/webm");
    let element = harness.video();
    element.load();
    assert_eq!(
        element.pending_events(),
        vec![
            MediaEvent::simple(MediaEventName::LoadStart),
            MediaEvent::new(MediaEventName::Error, EventTarget::Source(mp4)),
        ]
    );

    let mut dispatched = vec![];
    let document = harness.document.clone();
    element.dispatch_pending_events(&mut |element, event| {
        dispatched.push(*event);
        if event.name == MediaEventName::LoadStart {
            document.remove_source(mp4);
            element.source_was_removed(mp4);
            element.set_volume(0.5).unwrap();
        }
    });
    assert_eq!(dispatched, vec![MediaEvent::simple(MediaEventName::LoadStart)]);
    assert_eq!(
        element.pending_events(),
        vec![MediaEvent::simple(MediaEventName::VolumeChange)]
    );
}

#[test]
fn inserting_a_source_into_an_empty_element_loads_it() {
    let mut harness = Harness::new();
    let element = harness.video();
    assert_eq!(element.network_state(), NetworkState::Empty);

    let source = harness.document.add_source("movie.webm", "");
    element.source_was_added(source);
    assert!(element.pending_actions().contains(DelayedActionType::LOAD_MEDIA_RESOURCE));
    harness.spin(&element);
    assert_eq!(element.current_source(), Some(source));
    assert_eq!(harness.take_element_events(), vec![MediaEventName::LoadStart]);
}

#[test]
fn sources_are_ignored_while_src_is_set() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);

    let source = harness.document.add_source("other.webm", "video/webm");
    element.source_was_added(source);
    assert!(element.pending_actions().is_empty());
    assert!(!element.has_active_load_timer());
}

#[test]
fn unusable_src_reports_src_not_supported() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_src(Some(""));
    harness.spin(&element);

    assert_eq!(
        harness.take_element_events(),
        vec![MediaEventName::LoadStart, MediaEventName::Error]
    );
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::SrcNotSupported));
    assert_eq!(element.network_state(), NetworkState::NoSource);
    assert_eq!(harness.document.load_event_delay_count.get(), 0);
}

#[test]
fn refused_load_reports_src_not_supported() {
    let mut backend = DummyBackend::with_supported_types(&["video/webm"]);
    backend.refuse_loads(true);
    let mut harness = Harness::with_backend(backend);
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);

    assert_eq!(element.error().map(|error| error.code_value()), Some(4));
    assert!(!element.has_active_progress_event_timer());
}

#[test]
fn decode_error_before_metadata_empties_the_element() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);
    harness.take_events();

    let engine = harness.engine();
    engine.report_network_state(EngineNetworkState::DecodeError);
    harness.spin(&element);

    assert_eq!(
        harness.take_element_events(),
        vec![MediaEventName::Error, MediaEventName::Emptied]
    );
    assert_eq!(element.network_state(), NetworkState::Empty);
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::Decode));
    assert!(engine.calls().contains(&EngineCall::CancelLoad));
}

#[test]
fn network_error_after_metadata_keeps_the_metadata() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveMetadata);
    harness.take_events();

    harness
        .engine()
        .report_network_state(EngineNetworkState::NetworkError);
    harness.spin(&element);

    assert_eq!(harness.take_element_events(), vec![MediaEventName::Error]);
    assert_eq!(element.network_state(), NetworkState::Idle);
    assert_eq!(element.ready_state(), ReadyState::HaveMetadata);
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::Network));
    assert_eq!(element.duration(), 10.0);
}

#[test]
fn decode_error_after_metadata_leaves_the_element_idle() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveMetadata);
    harness.take_events();

    harness
        .engine()
        .report_network_state(EngineNetworkState::DecodeError);
    harness.spin(&element);

    assert_eq!(harness.take_element_events(), vec![MediaEventName::Error]);
    assert_eq!(element.network_state(), NetworkState::Idle);
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::Decode));
}

#[test]
fn reloading_fires_abort_and_emptied() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveEnoughData);
    harness.take_events();

    element.set_src(Some("other.webm"));
    harness.spin(&element);
    assert_eq!(
        harness.take_element_events(),
        vec![
            MediaEventName::Abort,
            MediaEventName::Emptied,
            MediaEventName::LoadStart,
        ]
    );
    assert_eq!(element.ready_state(), ReadyState::HaveNothing);
    assert_eq!(element.ready_state_maximum(), ReadyState::HaveNothing);
    assert_eq!(element.current_src(), "https://media.example/page/other.webm");
}

#[test]
fn stop_while_loading_aborts() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);
    harness.take_events();
    let engine = harness.engine();

    element.stop();
    harness.spin(&element);
    assert_eq!(
        harness.take_element_events(),
        vec![MediaEventName::Abort, MediaEventName::Emptied]
    );
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::Aborted));
    assert_eq!(element.network_state(), NetworkState::Empty);
    assert!(engine.calls().contains(&EngineCall::CancelLoad));
    assert!(element.paused_internally());
    assert!(!element.has_active_progress_event_timer());
    assert_eq!(harness.document.load_event_delay_count.get(), 0);

    // Callbacks from the cancelled engine go nowhere.
    engine.report_ready_state(EngineReadyState::HaveEnoughData);
    assert_eq!(element.process_engine_events(), 0);

    element.resume();
    harness.spin(&element);
    assert_eq!(element.error(), None);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::LoadStart]);
}

#[test]
fn page_consent_holds_back_the_load() {
    let mut harness = Harness::new();
    harness.prefs.require_page_consent_to_load = true;
    harness.document.blocks_media.set(true);
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);

    assert!(element.is_waiting_until_media_can_start());
    assert!(harness.take_element_events().is_empty());
    assert_eq!(harness.document.load_event_delay_count.get(), 0);

    harness.document.blocks_media.set(false);
    element.media_can_start();
    harness.spin(&element);
    assert!(!element.is_waiting_until_media_can_start());
    assert_eq!(harness.take_element_events(), vec![MediaEventName::LoadStart]);
    assert_eq!(element.network_state(), NetworkState::Loading);
}

#[test]
fn load_requires_a_user_gesture_when_restricted() {
    let mut harness = Harness::new();
    harness.prefs.require_user_gesture_for_load = true;
    harness.document.add_source("movie.webm", "video/webm");
    let element = harness.video();

    element.load();
    harness.spin(&element);
    assert_eq!(element.network_state(), NetworkState::Empty);
    assert_eq!(harness.backend.engine_count(), 0);

    harness.document.user_gesture.set(true);
    element.load();
    harness.document.user_gesture.set(false);
    harness.spin(&element);
    assert_eq!(element.network_state(), NetworkState::Loading);
    assert!(element.behavior_restrictions().is_empty());
}

#[test]
fn inserted_element_with_src_loads() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.inserted_into_document();
    assert!(element.pending_actions().is_empty());

    element.set_src(Some("movie.webm"));
    harness.spin(&element);
    element.stop();
    harness.spin(&element);
    harness.take_events();
    assert_eq!(element.network_state(), NetworkState::Empty);

    element.inserted_into_document();
    assert!(element.pending_actions().contains(DelayedActionType::LOAD_MEDIA_RESOURCE));
    harness.spin(&element);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::LoadStart]);
    assert_eq!(element.error(), None);
}

#[test]
fn progress_and_stall_follow_loading() {
    let mut harness = Harness::new();
    let element = harness.video();
    element.set_src(Some("movie.webm"));
    harness.spin(&element);
    harness.take_events();
    assert!(element.has_active_progress_event_timer());
    let engine = harness.engine();

    engine.set_loading_progress(true);
    harness.advance(&element, 0.4);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::Progress]);

    harness.advance(&element, 3.5);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::Stalled]);
    harness.advance(&element, 0.4);
    assert!(harness.take_element_events().is_empty());

    engine.report_network_state(EngineNetworkState::Idle);
    harness.spin(&element);
    assert_eq!(
        harness.take_element_events(),
        vec![MediaEventName::Progress, MediaEventName::Suspend]
    );
    assert_eq!(element.network_state(), NetworkState::Idle);
    assert!(!element.has_active_progress_event_timer());

    harness.advance(&element, 10.0);
    assert!(harness.take_element_events().is_empty());
}

#[test]
fn load_timer_only_runs_pending_actions() {
    let mut harness = Harness::new();
    let element = harness.video();
    assert!(!element.has_active_load_timer());

    element.set_src(Some("movie.webm"));
    assert!(element.has_active_load_timer());
    assert_eq!(element.pending_actions(), DelayedActionType::LOAD_MEDIA_RESOURCE);
    harness.spin(&element);
    assert!(!element.has_active_load_timer());
    assert!(element.pending_actions().is_empty());
    let engines = harness.backend.engine_count();

    harness.advance(&element, 1.0);
    assert_eq!(harness.backend.engine_count(), engines);
}

#[test]
fn encrypted_media_without_listener_fails() {
    let mut harness = Harness::new();
    let element = harness.video();
    harness.load_to(&element, EngineReadyState::HaveMetadata);
    harness.take_events();

    harness.engine().report_key_needed("org.w3.clearkey", vec![1, 2, 3]);
    harness.spin(&element);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::Error]);
    assert_eq!(element.error().map(|error| error.code()), Some(MediaErrorCode::Encrypted));

    element.set_has_need_key_listener(true);
    harness.engine().report_key_needed("org.w3.clearkey", vec![]);
    harness.spin(&element);
    assert_eq!(harness.take_element_events(), vec![MediaEventName::NeedKey]);
}

#[test]
fn can_play_type_reflects_the_backend() {
    let harness = Harness::new();
    let element = harness.video();
    assert_eq!(element.can_play_type("video/webm"), "maybe");
    assert_eq!(element.can_play_type("video/webm; codecs=\"vp9\""), "probably");
    assert_eq!(element.can_play_type("video/mp4"), "");
}
