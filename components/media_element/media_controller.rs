/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shared playback control for media elements with the same `mediagroup`.
//!
//! The controller never calls into its elements. Elements report their state
//! after every play state update, and notice controller changes through
//! [`MediaController::state_generation`] the next time they are driven.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use log::debug;

use crate::error::{Error, ErrorResult};

/// Identifies a media element within its document.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MediaElementId(pub u32);

/// What an element tells its controller about itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerReport {
    /// The element does not have enough data to play.
    pub blocked: bool,
    pub autoplaying: bool,
    pub paused: bool,
    pub current_time: f64,
}

pub struct MediaController {
    paused: Cell<bool>,
    playback_rate: Cell<f64>,
    default_playback_rate: Cell<f64>,
    volume: Cell<f64>,
    muted: Cell<bool>,
    members: RefCell<IndexMap<MediaElementId, ControllerReport>>,
    state_generation: Cell<u64>,
    play_generation: Cell<u64>,
}

impl Default for MediaController {
    fn default() -> MediaController {
        MediaController {
            paused: Cell::new(false),
            playback_rate: Cell::new(1.0),
            default_playback_rate: Cell::new(1.0),
            volume: Cell::new(1.0),
            muted: Cell::new(false),
            members: RefCell::new(IndexMap::new()),
            state_generation: Cell::new(0),
            play_generation: Cell::new(0),
        }
    }
}

impl MediaController {
    pub fn new() -> Rc<MediaController> {
        Rc::new(MediaController::default())
    }

    fn state_changed(&self) {
        self.state_generation.set(self.state_generation.get() + 1);
    }

    /// Bumped whenever rate, volume, mute or paused state change.
    pub fn state_generation(&self) -> u64 {
        self.state_generation.get()
    }

    /// Bumped by [`MediaController::play`]; each member runs its own `play()`
    /// when it notices.
    pub fn play_generation(&self) -> u64 {
        self.play_generation.get()
    }

    pub fn add_member(&self, element: MediaElementId, report: ControllerReport) {
        self.members.borrow_mut().insert(element, report);
        self.state_changed();
    }

    pub fn remove_member(&self, element: MediaElementId) {
        self.members.borrow_mut().shift_remove(&element);
        self.state_changed();
    }

    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    /// Record the latest state of a member. Members are told through
    /// [`MediaController::state_generation`] when this unblocks or blocks the
    /// controller.
    pub fn report(&self, element: MediaElementId, report: ControllerReport) {
        let was_blocked = self.is_blocked();
        match self.members.borrow_mut().get_mut(&element) {
            Some(existing) => *existing = report,
            None => return,
        }
        if self.is_blocked() != was_blocked {
            self.state_changed();
        }
    }

    pub fn paused(&self) -> bool {
        self.paused.get()
    }

    pub fn play(&self) {
        debug!("Media controller play");
        self.play_generation.set(self.play_generation.get() + 1);
        self.unpause();
    }

    pub fn unpause(&self) {
        if self.paused.get() {
            self.paused.set(false);
        }
        self.state_changed();
    }

    pub fn pause(&self) {
        debug!("Media controller pause");
        if !self.paused.get() {
            self.paused.set(true);
        }
        self.state_changed();
    }

    /// Paused, or some member cannot make progress, or every member is
    /// paused.
    pub fn is_blocked(&self) -> bool {
        if self.paused.get() {
            return true;
        }
        let members = self.members.borrow();
        if members.is_empty() {
            return false;
        }
        let mut all_paused = true;
        for report in members.values() {
            if report.blocked || (report.autoplaying && report.paused) {
                return true;
            }
            if !report.paused {
                all_paused = false;
            }
        }
        all_paused
    }

    /// The position of the earliest member.
    pub fn current_time(&self) -> f64 {
        self.members
            .borrow()
            .values()
            .map(|report| report.current_time)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate.get()
    }

    pub fn set_playback_rate(&self, rate: f64) -> ErrorResult {
        if !rate.is_finite() {
            return Err(Error::NotSupported);
        }
        if self.playback_rate.get() != rate {
            self.playback_rate.set(rate);
            self.state_changed();
        }
        Ok(())
    }

    pub fn default_playback_rate(&self) -> f64 {
        self.default_playback_rate.get()
    }

    pub fn set_default_playback_rate(&self, rate: f64) -> ErrorResult {
        if !rate.is_finite() {
            return Err(Error::NotSupported);
        }
        self.default_playback_rate.set(rate);
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.volume.get()
    }

    pub fn set_volume(&self, volume: f64) -> ErrorResult {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::IndexSize);
        }
        if self.volume.get() != volume {
            self.volume.set(volume);
            self.state_changed();
        }
        Ok(())
    }

    pub fn muted(&self) -> bool {
        self.muted.get()
    }

    pub fn set_muted(&self, muted: bool) {
        if self.muted.get() != muted {
            self.muted.set(muted);
            self.state_changed();
        }
    }
}

/// The controllers of one document, by group name.
#[derive(Default)]
pub struct MediaGroupRegistry {
    groups: RefCell<HashMap<String, Weak<MediaController>>>,
    next_element_id: Cell<u32>,
}

impl MediaGroupRegistry {
    pub fn new() -> MediaGroupRegistry {
        MediaGroupRegistry::default()
    }

    pub fn allocate_element_id(&self) -> MediaElementId {
        let id = self.next_element_id.get();
        self.next_element_id.set(id + 1);
        MediaElementId(id)
    }

    /// The controller shared by every element in `group`, created if no
    /// element holds it any more.
    pub fn controller_for_group(&self, group: &str) -> Rc<MediaController> {
        let mut groups = self.groups.borrow_mut();
        if let Some(controller) = groups.get(group).and_then(Weak::upgrade) {
            return controller;
        }
        groups.retain(|_, controller| controller.strong_count() > 0);
        let controller = MediaController::new();
        groups.insert(group.to_owned(), Rc::downgrade(&controller));
        controller
    }
}
