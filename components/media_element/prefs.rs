/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tunables for media elements. Created from the `media` section of a prefs
//! document, with every missing key taking its default.

use serde::{Deserialize, Serialize};

/// Repeating timers never fire more often than this, in milliseconds.
const MINIMUM_TIMER_INTERVAL_MS: u64 = 1;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MediaPrefs {
    /// How often `progress` is considered while the resource is loading.
    pub progress_event_interval_ms: u64,

    /// How long loading may make no progress before `stalled` fires.
    pub stall_timeout_ms: u64,

    /// Minimum spacing of periodic `timeupdate` events while playing.
    pub timeupdate_interval_ms: u64,

    /// How long after play, pause, a rate change or a seek the position
    /// reported by the engine is trusted enough to extrapolate from.
    pub cached_time_warmup_ms: u64,

    pub send_progress_events: bool,

    /// Whether text track cues are scheduled at all.
    pub text_tracks_enabled: bool,

    /// Ignore `play()` issued from a `canplay` listener when the load was not
    /// started by a user gesture.
    pub site_specific_quirks: bool,

    pub require_user_gesture_for_load: bool,
    pub require_user_gesture_for_rate_change: bool,
    pub require_page_consent_to_load: bool,
}

impl Default for MediaPrefs {
    fn default() -> MediaPrefs {
        MediaPrefs {
            progress_event_interval_ms: 350,
            stall_timeout_ms: 3000,
            timeupdate_interval_ms: 250,
            cached_time_warmup_ms: 500,
            send_progress_events: true,
            text_tracks_enabled: true,
            site_specific_quirks: false,
            require_user_gesture_for_load: false,
            require_user_gesture_for_rate_change: false,
            require_page_consent_to_load: false,
        }
    }
}

fn seconds(milliseconds: u64) -> f64 {
    milliseconds as f64 / 1000.0
}

impl MediaPrefs {
    /// Read prefs from a JSON object. Unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<MediaPrefs, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn progress_event_interval(&self) -> f64 {
        seconds(self.progress_event_interval_ms.max(MINIMUM_TIMER_INTERVAL_MS))
    }

    pub fn stall_timeout(&self) -> f64 {
        seconds(self.stall_timeout_ms)
    }

    pub fn timeupdate_interval(&self) -> f64 {
        seconds(self.timeupdate_interval_ms.max(MINIMUM_TIMER_INTERVAL_MS))
    }

    pub fn cached_time_warmup(&self) -> f64 {
        seconds(self.cached_time_warmup_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let prefs = MediaPrefs::from_json(r#"{ "stall_timeout_ms": 1000, "unknown": 3 }"#).unwrap();
        assert_eq!(prefs.stall_timeout(), 1.0);
        assert_eq!(prefs.progress_event_interval(), 0.35);
        assert_eq!(prefs.timeupdate_interval(), 0.25);
        assert!(prefs.send_progress_events);
        assert!(!prefs.require_user_gesture_for_load);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let prefs = MediaPrefs::from_json(r#"{ "timeupdate_interval_ms": 0 }"#).unwrap();
        assert_eq!(prefs.timeupdate_interval(), 0.001);
    }

    #[test]
    fn malformed_prefs_are_an_error() {
        assert!(MediaPrefs::from_json(r#"{ "stall_timeout_ms": "soon" }"#).is_err());
    }
}
