/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Temporal media fragments, `#t=[npt:]start[,end]`.
//!
//! <https://www.w3.org/TR/media-frags/#naming-time>

use log::debug;
use url::Url;
use url::form_urlencoded;

/// A time window requested by the fragment of a media URL.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaFragmentTime {
    pub start: f64,
    pub end: Option<f64>,
}

impl MediaFragmentTime {
    /// The last valid `t` dimension of the fragment of `url`, if any.
    pub fn from_url(url: &Url) -> Option<MediaFragmentTime> {
        let fragment = url.fragment()?;
        let parsed = form_urlencoded::parse(fragment.as_bytes())
            .filter(|(name, _)| name == "t")
            .filter_map(|(_, value)| parse_npt_fragment(&value))
            .last();
        if parsed.is_none() {
            debug!("No usable temporal fragment in {}", url);
        }
        parsed
    }
}

fn parse_npt_fragment(value: &str) -> Option<MediaFragmentTime> {
    let value = value.strip_prefix("npt:").unwrap_or(value);
    let (start, end) = match value.split_once(',') {
        Some((start, end)) => (start, Some(end)),
        None => (value, None),
    };

    let start = if start.is_empty() {
        0.0
    } else {
        parse_npt_time(start)?
    };
    let end = match end {
        Some(end) => {
            let end = parse_npt_time(end)?;
            if end <= start {
                return None;
            }
            Some(end)
        },
        None => None,
    };
    Some(MediaFragmentTime { start, end })
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_fraction(value: Option<&str>) -> Option<f64> {
    match value {
        None => Some(0.0),
        Some(digits) if digits.is_empty() => Some(0.0),
        Some(digits) => {
            parse_digits(digits)?;
            format!("0.{}", digits).parse().ok()
        },
    }
}

/// `npt-sec`, `npt-mmss` or `npt-hhmmss`.
fn parse_npt_time(value: &str) -> Option<f64> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    let fraction = parse_fraction(fraction)?;

    let parts: Vec<&str> = whole.split(':').collect();
    let seconds = match parts.as_slice() {
        [seconds] => parse_digits(seconds)?,
        [minutes, seconds] => sexagesimal(0, minutes, seconds)?,
        [hours, minutes, seconds] => sexagesimal(parse_digits(hours)?, minutes, seconds)?,
        _ => return None,
    };
    Some(seconds as f64 + fraction)
}

fn sexagesimal(hours: u64, minutes: &str, seconds: &str) -> Option<u64> {
    if minutes.len() != 2 || seconds.len() != 2 {
        return None;
    }
    let minutes = parse_digits(minutes)?;
    let seconds = parse_digits(seconds)?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// The fragment window once the duration is known. A start of zero and an
/// end that does not follow the start are dropped; both are clamped to the
/// duration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FragmentWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl FragmentWindow {
    pub fn prepare(fragment: Option<MediaFragmentTime>, duration: f64) -> FragmentWindow {
        let Some(fragment) = fragment else {
            return FragmentWindow::default();
        };
        let start = (fragment.start > 0.0).then(|| fragment.start.min(duration));
        let end = fragment
            .end
            .filter(|end| *end > 0.0 && start.is_none_or(|start| *end > start))
            .map(|end| end.min(duration));
        FragmentWindow { start, end }
    }
}
