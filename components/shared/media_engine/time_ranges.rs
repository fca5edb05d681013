/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    fn is_overlapping_or_adjacent(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn union(&mut self, other: &TimeRange) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }
}

/// An ordered set of disjoint, non-adjacent time ranges.
///
/// <https://html.spec.whatwg.org/multipage/#time-ranges>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> TimeRanges {
        TimeRanges::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn start(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|range| range.start)
    }

    pub fn end(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|range| range.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Insert `[start, end]`, merging it with every range it touches.
    /// Inverted or non-finite ranges are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if !start.is_finite() || !end.is_finite() || start > end {
            return;
        }

        let mut added = TimeRange { start, end };
        let mut index = 0;
        while index < self.ranges.len() {
            let existing = self.ranges[index];
            if existing.is_overlapping_or_adjacent(&added) {
                added.union(&existing);
                self.ranges.remove(index);
                continue;
            }
            if existing.start > added.end {
                break;
            }
            index += 1;
        }
        self.ranges.insert(index, added);
    }

    pub fn contain(&self, time: f64) -> bool {
        self.ranges
            .iter()
            .any(|range| range.start <= time && time <= range.end)
    }

    /// The time closest to `time` that lies in one of the ranges, or zero if
    /// the set is empty.
    pub fn nearest(&self, time: f64) -> f64 {
        let mut closest = 0.0;
        let mut closest_delta = f64::INFINITY;
        for range in &self.ranges {
            if range.start <= time && time <= range.end {
                return time;
            }
            let start_delta = (range.start - time).abs();
            if start_delta < closest_delta {
                closest = range.start;
                closest_delta = start_delta;
            }
            let end_delta = (range.end - time).abs();
            if end_delta < closest_delta {
                closest = range.end;
                closest_delta = end_delta;
            }
        }
        closest
    }
}

impl From<Vec<Range<f64>>> for TimeRanges {
    fn from(ranges: Vec<Range<f64>>) -> TimeRanges {
        let mut time_ranges = TimeRanges::new();
        for range in ranges {
            time_ranges.add(range.start, range.end);
        }
        time_ranges
    }
}
