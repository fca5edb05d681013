/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! What a media element needs from the document it lives in.
//!
//! The document owns the `<source>` children; the element only ever holds
//! [`SourceId`]s into that list and re-reads the list every time, because
//! listeners may reorder it while the element walks it.

use url::Url;

/// Identifies a `<source>` node for as long as it exists.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SourceId(pub u32);

/// The attributes of a `<source>` node relevant to resource selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceCandidate {
    pub src: String,
    pub mime_type: String,
    pub media: String,
    pub key_system: String,
}

pub trait DocumentContext {
    fn base_url(&self) -> Url;

    /// The `<source>` children of the element, in tree order.
    fn source_children(&self) -> Vec<SourceId>;

    fn source_candidate(&self, source: SourceId) -> Option<SourceCandidate>;

    fn source_is_child(&self, source: SourceId) -> bool {
        self.source_children().contains(&source)
    }

    /// The `<source>` child following `source`, or the first one when
    /// `source` is `None`. Nothing follows a node that is no longer a child.
    fn next_source_sibling(&self, source: Option<SourceId>) -> Option<SourceId> {
        let children = self.source_children();
        match source {
            None => children.first().copied(),
            Some(source) => {
                let index = children.iter().position(|child| *child == source)?;
                children.get(index + 1).copied()
            },
        }
    }

    /// Security policy check for loading `url`.
    fn is_safe_to_load(&self, _url: &Url) -> bool {
        true
    }

    /// Fire a cancelable `beforeload` event at `source` (or at the element
    /// when `None`). Listeners may mutate the document. Returns false if the
    /// load was cancelled.
    fn dispatch_before_load(&self, _url: &Url, _source: Option<SourceId>) -> bool {
        true
    }

    fn evaluate_media_query(&self, _query: &str) -> bool {
        true
    }

    /// Whether page policy allows media to start loading yet. When it
    /// returns false the element waits for `MediaElement::media_can_start`.
    fn can_start_media(&self) -> bool {
        true
    }

    fn processing_user_gesture(&self) -> bool {
        false
    }

    /// Page-level volume multiplier.
    fn media_volume(&self) -> f64 {
        1.0
    }

    fn increment_load_event_delay_count(&self) {}

    fn decrement_load_event_delay_count(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Children(Vec<SourceId>);

    impl DocumentContext for Children {
        fn base_url(&self) -> Url {
            Url::parse("https://example.com/").unwrap()
        }

        fn source_children(&self) -> Vec<SourceId> {
            self.0.clone()
        }

        fn source_candidate(&self, _source: SourceId) -> Option<SourceCandidate> {
            None
        }
    }

    #[test]
    fn siblings_follow_tree_order() {
        let document = Children(vec![SourceId(3), SourceId(1), SourceId(2)]);
        assert_eq!(document.next_source_sibling(None), Some(SourceId(3)));
        assert_eq!(document.next_source_sibling(Some(SourceId(1))), Some(SourceId(2)));
        assert_eq!(document.next_source_sibling(Some(SourceId(2))), None);
        assert_eq!(document.next_source_sibling(Some(SourceId(9))), None);
        assert!(!document.source_is_child(SourceId(9)));
    }
}
