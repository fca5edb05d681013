/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The `<source>` children half of the resource selection algorithm.
//!
//! <https://html.spec.whatwg.org/multipage/#concept-media-load-algorithm>
//!
//! The element keeps a cursor into the document's list of `<source>`
//! children: the candidate being loaded and the next one to consider. The
//! cursor only ever moves forward within one load cycle.

use data_url::DataUrl;
use log::{debug, warn};
use media_engine_traits::{ContentType, MediaEngineBackend, SupportsMediaType};
use url::Url;

use crate::document::{DocumentContext, SourceId};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadState {
    #[default]
    WaitingForSource,
    LoadingFromSrcAttribute,
    LoadingFromSourceElement,
}

/// Whether rejected candidates get an `error` event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvalidUrlAction {
    DoNothing,
    Complain,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectedSource {
    pub url: Url,
    pub content_type: ContentType,
    pub key_system: String,
    pub source: SourceId,
}

/// The outcome of walking the candidates.
#[derive(Debug, Default, PartialEq)]
pub struct SourceSelection {
    pub selected: Option<SelectedSource>,
    /// Candidates that must receive an `error` event, in walk order.
    pub rejected: Vec<SourceId>,
}

/// What the element has to do after a `<source>` was inserted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceAddedAction {
    None,
    /// Run the resource selection algorithm from scratch.
    LoadElement,
    /// Leave the waiting state and try the next candidate.
    ResumeSelection,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResourceSelection {
    pub current_source_node: Option<SourceId>,
    pub next_child_node_to_consider: Option<SourceId>,
    pub load_state: LoadState,
}

impl ResourceSelection {
    /// Walk the candidates from the cursor to the first loadable one.
    ///
    /// Listeners run during the walk and may mutate the document, so the
    /// caller commits the result with [`ResourceSelection::commit`] on
    /// whatever the cursor has become in the meantime.
    pub fn select_next_source_child(
        &self,
        document: &dyn DocumentContext,
        backend: &dyn MediaEngineBackend,
        action_if_invalid: InvalidUrlAction,
    ) -> SourceSelection {
        let mut selection = SourceSelection::default();
        let mut node = self.next_child_node_to_consider;

        while let Some(source) = node {
            // Computed before any listener had a chance to detach `source`.
            let following = document.next_source_sibling(Some(source));
            match consider_candidate(document, backend, source, action_if_invalid) {
                Candidate::Usable(selected) => {
                    selection.selected = Some(selected);
                    return selection;
                },
                Candidate::Rejected => {
                    if action_if_invalid == InvalidUrlAction::Complain {
                        selection.rejected.push(source);
                    }
                },
                Candidate::Detached => {},
            }
            node = if document.source_is_child(source) {
                document.next_source_sibling(Some(source))
            } else {
                following.filter(|following| document.source_is_child(*following))
            };
        }
        selection
    }

    /// Move the cursor past the selected candidate, or clear it when none was
    /// usable.
    pub fn commit(&mut self, document: &dyn DocumentContext, selection: &SourceSelection) {
        match selection.selected {
            Some(ref selected) => {
                self.current_source_node = Some(selected.source);
                self.next_child_node_to_consider =
                    document.next_source_sibling(Some(selected.source));
            },
            None => {
                self.current_source_node = None;
                self.next_child_node_to_consider = None;
            },
        }
    }

    /// Whether any candidate after the cursor could be loaded. Leaves the
    /// cursor untouched.
    pub fn have_potential_source_child(
        &self,
        document: &dyn DocumentContext,
        backend: &dyn MediaEngineBackend,
    ) -> bool {
        self.select_next_source_child(document, backend, InvalidUrlAction::DoNothing)
            .selected
            .is_some()
    }

    /// A `<source>` child was inserted. The caller has already checked that
    /// the element has no `src` attribute.
    pub fn source_was_added(
        &mut self,
        document: &dyn DocumentContext,
        source: SourceId,
        network_state_is_empty: bool,
    ) -> SourceAddedAction {
        debug!("Source {:?} inserted, cursor {:?}", source, self);

        if network_state_is_empty {
            self.next_child_node_to_consider = Some(source);
            return SourceAddedAction::LoadElement;
        }

        if let Some(current) = self.current_source_node {
            if document.next_source_sibling(Some(current)) == Some(source) {
                self.next_child_node_to_consider = Some(source);
                // A failed candidate can leave the current node set while
                // waiting, and nothing else would wake the algorithm up.
                return if self.load_state == LoadState::WaitingForSource {
                    SourceAddedAction::ResumeSelection
                } else {
                    SourceAddedAction::None
                };
            }
        }

        if self.next_child_node_to_consider.is_some() {
            return SourceAddedAction::None;
        }

        self.next_child_node_to_consider = Some(source);
        SourceAddedAction::ResumeSelection
    }

    /// A `<source>` child was removed from the document.
    pub fn source_was_removed(&mut self, document: &dyn DocumentContext, source: SourceId) {
        debug!("Source {:?} removed, cursor {:?}", source, self);

        if self.next_child_node_to_consider == Some(source) {
            if let Some(current) = self.current_source_node {
                self.next_child_node_to_consider = document.next_source_sibling(Some(current));
            }
        } else if self.current_source_node == Some(source) {
            // The resource keeps playing; only the cursor forgets the node.
            self.current_source_node = None;
        }
    }
}

enum Candidate {
    Usable(SelectedSource),
    Rejected,
    /// No longer a child once the `beforeload` listeners ran.
    Detached,
}

fn consider_candidate(
    document: &dyn DocumentContext,
    backend: &dyn MediaEngineBackend,
    source: SourceId,
    action_if_invalid: InvalidUrlAction,
) -> Candidate {
    if !document.source_is_child(source) {
        return Candidate::Detached;
    }
    let Some(candidate) = document.source_candidate(source) else {
        return Candidate::Detached;
    };

    // If candidate does not have a src attribute, or if its src attribute's
    // value is the empty string, jump to the failed step.
    if candidate.src.trim().is_empty() {
        return Candidate::Rejected;
    }
    let Ok(url) = document.base_url().join(candidate.src.trim()) else {
        if action_if_invalid == InvalidUrlAction::Complain {
            warn!("Cannot resolve media source {:?}", candidate.src);
        }
        return Candidate::Rejected;
    };

    if !candidate.media.is_empty() && !document.evaluate_media_query(&candidate.media) {
        debug!("Source {:?} rejected by media query {:?}", source, candidate.media);
        return Candidate::Rejected;
    }

    let mut mime_type = candidate.mime_type.clone();
    if mime_type.is_empty() && url.scheme() == "data" {
        mime_type = mime_type_from_data_url(&url).unwrap_or_default();
    }
    let content_type = ContentType::new(&mime_type);
    let key_system = candidate.key_system;
    if (!content_type.is_empty() || !key_system.is_empty()) &&
        backend.supports_type(&content_type, &key_system) == SupportsMediaType::No
    {
        debug!("Source {:?} has unsupported type {}", source, content_type);
        return Candidate::Rejected;
    }

    let ok_to_load_source_url =
        document.is_safe_to_load(&url) && document.dispatch_before_load(&url, Some(source));

    // A beforeload listener can mutate the document.
    if !document.source_is_child(source) {
        return Candidate::Detached;
    }
    if !ok_to_load_source_url {
        if action_if_invalid == InvalidUrlAction::Complain {
            warn!("Not allowed to load media source {}", url);
        }
        return Candidate::Rejected;
    }

    Candidate::Usable(SelectedSource {
        url,
        content_type,
        key_system,
        source,
    })
}

fn mime_type_from_data_url(url: &Url) -> Option<String> {
    let data_url = DataUrl::process(url.as_str()).ok()?;
    let mime = data_url.mime_type();
    Some(format!("{}/{}", mime.type_, mime.subtype))
}
