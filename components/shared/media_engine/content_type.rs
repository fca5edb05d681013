/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;

use log::debug;
use mime::Mime;

/// A MIME type hint, as found in a `<source type>` attribute, including any
/// `codecs` parameter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentType {
    raw: String,
    mime: Option<Mime>,
}

impl ContentType {
    pub fn new(raw: &str) -> ContentType {
        let raw = raw.trim();
        let mime = if raw.is_empty() {
            None
        } else {
            match raw.parse::<Mime>() {
                Ok(mime) => Some(mime),
                Err(error) => {
                    debug!("Could not parse content type {:?}: {}", raw, error);
                    None
                },
            }
        };
        ContentType {
            raw: raw.to_owned(),
            mime,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The parsed type, or `None` if the hint is empty or malformed.
    pub fn mime(&self) -> Option<&Mime> {
        self.mime.as_ref()
    }

    /// `type/subtype`, lowercased, without parameters.
    pub fn essence(&self) -> Option<String> {
        self.mime.as_ref().map(|mime| mime.essence_str().to_ascii_lowercase())
    }

    pub fn codecs(&self) -> Option<&str> {
        self.mime
            .as_ref()
            .and_then(|mime| mime.get_param("codecs"))
            .map(|codecs| codecs.as_str())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}
