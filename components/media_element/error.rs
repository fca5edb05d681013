/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;

/// DOM exceptions raised by media element operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// IndexSizeError DOMException
    IndexSize,
    /// InvalidStateError DOMException
    InvalidState,
    /// NotSupportedError DOMException
    NotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Error::IndexSize => "IndexSizeError",
            Error::InvalidState => "InvalidStateError",
            Error::NotSupported => "NotSupportedError",
        };
        formatter.write_str(name)
    }
}

impl std::error::Error for Error {}

pub type ErrorResult = Fallible<()>;

pub type Fallible<T> = Result<T, Error>;

/// <https://html.spec.whatwg.org/multipage/#mediaerror>
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum MediaErrorCode {
    Aborted = 1,
    Network = 2,
    Decode = 3,
    SrcNotSupported = 4,
    Encrypted = 5,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MediaError {
    code: MediaErrorCode,
}

impl MediaError {
    pub fn new(code: MediaErrorCode) -> MediaError {
        MediaError { code }
    }

    pub fn code(&self) -> MediaErrorCode {
        self.code
    }

    /// The numeric value exposed to script.
    pub fn code_value(&self) -> u16 {
        self.code as u16
    }
}
