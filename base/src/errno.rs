// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io;

use thiserror::Error;

/// Error returned by a failed syscall, carrying the raw errno value so
/// callers can match on it (e.g. `ENODEV` when the board is unplugged).
#[derive(Error, Debug)]
#[error("{0}")]
pub struct Error(io::Error);

impl Error {
    pub fn last() -> Error {
        Error(io::Error::last_os_error())
    }

    pub fn errno(&self) -> i32 {
        self.0.raw_os_error().unwrap_or(0)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
