// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Error type for zone file loading.

use std::fmt;
use std::io;
use std::path::Path;

/// Represents failure to open or read a zone file.
///
/// Problems with individual lines are not errors; they are reported as
/// [`Issue`s](super::Issue) instead.
#[derive(Debug)]
pub struct Error {
    path: Box<Path>,
    io_error: io::Error,
}

impl Error {
    pub(super) fn new(path: &Path, io_error: io::Error) -> Self {
        Self {
            path: path.into(),
            io_error,
        }
    }

    /// Returns the path of the zone file that could not be loaded.
    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    /// Returns the underlying I/O error.
    pub fn io_error(&self) -> &io::Error {
        &self.io_error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "zone file {} is unavailable: {}",
            self.path.display(),
            self.io_error,
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.io_error)
    }
}

/// A result type for zone file loading.
pub type Result<T> = std::result::Result<T, Error>;
