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

//! Loading of zone tables from zone files.
//!
//! A zone file is plain text with one record per line. Each line must
//! consist of exactly three tokens separated by whitespace: the
//! domain, the type, and the value. There is no comment syntax, and
//! neither TTLs nor multi-line records are supported.
//!
//! Loading is tolerant. A line that does not have exactly three tokens
//! (including a blank line), that is not valid UTF-8, or whose fields
//! are too long for a [`Record`] is skipped, as is any record found
//! once the table is full. Each skipped line is reported as an
//! [`Issue`] alongside the loaded table; only failure to open or read
//! the file at all is an [`Error`].
//!
//! ```
//! use std::io::Cursor;
//! use textzone::zone_file::{self, IssueKind};
//!
//! const ZONE_FILE: &[u8] = b"\
//! example.com A 93.184.216.34
//! bad line only two
//! www.example.com CNAME example.com
//! ";
//!
//! let loaded = zone_file::load(Cursor::new(ZONE_FILE)).unwrap();
//! assert_eq!(loaded.table.len(), 2);
//! assert_eq!(loaded.issues.len(), 1);
//! assert_eq!(loaded.issues[0].line, 2);
//! assert_eq!(loaded.issues[0].kind, IssueKind::Malformed);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str;

use crate::record::{self, Record};
use crate::zone::ZoneTable;

mod error;
pub use error::{Error, Result};

/// The result of loading a zone file: the table, plus any lines that
/// were skipped along the way.
#[derive(Debug, Default)]
pub struct Loaded {
    pub table: ZoneTable,
    pub issues: Vec<Issue>,
}

/// A zone file line that did not contribute a record to the table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Issue {
    /// The (one-based) line number.
    pub line: usize,
    pub kind: IssueKind,
}

/// The reasons a zone file line may be skipped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IssueKind {
    /// The line did not consist of exactly three tokens, or was not
    /// valid UTF-8.
    Malformed,

    /// A field was too long to fit in a [`Record`].
    FieldTooLong(record::Error),

    /// The line was well-formed, but the table was already full.
    OverCapacity,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            IssueKind::Malformed => write!(
                f,
                "line {}: expected exactly three fields (domain, type, value)",
                self.line,
            ),
            IssueKind::FieldTooLong(e) => write!(f, "line {}: {}", self.line, e),
            IssueKind::OverCapacity => write!(
                f,
                "line {}: the zone table is full; record ignored",
                self.line,
            ),
        }
    }
}

/// Opens the zone file at `path` and loads it into a new
/// [`ZoneTable`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Loaded> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::new(path, e))?;
    load(BufReader::new(file)).map_err(|e| Error::new(path, e))
}

/// Loads a zone file from `reader` into a new [`ZoneTable`].
pub fn load<R: BufRead>(mut reader: R) -> io::Result<Loaded> {
    let mut loaded = Loaded::default();
    let mut buf = Vec::new();
    let mut line = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line += 1;
        if let Err(kind) = load_line(&mut loaded.table, &buf) {
            loaded.issues.push(Issue { line, kind });
        }
    }

    Ok(loaded)
}

/// Parses a single line and appends its record to `table`.
fn load_line(table: &mut ZoneTable, line: &[u8]) -> std::result::Result<(), IssueKind> {
    let text = str::from_utf8(line).map_err(|_| IssueKind::Malformed)?;
    let mut tokens = record::split_fields(text);
    let (domain, rr_type, value) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(d), Some(t), Some(v)) if tokens.next().is_none() => (d, t, v),
        _ => return Err(IssueKind::Malformed),
    };
    let record = Record::new(domain, rr_type, value).map_err(IssueKind::FieldTooLong)?;
    table.push(record).map_err(|_| IssueKind::OverCapacity)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
