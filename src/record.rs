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

//! Implementation of the [`Record`] type.

use std::fmt;

use arrayvec::ArrayString;

/// The maximum length of a [`Record`]'s domain, in octets.
pub const MAX_DOMAIN_LEN: usize = 254;

/// The maximum length of a [`Record`]'s type, in octets.
pub const MAX_TYPE_LEN: usize = 254;

/// The maximum length of a [`Record`]'s value, in octets.
pub const MAX_VALUE_LEN: usize = 1023;

/// A single resolvable name-to-value mapping.
///
/// A `Record` is a (domain, type, value) triple of strings. Each field
/// has a fixed maximum length, and the lengths are checked when the
/// `Record` is constructed through [`Record::new`]. The fields are
/// stored inline, so a `Record` owns no heap allocations.
///
/// Records are immutable once created. The [`Display`](fmt::Display)
/// implementation produces the `<domain> <type> <value>` form used both
/// in zone files and in responses.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Record {
    domain: ArrayString<MAX_DOMAIN_LEN>,
    rr_type: ArrayString<MAX_TYPE_LEN>,
    value: ArrayString<MAX_VALUE_LEN>,
}

impl Record {
    /// Creates a new `Record`, failing if any field exceeds its maximum
    /// length.
    pub fn new(domain: &str, rr_type: &str, value: &str) -> Result<Self, Error> {
        Ok(Self {
            domain: ArrayString::from(domain).map_err(|_| Error::DomainTooLong)?,
            rr_type: ArrayString::from(rr_type).map_err(|_| Error::TypeTooLong)?,
            value: ArrayString::from(value).map_err(|_| Error::ValueTooLong)?,
        })
    }

    /// Returns the domain this record resolves.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the record's type (e.g., `A` or `CNAME`). The type is
    /// opaque to the server.
    pub fn rr_type(&self) -> &str {
        &self.rr_type
    }

    /// Returns the record's value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.domain, self.rr_type, self.value)
    }
}

/// Splits zone file lines and requests into fields. Fields are
/// separated by runs of ASCII whitespace, including the vertical tab
/// (which [`char::is_ascii_whitespace`] leaves out).
pub(crate) fn split_fields(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_ascii_whitespace() || c == '\x0B')
        .filter(|field| !field.is_empty())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that arise when constructing a [`Record`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The domain was longer than [`MAX_DOMAIN_LEN`] octets.
    DomainTooLong,

    /// The type was longer than [`MAX_TYPE_LEN`] octets.
    TypeTooLong,

    /// The value was longer than [`MAX_VALUE_LEN`] octets.
    ValueTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::DomainTooLong => write!(f, "domain longer than {MAX_DOMAIN_LEN} octets"),
            Self::TypeTooLong => write!(f, "type longer than {MAX_TYPE_LEN} octets"),
            Self::ValueTooLong => write!(f, "value longer than {MAX_VALUE_LEN} octets"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_fields_at_maximum_length() {
        let domain = "d".repeat(MAX_DOMAIN_LEN);
        let rr_type = "t".repeat(MAX_TYPE_LEN);
        let value = "v".repeat(MAX_VALUE_LEN);
        let record = Record::new(&domain, &rr_type, &value).unwrap();
        assert_eq!(record.domain(), domain);
        assert_eq!(record.rr_type(), rr_type);
        assert_eq!(record.value(), value);
    }

    #[test]
    fn new_rejects_overlong_fields() {
        let long_domain = "d".repeat(MAX_DOMAIN_LEN + 1);
        let long_type = "t".repeat(MAX_TYPE_LEN + 1);
        let long_value = "v".repeat(MAX_VALUE_LEN + 1);
        assert_eq!(
            Record::new(&long_domain, "A", "192.0.2.1"),
            Err(Error::DomainTooLong),
        );
        assert_eq!(
            Record::new("textzone.test", &long_type, "192.0.2.1"),
            Err(Error::TypeTooLong),
        );
        assert_eq!(
            Record::new("textzone.test", "A", &long_value),
            Err(Error::ValueTooLong),
        );
    }

    #[test]
    fn split_fields_treats_vertical_tabs_as_separators() {
        let fields: Vec<_> = split_fields(" a\x0Bb\t\x0C c\r\n").collect();
        assert_eq!(fields, ["a", "b", "c"]);
        assert_eq!(split_fields(" \x0B\n").next(), None);
    }

    #[test]
    fn display_joins_fields_with_spaces() {
        let record = Record::new("example.com", "A", "93.184.216.34").unwrap();
        assert_eq!(record.to_string(), "example.com A 93.184.216.34");
    }
}
