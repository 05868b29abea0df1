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

//! The text query/response protocol.
//!
//! This is not the DNS wire format. A request is a single datagram
//! holding tokens separated by ASCII whitespace, of which the second is
//! the domain to resolve; the first is a command marker (conventionally
//! `QUERY`) that is required but not interpreted, and any further
//! tokens are ignored. A response is a single datagram holding either
//! the matching record in `<domain> <type> <value>` form or the literal
//! text [`NOT_FOUND`]. There are no request IDs, so concurrent replies
//! can only be told apart by their domain field.

use std::fmt;
use std::str;

use crate::record::{self, Record};

/// The response sent when no record matches the request.
pub const NOT_FOUND: &str = "Domain not found";

/// A parsed request, borrowing from the received datagram.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Query<'a> {
    /// The command marker (the first token).
    pub command: &'a str,

    /// The domain to resolve (the second token).
    pub domain: &'a str,
}

impl<'a> Query<'a> {
    /// Parses a request datagram.
    pub fn parse(datagram: &'a [u8]) -> Result<Self, InvalidRequest> {
        let text = str::from_utf8(datagram).map_err(|_| InvalidRequest::NotUtf8)?;
        let mut tokens = record::split_fields(text);
        match (tokens.next(), tokens.next()) {
            (Some(command), Some(domain)) => Ok(Self { command, domain }),
            _ => Err(InvalidRequest::MissingDomain),
        }
    }
}

/// A response to a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Response<'a> {
    Found(&'a Record),
    NotFound,
}

impl Response<'_> {
    /// Serializes the response into a new datagram payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Response<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Found(record) => fmt::Display::fmt(record, f),
            Self::NotFound => f.write_str(NOT_FOUND),
        }
    }
}

/// The ways a request datagram can fail to name a domain. Invalid
/// requests are answered as though the domain were not found.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InvalidRequest {
    /// The datagram was not valid UTF-8.
    NotUtf8,

    /// The datagram had fewer than two tokens.
    MissingDomain,
}

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NotUtf8 => f.write_str("request is not valid UTF-8"),
            Self::MissingDomain => f.write_str("request has no domain token"),
        }
    }
}

impl std::error::Error for InvalidRequest {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_takes_the_second_token_as_domain() {
        assert_eq!(
            Query::parse(b"QUERY example.com"),
            Ok(Query {
                command: "QUERY",
                domain: "example.com"
            }),
        );
        assert_eq!(
            Query::parse(b"  A\twww.example.com extra tokens\n").map(|q| q.domain),
            Ok("www.example.com"),
        );
        assert_eq!(
            Query::parse(b"QUERY\x0Bexample.com").map(|q| q.domain),
            Ok("example.com"),
        );
    }

    #[test]
    fn parse_rejects_requests_without_a_domain() {
        assert_eq!(Query::parse(b""), Err(InvalidRequest::MissingDomain));
        assert_eq!(Query::parse(b"   \n"), Err(InvalidRequest::MissingDomain));
        assert_eq!(Query::parse(b"QUERY"), Err(InvalidRequest::MissingDomain));
        assert_eq!(
            Query::parse(b"QUERY caf\xe9.test"),
            Err(InvalidRequest::NotUtf8)
        );
    }

    #[test]
    fn responses_are_formatted_correctly() {
        let record = Record::new("example.com", "A", "93.184.216.34").unwrap();
        assert_eq!(
            Response::Found(&record).to_bytes(),
            b"example.com A 93.184.216.34",
        );
        assert_eq!(Response::NotFound.to_bytes(), b"Domain not found");
    }
}
