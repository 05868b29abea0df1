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

//! The request-handling logic of the server.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;

use crate::protocol::{Query, Response};
use crate::zone::ZoneTable;

/// The size of the buffer into which request datagrams are received.
/// Longer datagrams are truncated by the operating system.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// A zone server, abstracted from any underlying network I/O provider.
///
/// The `Server` structure implements the request-processing logic: it
/// parses request datagrams, resolves them against its [`ZoneTable`],
/// and produces response datagrams through [`Server::handle_message`].
/// An I/O provider (see [`crate::io`]) is responsible for receiving the
/// requests from the network and sending the responses.
///
/// The table is fixed when the `Server` is created. A `Server` is
/// normally shared among workers through an [`Arc`]; handling a message
/// takes only a shared reference.
#[derive(Debug)]
pub struct Server {
    zone: Arc<ZoneTable>,
}

impl Server {
    /// Creates a new `Server` that will serve the provided table.
    pub fn new(zone: Arc<ZoneTable>) -> Self {
        Self { zone }
    }

    /// Handles a received request datagram from `src`, returning the
    /// response datagram to send back.
    ///
    /// Every request gets exactly one response. A request that does
    /// not name a domain is answered the same way as a request for a
    /// domain that is not in the table.
    pub fn handle_message(&self, received: &[u8], src: SocketAddr) -> Vec<u8> {
        let response = match Query::parse(received) {
            Ok(query) => match self.zone.lookup(query.domain) {
                Some(record) => {
                    debug!("{src}: {} -> {record}", query.domain);
                    Response::Found(record)
                }
                None => {
                    debug!("{src}: {} not found", query.domain);
                    Response::NotFound
                }
            },
            Err(e) => {
                debug!("{src}: invalid request: {e}");
                Response::NotFound
            }
        };
        response.to_bytes()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
