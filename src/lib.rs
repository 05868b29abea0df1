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

//! Textzone is a small zone server that answers queries for a fixed
//! table of records over UDP, using a private text protocol rather
//! than the DNS wire format.
//!
//! The library is organized bottom-up:
//!
//! * [`record`] defines the [`Record`](record::Record) type, a
//!   length-checked (domain, type, value) triple.
//! * [`zone`] defines the [`ZoneTable`](zone::ZoneTable), a bounded,
//!   ordered collection of records with first-match-wins lookup.
//! * [`zone_file`] loads a [`ZoneTable`](zone::ZoneTable) from a zone
//!   file.
//! * [`protocol`] parses request datagrams and formats responses.
//! * [`server`] ties these together into a transport-independent
//!   request handler, the [`Server`](server::Server).
//! * [`io`] provides the I/O providers that receive requests from the
//!   network and dispatch each to its own worker, and [`thread`]
//!   provides the thread group and pool they run on.

pub mod io;
pub mod protocol;
pub mod record;
pub mod server;
pub mod thread;
pub mod zone;
pub mod zone_file;
