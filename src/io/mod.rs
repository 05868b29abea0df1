// Copyright 2022 Matthew Ingwersen.
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

//! I/O providers for running [`Server`s](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) structure implements request
//! handling abstracted from network I/O. To actually run a
//! [`Server`](crate::server::Server), an I/O provider is needed. The
//! providers here bind a UDP socket and, when started, run a listener
//! that receives request datagrams and hands each one to its own
//! worker, which produces the response and sends it back to the
//! client. They differ in their concurrency substrate:
//!
//! * [`BlockingIoProvider`] runs the listener on a thread and its
//!   workers on a bounded [`WorkerPool`](crate::thread::WorkerPool).
//!
//! * `TokioIoProvider` (with the `tokio` feature) runs the listener and
//!   one task per request on a Tokio runtime, with a cap on the number
//!   of requests in flight.
//!
//! In both, a listener at capacity stops receiving until a worker
//! finishes, leaving further datagrams in the socket's receive buffer.
//! Every request it has received is answered.

use std::io;
use std::thread;

use log::error;

mod blocking;
#[cfg(feature = "tokio")]
mod tokio;

pub use blocking::{BlockingIoConfig, BlockingIoProvider};
#[cfg(feature = "tokio")]
pub use self::tokio::{TokioIoConfig, TokioIoProvider, TokioShutdownController};

/// Executes `f`, retrying the operation if it is interrupted.
fn retry_if_interrupted<F, R>(mut f: F) -> io::Result<R>
where
    F: FnMut() -> io::Result<R>,
{
    loop {
        match f() {
            Ok(r) => return Ok(r),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Logs an I/O error, naming the current thread.
fn log_io_error(e: io::Error) {
    let current_thread = thread::current();
    let thread_name = current_thread.name().unwrap_or("anonymous thread");
    error!("I/O error in thread {}: {}", thread_name, e);
}
