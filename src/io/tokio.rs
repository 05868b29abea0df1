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

//! Implementation of the Tokio I/O provider.

// NOTE: In this provider, I/O errors never end the receiver task; they
// are logged and the receiver goes back to waiting. The
// run_with_respawning function acts as a supervisor that respawns the
// receiver, after a delay, if it panics. When max_in_flight requests are
// being handled, the receiver waits for a permit before receiving more.

use std::io;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::error;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::server::{Server, MAX_MESSAGE_SIZE};

/// A Tokio I/O provider.
///
/// This provider uses asynchronous I/O and runs the server by spawning
/// tasks on a Tokio runtime: one receiver task, plus one task per
/// received request. At most [`TokioIoConfig::max_in_flight`] request
/// tasks run at once; beyond that, the receiver waits for one to finish
/// before dispatching the next request.
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    config: TokioIoConfig,
    socket: Arc<UdpSocket>,
}

/// Configuration options for the [`TokioIoProvider`].
#[derive(Clone, Copy, Debug)]
pub struct TokioIoConfig {
    /// The maximum number of requests being handled at once.
    pub max_in_flight: NonZeroUsize,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This call binds the UDP socket
    /// in preparation, but does not start the server. This function
    /// requires that the Tokio runtime be active.
    pub async fn bind(config: TokioIoConfig, addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            config,
            socket: Arc::new(socket),
        })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut down the
    /// tasks at a later time. (The [`TokioShutdownController`] must be
    /// held as long as the server should be running, since dropping it
    /// will trigger shutdown.)
    pub fn start(self, server: &Arc<Server>) -> TokioShutdownController {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.get()));
        tokio::spawn(run_with_respawning(
            shutdown_handle,
            server.clone(),
            self.socket,
            permits,
        ));
        shutdown_controller
    }
}

/// How long to wait between respawns of the receiver. This is to
/// prevent a receiver that crashes immediately from using up
/// significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// Runs the receiver task, respawning it if it panics or is cancelled.
async fn run_with_respawning(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: Arc<UdpSocket>,
    permits: Arc<Semaphore>,
) {
    loop {
        let last_spawn_time = Instant::now();
        let receiver = run_udp_receiver(
            shutdown.clone(),
            server.clone(),
            socket.clone(),
            permits.clone(),
        );
        if tokio::spawn(receiver).await.is_ok() {
            return;
        }
        error!("The UDP receiver task panicked");

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = Instant::now().duration_since(last_spawn_time);
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.request_receiver.recv() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

/// The UDP receiver loop. This returns only on shutdown.
async fn run_udp_receiver(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: Arc<UdpSocket>,
    permits: Arc<Semaphore>,
) {
    loop {
        let mut received_buf = vec![0; MAX_MESSAGE_SIZE];

        // Receive a request (or a shutdown request).
        let result = tokio::select! {
            _ = shutdown.request_receiver.recv() => return,
            res = socket.recv_from(&mut received_buf) => res,
        };
        let (received_len, src) = match result {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to receive a request: {e}");
                continue;
            }
        };
        if received_len == 0 {
            continue;
        }
        received_buf.truncate(received_len);

        let permit = tokio::select! {
            _ = shutdown.request_receiver.recv() => return,
            res = permits.clone().acquire_owned() => match res {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Dropped the request from {src}: {e}");
                    continue;
                }
            },
        };

        // In a new Tokio task, handle the request and send the
        // response.
        let wait_sender = shutdown.wait_sender.clone();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let response = server.handle_message(&received_buf, src);
            if let Err(e) = socket.send_to(&response, src).await {
                log_io_error(e);
            }

            // This ensures that the permit and the shutdown handle are
            // moved into the new task.
            drop(permit);
            drop(wait_sender);
        });
    }
}

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is used to shut down the Tokio tasks spawned by
/// [`TokioIoProvider::start`]. Use
/// [`TokioShutdownController::shut_down`] to initiate shutdown and wait
/// for its completion. Dropping the controller will also trigger
/// shutdown (but will not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate. Requests already being handled are allowed
    /// to finish.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// This type has two roles:
///
/// 1. It enables tasks to listen for graceful shutdown signals. This
///    is done by waiting for all senders attached to `request_receiver`
///    to close.
/// 2. It prevents graceful shutdown from completing until it is
///    dropped. This is done by holding `wait_sender`. All server tasks
///    therefore own a `ShutdownHandle` (or at least the `wait_sender`
///    component).
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // A resubscribed receiver misses values already queued, but no
        // values are ever sent: the signal is all senders closing.
        ShutdownHandle {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`TokioShutdownController`] and an initial
/// [`ShutdownHandle`] connected to it.
fn make_shutdown_channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

/// Logs an I/O error.
fn log_io_error(e: io::Error) {
    error!("I/O error: {e}");
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
