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

//! Implementation of the blocking I/O provider.

// NOTE: In this provider, I/O errors never end the listener. A failed
// receive is logged and the listener goes back to waiting; a failed
// send is logged and the worker finishes. When the workers fall
// behind, the listener blocks in WorkerPool::submit and new datagrams
// wait in the socket's receive buffer.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::error;

use super::{log_io_error, retry_if_interrupted};
use crate::server::{Server, MAX_MESSAGE_SIZE};
use crate::thread::{self, ThreadGroup, WorkerPool};

/// A blocking I/O provider.
///
/// This provider uses blocking I/O on a single UDP socket. One
/// listener thread receives datagrams; each datagram becomes a task on
/// a [`WorkerPool`] of a configurable number of workers, which share
/// the socket to send their replies.
///
/// The provider supports graceful shutdown: shut down the
/// [`ThreadGroup`] in which it was started (see
/// [`BlockingIoProvider::start`]). The listener notices within a
/// second, and the workers exit once they have handled every request
/// already accepted.
pub struct BlockingIoProvider {
    config: BlockingIoConfig,
    socket: Arc<UdpSocket>,
}

/// Configuration options for the [`BlockingIoProvider`].
#[derive(Clone, Copy, Debug)]
pub struct BlockingIoConfig {
    /// The number of worker threads.
    pub workers: NonZeroUsize,

    /// How many received requests may wait for a worker. While this
    /// many are waiting, the listener stops receiving until a worker
    /// frees up.
    pub queue_depth: usize,
}

impl BlockingIoProvider {
    /// Creates a new `BlockingIoProvider`. This call binds the UDP
    /// socket in preparation, but does not start the server.
    pub fn bind(config: BlockingIoConfig, addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(CHECK_FOR_SHUTDOWN_TIMEOUT))?;
        Ok(Self {
            config,
            socket: Arc::new(socket),
        })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the server on the provided [`ThreadGroup`].
    pub fn start(
        self,
        server: &Arc<Server>,
        group: &Arc<ThreadGroup>,
    ) -> Result<(), thread::Error> {
        let pool = WorkerPool::start(group, "udp", self.config.workers, self.config.queue_depth)?;
        let listener_pool = pool.clone();
        let group_clone = group.clone();
        let server = server.clone();
        let socket = self.socket;
        let task = move || {
            run_udp_listener(&group_clone, &listener_pool, &server, &socket);
            listener_pool.close();
        };
        group.spawn("udp listener".to_owned(), task).map_err(|e| {
            pool.close();
            e
        })
    }
}

/// This defines the timeout on UDP receive operations. The listener
/// checks for thread group shutdown between receives, so this is the
/// maximum time shutdown waits for it.
const CHECK_FOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// A received request, owned by the worker that handles it.
struct Request {
    received: Box<[u8]>,
    src: SocketAddr,
}

/// The UDP receive/dispatch loop. This returns once the group begins
/// shutting down.
fn run_udp_listener(
    group: &ThreadGroup,
    pool: &WorkerPool,
    server: &Arc<Server>,
    socket: &Arc<UdpSocket>,
) {
    let mut received_buf = [0; MAX_MESSAGE_SIZE];

    loop {
        if group.is_shutting_down() {
            return;
        }

        let (received_len, src) = match socket.recv_from(&mut received_buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Failed to receive a request: {}", e);
                continue;
            }
        };
        if received_len == 0 {
            continue;
        }

        let request = Request {
            received: received_buf[..received_len].into(),
            src,
        };
        let server = server.clone();
        let socket = socket.clone();
        if let Err(e) = pool.submit(move || handle_request(&server, &socket, request)) {
            error!("Dropped the request from {}: {}", src, e);
            return;
        }
    }
}

/// Handles one request: resolves it and sends the reply. A failed send
/// is logged and not retried.
fn handle_request(server: &Server, socket: &UdpSocket, request: Request) {
    let response = server.handle_message(&request.received, request.src);
    if let Err(e) = retry_if_interrupted(|| socket.send_to(&response, request.src)) {
        log_io_error(e);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::Ipv4Addr;
    use std::thread as std_thread;

    use super::*;
    use crate::zone_file;

    const ZONE_FILE: &str = "\
example.com A 93.184.216.34
bad line only two
";

    fn start_server(zone_file: &str) -> (Arc<ThreadGroup>, SocketAddr) {
        start_server_with(zone_file, 4, 64)
    }

    fn start_server_with(
        zone_file: &str,
        workers: usize,
        queue_depth: usize,
    ) -> (Arc<ThreadGroup>, SocketAddr) {
        let loaded = zone_file::load(Cursor::new(zone_file.as_bytes())).unwrap();
        let server = Arc::new(Server::new(Arc::new(loaded.table)));
        let config = BlockingIoConfig {
            workers: NonZeroUsize::new(workers).unwrap(),
            queue_depth,
        };
        let provider =
            BlockingIoProvider::bind(config, (Ipv4Addr::LOCALHOST, 0).into()).unwrap();
        let addr = provider.local_addr().unwrap();
        let group = ThreadGroup::new();
        provider.start(&server, &group).unwrap();
        (group, addr)
    }

    fn client() -> UdpSocket {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        socket
    }

    fn query(socket: &UdpSocket, server_addr: SocketAddr, request: &[u8]) -> String {
        socket.send_to(request, server_addr).unwrap();
        let mut buf = [0; MAX_MESSAGE_SIZE];
        let (len, from) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(from, server_addr);
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    fn stop_server(group: Arc<ThreadGroup>) {
        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn server_answers_queries_over_udp() {
        let (group, addr) = start_server(ZONE_FILE);
        let socket = client();
        assert_eq!(
            query(&socket, addr, b"QUERY example.com"),
            "example.com A 93.184.216.34",
        );
        assert_eq!(query(&socket, addr, b"QUERY unknown.test"), "Domain not found");
        assert_eq!(query(&socket, addr, b"QUERY bad"), "Domain not found");
        stop_server(group);
    }

    #[test]
    fn empty_datagrams_are_ignored() {
        let (group, addr) = start_server(ZONE_FILE);
        let socket = client();
        socket.send_to(b"", addr).unwrap();
        assert_eq!(
            query(&socket, addr, b"QUERY example.com"),
            "example.com A 93.184.216.34",
        );
        stop_server(group);
    }

    #[test]
    fn concurrent_queries_get_their_own_answers() {
        const CLIENTS: usize = 16;
        let mut zone = String::new();
        for i in 0..CLIENTS {
            zone.push_str(&format!("host{i}.test A 192.0.2.{i}\n"));
        }
        let (group, addr) = start_server(&zone);

        let clients: Vec<_> = (0..CLIENTS)
            .map(|i| {
                std_thread::spawn(move || {
                    let socket = client();
                    let request = format!("QUERY host{i}.test");
                    (i, query(&socket, addr, request.as_bytes()))
                })
            })
            .collect();
        for client in clients {
            let (i, response) = client.join().unwrap();
            assert_eq!(response, format!("host{i}.test A 192.0.2.{i}"));
        }
        stop_server(group);
    }

    #[test]
    fn bursts_beyond_pool_capacity_are_fully_answered() {
        const REQUESTS: usize = 200;
        const WAVE: usize = 25;
        let mut zone = String::new();
        for i in 0..REQUESTS {
            zone.push_str(&format!("host{i}.test A 10.0.{}.{}\n", i / 256, i % 256));
        }
        // One worker and a queue of two: every wave overruns the pool.
        let (group, addr) = start_server_with(&zone, 1, 2);

        let socket = client();
        let reader_socket = socket.try_clone().unwrap();
        let reader = std_thread::spawn(move || {
            let mut answered = 0;
            let mut buf = [0; MAX_MESSAGE_SIZE];
            while answered < REQUESTS {
                let (len, _) = reader_socket.recv_from(&mut buf).unwrap();
                assert!(buf[..len].starts_with(b"host"));
                answered += 1;
            }
            answered
        });

        for wave in 0..REQUESTS / WAVE {
            for i in wave * WAVE..(wave + 1) * WAVE {
                let request = format!("QUERY host{i}.test");
                socket.send_to(request.as_bytes(), addr).unwrap();
            }
            std_thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reader.join().unwrap(), REQUESTS);
        stop_server(group);
    }
}
