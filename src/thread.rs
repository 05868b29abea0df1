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

//! The threads behind the blocking I/O provider: a [`ThreadGroup`]
//! holding the listener and the workers, and the [`WorkerPool`] the
//! listener feeds requests into.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::mem;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::error;

////////////////////////////////////////////////////////////////////////
// THREAD GROUPS                                                      //
////////////////////////////////////////////////////////////////////////

/// The threads of one running server.
///
/// Long-running threads started with [`ThreadGroup::spawn`] poll
/// [`ThreadGroup::is_shutting_down`] and return once it is set.
/// [`ThreadGroup::await_shutdown`] then joins all of them.
pub struct ThreadGroup {
    shutting_down: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadGroup {
    /// Creates a new, empty thread group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shutting_down: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Starts a thread named `name` in the group.
    pub fn spawn<F>(&self, name: String, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut handles = self.handles.lock().unwrap();
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        handles.push(thread::Builder::new().name(name).spawn(task)?);
        Ok(())
    }

    /// Asks the threads of the group to exit. This does not wait; see
    /// [`ThreadGroup::await_shutdown`].
    pub fn shut_down(&self) {
        let _handles = self.handles.lock().unwrap();
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Returns whether the group is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Joins every thread of the group. Unless
    /// [`ThreadGroup::shut_down`] has been called, this waits for
    /// threads that may never exit.
    pub fn await_shutdown(&self) {
        let handles = mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("anonymous").to_owned();
            if handle.join().is_err() {
                error!("Thread {} panicked", name);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// WORKER POOLS                                                       //
////////////////////////////////////////////////////////////////////////

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed number of worker threads fed from a bounded queue.
///
/// A task is accepted by [`WorkerPool::submit`] when a worker is idle
/// or fewer than `queue_depth` accepted tasks are waiting for one.
/// Otherwise `submit` blocks until a worker frees up, so a producer
/// that outpaces the workers is slowed down instead of losing tasks.
///
/// [`WorkerPool::close`] stops accepting tasks. The workers run
/// everything already queued and then exit.
pub struct WorkerPool {
    queue_depth: usize,
    state: Mutex<PoolState>,

    /// Signalled when a task is queued or the pool is closed.
    task_ready: Condvar,

    /// Signalled when a worker becomes idle or the pool is closed.
    room_ready: Condvar,
}

struct PoolState {
    queue: VecDeque<Task>,
    idle_workers: usize,
    closed: bool,
}

impl WorkerPool {
    /// Starts a pool of `workers` threads in `group`. The threads are
    /// named after `name`.
    pub fn start(
        group: &ThreadGroup,
        name: &str,
        workers: NonZeroUsize,
        queue_depth: usize,
    ) -> Result<Arc<Self>, Error> {
        let pool = Arc::new(Self {
            queue_depth,
            state: Mutex::new(PoolState {
                queue: VecDeque::with_capacity(workers.get() + queue_depth),
                idle_workers: 0,
                closed: false,
            }),
            task_ready: Condvar::new(),
            room_ready: Condvar::new(),
        });
        for i in 0..workers.get() {
            let worker_pool = pool.clone();
            let result = group.spawn(format!("{} worker {}", name, i), move || {
                run_worker(&worker_pool)
            });
            if let Err(e) = result {
                // Lets the workers that did start exit.
                pool.close();
                return Err(e);
            }
        }
        Ok(pool)
    }

    /// Queues `task`, waiting for room if the pool is saturated. Fails
    /// only once the pool is closed.
    pub fn submit<F>(&self, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.state.lock().unwrap();
        let mut state = self
            .room_ready
            .wait_while(state, |s| {
                !s.closed && s.queue.len() >= s.idle_workers + self.queue_depth
            })
            .unwrap();
        if state.closed {
            return Err(Error::ShuttingDown);
        }
        state.queue.push_back(Box::new(task));
        self.task_ready.notify_one();
        Ok(())
    }

    /// Closes the pool to new tasks.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.task_ready.notify_all();
        self.room_ready.notify_all();
    }
}

/// The loop run by each worker thread. A panicking task is logged and
/// does not take its worker down with it.
fn run_worker(pool: &WorkerPool) {
    let mut state = pool.state.lock().unwrap();
    loop {
        state.idle_workers += 1;
        pool.room_ready.notify_one();
        let task = loop {
            if let Some(task) = state.queue.pop_front() {
                break task;
            } else if state.closed {
                state.idle_workers -= 1;
                return;
            }
            state = pool.task_ready.wait(state).unwrap();
        };
        state.idle_workers -= 1;
        drop(state);

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            let current_thread = thread::current();
            error!(
                "A task panicked in thread {}",
                current_thread.name().unwrap_or("anonymous")
            );
        }
        state = pool.state.lock().unwrap();
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error type for [`ThreadGroup`] and [`WorkerPool`] operations.
#[derive(Debug)]
pub enum Error {
    /// The operating system could not create a thread.
    Io(io::Error),

    /// The [`ThreadGroup`] is shutting down or the [`WorkerPool`] is
    /// closed.
    ShuttingDown,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => fmt::Display::fmt(err, f),
            Self::ShuttingDown => f.write_str("the server is shutting down"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn await_shutdown_joins_polling_threads() {
        let group = ThreadGroup::new();
        let (exited_tx, exited_rx) = mpsc::channel();
        for _ in 0..2 {
            let group_clone = group.clone();
            let exited_tx = exited_tx.clone();
            group
                .spawn("poller".to_owned(), move || {
                    while !group_clone.is_shutting_down() {
                        thread::sleep(Duration::from_millis(10));
                    }
                    exited_tx.send(()).unwrap();
                })
                .unwrap();
        }
        group.shut_down();
        group.await_shutdown();
        assert_eq!(exited_rx.try_iter().count(), 2);
    }

    #[test]
    fn spawn_fails_after_shutdown() {
        let group = ThreadGroup::new();
        group.shut_down();
        assert!(matches!(
            group.spawn("late".to_owned(), || ()),
            Err(Error::ShuttingDown)
        ));
        assert!(matches!(
            WorkerPool::start(&group, "late", workers(1), 1),
            Err(Error::ShuttingDown)
        ));
    }

    #[test]
    fn close_runs_queued_tasks_before_workers_exit() {
        let group = ThreadGroup::new();
        let pool = WorkerPool::start(&group, "test", workers(2), 8).unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        for _ in 0..8 {
            let done_tx = done_tx.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                done_tx.send(()).unwrap();
            })
            .unwrap();
        }
        pool.close();
        group.shut_down();
        group.await_shutdown();
        assert_eq!(done_rx.try_iter().count(), 8);
    }

    #[test]
    fn submit_waits_for_room_instead_of_refusing() {
        let group = ThreadGroup::new();
        let pool = WorkerPool::start(&group, "test", workers(1), 0).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
        started_rx.recv().unwrap();

        // The only worker is busy and nothing may wait for it, so this
        // submission has to block until the first task finishes.
        let (submitted_tx, submitted_rx) = mpsc::channel();
        let (ran_tx, ran_rx) = mpsc::channel();
        let submitter_pool = pool.clone();
        let submitter = thread::spawn(move || {
            submitter_pool.submit(move || ran_tx.send(()).unwrap()).unwrap();
            submitted_tx.send(()).unwrap();
        });
        assert!(submitted_rx
            .recv_timeout(Duration::from_millis(200))
            .is_err());

        drop(release_tx);
        submitted_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        submitter.join().unwrap();

        pool.close();
        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn close_wakes_blocked_submitters() {
        let group = ThreadGroup::new();
        let pool = WorkerPool::start(&group, "test", workers(1), 0).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        let submitter_pool = pool.clone();
        let submitter = thread::spawn(move || submitter_pool.submit(|| ()));
        thread::sleep(Duration::from_millis(50));
        pool.close();
        assert!(matches!(submitter.join().unwrap(), Err(Error::ShuttingDown)));

        drop(release_tx);
        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn panicking_tasks_do_not_kill_workers() {
        let group = ThreadGroup::new();
        let pool = WorkerPool::start(&group, "test", workers(1), 1).unwrap();
        pool.submit(|| panic!("task failure")).unwrap();
        let (ran_tx, ran_rx) = mpsc::channel();
        pool.submit(move || ran_tx.send(()).unwrap()).unwrap();
        ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.close();
        group.shut_down();
        group.await_shutdown();
    }
}
