//! Registry of outstanding connection handler threads.
//!
//! Owned and mutated only by the acceptor. Each entry is a thread that has
//! not been joined yet; joining removes it, so no thread is joined twice.

use std::net::SocketAddr;
use std::thread::JoinHandle;
use tracing::{debug, error};

/// A spawned handler thread.
#[derive(Debug)]
pub struct HandlerTask<T> {
    pub conn_id: u64,
    pub peer: SocketAddr,
    handle: JoinHandle<T>,
}

impl<T> HandlerTask<T> {
    pub fn new(conn_id: u64, peer: SocketAddr, handle: JoinHandle<T>) -> Self {
        Self {
            conn_id,
            peer,
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Handler threads in spawn order.
#[derive(Debug)]
pub struct TaskRegistry<T> {
    tasks: Vec<HandlerTask<T>>,
    joined: usize,
}

impl<T: std::fmt::Debug> TaskRegistry<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            joined: 0,
        }
    }

    pub fn push(&mut self, task: HandlerTask<T>) {
        self.tasks.push(task);
    }

    /// Number of threads not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total number of threads joined over the registry's lifetime.
    pub fn joined(&self) -> usize {
        self.joined
    }

    /// Join every thread that has already finished, without waiting on the
    /// rest. Returns how many were joined.
    pub fn reap(&mut self) -> usize {
        if !self.tasks.iter().any(HandlerTask::is_finished) {
            return 0;
        }

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(HandlerTask::is_finished);
        self.tasks = running;

        let count = finished.len();
        for task in finished {
            self.join(task);
        }
        count
    }

    /// Block until every outstanding thread has finished and been joined.
    pub fn join_all(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.tasks);
        let count = tasks.len();
        for task in tasks {
            self.join(task);
        }
        count
    }

    fn join(&mut self, task: HandlerTask<T>) {
        let HandlerTask {
            conn_id,
            peer,
            handle,
        } = task;
        match handle.join() {
            Ok(exit) => debug!(conn_id, peer = %peer, ?exit, "Handler joined"),
            Err(_) => error!(conn_id, peer = %peer, "Handler panicked"),
        }
        self.joined += 1;
    }
}

impl<T: std::fmt::Debug> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
