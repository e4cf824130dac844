//! Round-robin worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::worker::Worker;

/// Ordered collection of workers for round-robin dispatch.
///
/// Append-only at runtime. An internal counter rotates through the
/// workers; unbounded growth is fine since selection is by modulo.
#[derive(Default)]
pub struct WorkerPool {
    workers: RwLock<Vec<Worker>>,
    counter: AtomicUsize,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker. Existing rotation order is preserved.
    pub fn add(&self, worker: Worker) {
        self.workers
            .write()
            .expect("worker pool poisoned")
            .push(worker);
    }

    /// Select the next worker in rotation, or `None` if the pool is empty.
    pub fn select(&self) -> Option<Worker> {
        let workers = self.workers.read().expect("worker pool poisoned");
        if workers.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(workers[index % workers.len()].clone())
    }

    pub fn len(&self) -> usize {
        self.workers.read().expect("worker pool poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
