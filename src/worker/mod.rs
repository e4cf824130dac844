//! Worker execution contexts.
//!
//! # Responsibilities
//! - Own one OS thread driving a single-threaded task queue
//! - Run posted callbacks in FIFO order, never concurrently
//! - Expose a stable identity for dispatch and logging
//!
//! A [`Worker`] is the unit the listener distributes connections over.
//! Jobs run inside a current-thread tokio runtime wrapped in a
//! [`tokio::task::LocalSet`], so a posted job may call
//! `tokio::task::spawn_local` to leave a long-lived task (such as a
//! connection read loop) behind on the same thread.

pub mod pool;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;

pub use pool::WorkerPool;

/// A unit of work submitted to a worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Stop,
}

/// Global atomic counter for worker IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static WORKER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(WORKER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// An owned execution context: one thread plus a task queue.
///
/// Cheap to clone; all clones share the same thread and queue.
/// Lifetime follows the longest-held clone.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

struct Inner {
    id: WorkerId,
    tx: mpsc::UnboundedSender<Command>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    thread_id: OnceLock<ThreadId>,
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Worker {
    /// Create a worker. The thread is not spawned until [`start`](Self::start).
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                id: WorkerId::next(),
                tx,
                rx: Mutex::new(Some(rx)),
                thread_id: OnceLock::new(),
                handle: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the worker thread and begin executing posted jobs.
    ///
    /// Idempotent: subsequent calls are no-ops. Returns once the thread
    /// has published its identity, so [`thread_id`](Self::thread_id) is
    /// reliable after `start` returns.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let rx = self
            .inner
            .rx
            .lock()
            .expect("worker receiver slot poisoned")
            .take();
        let Some(mut rx) = rx else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(inner.id.to_string())
            .spawn(move || {
                let _ = inner.thread_id.set(thread::current().id());
                let _ = ready_tx.send(());

                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(worker = %inner.id, error = %e, "Failed to build worker runtime");
                        return;
                    }
                };

                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, async move {
                    while let Some(cmd) = rx.recv().await {
                        match cmd {
                            Command::Run(job) => job(),
                            Command::Stop => break,
                        }
                    }
                });

                tracing::debug!(worker = %inner.id, "Worker thread exiting");
            });

        match spawned {
            Ok(handle) => {
                // Wait for the thread to publish its identity.
                let _ = ready_rx.recv();
                *self.inner.handle.lock().expect("worker handle slot poisoned") = Some(handle);
            }
            Err(e) => {
                tracing::error!(worker = %self.inner.id, error = %e, "Failed to spawn worker thread");
                self.inner.started.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Enqueue a job. Always queued, never run inline.
    ///
    /// Returns `false` if the worker has already shut down.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let sent = self.inner.tx.send(Command::Run(Box::new(job))).is_ok();
        if !sent {
            tracing::warn!(worker = %self.inner.id, "Posted job to a stopped worker");
        }
        sent
    }

    /// Run a job inline when already on this worker's thread, else enqueue it.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.is_current() {
            job();
            true
        } else {
            self.post(job)
        }
    }

    /// Stable identity of this worker.
    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    /// The OS thread this worker runs on. `None` until started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.inner.thread_id.get().copied()
    }

    /// Whether the calling thread is this worker's thread.
    pub fn is_current(&self) -> bool {
        self.thread_id() == Some(thread::current().id())
    }

    /// Whether the worker can still receive jobs.
    pub fn is_alive(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst) && !self.inner.tx.is_closed()
    }

    /// Request shutdown. Jobs posted before this call still run; local
    /// tasks spawned by jobs are dropped when the queue winds down.
    pub fn stop(&self) {
        let _ = self.inner.tx.send(Command::Stop);
    }

    /// Wait for the worker thread to exit.
    pub fn join(&self) {
        let handle = self
            .inner
            .handle
            .lock()
            .expect("worker handle slot poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("thread_id", &self.thread_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn worker_id_unique() {
        let a = Worker::new();
        let b = Worker::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn post_runs_on_worker_thread() {
        let worker = Worker::new();
        worker.start();
        let expected = worker.thread_id().unwrap();

        let (tx, rx) = channel();
        assert!(worker.post(move || {
            tx.send(thread::current().id()).unwrap();
        }));

        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(ran_on, expected);

        worker.stop();
        worker.join();
    }

    #[test]
    fn post_preserves_fifo_order() {
        let worker = Worker::new();
        worker.start();

        let (tx, rx) = channel();
        for i in 0..8 {
            let tx = tx.clone();
            worker.post(move || {
                tx.send(i).unwrap();
            });
        }

        for i in 0..8 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), i);
        }

        worker.stop();
        worker.join();
    }

    #[test]
    fn dispatch_runs_inline_on_own_thread() {
        let worker = Worker::new();
        worker.start();

        let (tx, rx) = channel();
        let w = worker.clone();
        worker.post(move || {
            // Already on the worker thread, so this must not queue.
            let inline = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&inline);
            w.dispatch(move || flag.store(true, Ordering::SeqCst));
            tx.send(inline.load(Ordering::SeqCst)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());

        worker.stop();
        worker.join();
    }

    #[test]
    fn dispatch_queues_from_foreign_thread() {
        let worker = Worker::new();
        worker.start();
        let expected = worker.thread_id().unwrap();

        let (tx, rx) = channel();
        worker.dispatch(move || {
            tx.send(thread::current().id()).unwrap();
        });

        assert_ne!(thread::current().id(), expected);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), expected);

        worker.stop();
        worker.join();
    }

    #[test]
    fn jobs_posted_before_stop_still_run() {
        let worker = Worker::new();
        worker.start();

        let (tx, rx) = channel();
        worker.post(move || {
            tx.send(()).unwrap();
        });
        worker.stop();
        worker.join();

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(!worker.post(|| {}));
        assert!(!worker.is_alive());
    }

    #[test]
    fn start_is_idempotent() {
        let worker = Worker::new();
        worker.start();
        let first = worker.thread_id();
        worker.start();
        assert_eq!(worker.thread_id(), first);

        worker.stop();
        worker.join();
    }
}
