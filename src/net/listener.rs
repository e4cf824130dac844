//! Listener core: accept loop, worker dispatch, connection lifecycle.
//!
//! # Responsibilities
//! - Bind and listen on the configured endpoint
//! - Run the continuously re-armed accept loop on the listen worker
//! - Assign each accepted connection to a worker (round-robin over the
//!   pool, falling back to the listen worker)
//! - Mediate connection construction on the chosen worker and
//!   destruction on the listen worker
//!
//! The accept loop re-arms immediately after every successful accept;
//! connection construction is dispatched onto the chosen worker, so
//! acceptance throughput is decoupled from per-connection setup cost.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

use crate::config::ListenerOptions;
use crate::conn::socket::{ConnSock, SecurityContext};
use crate::conn::{ConnPtr, Connection, ConnectionFactory, NetEvent};
use crate::worker::{Worker, WorkerPool};

/// Error type for listener operations.
///
/// All variants are fatal for the `start` attempt that produced them;
/// the listener stays not-running and may be started again with
/// corrected options.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host and port do not resolve to a local bind target.
    #[error("invalid endpoint {host}:{port}")]
    InvalidEndpoint { host: String, port: u16 },
    /// Failed to open or bind the acceptor socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// Bound, but the listen call failed.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// The listen worker cannot accept work.
    #[error("listen worker is unavailable")]
    NoWorker,
}

/// Connection-acceptance and dispatch core.
///
/// Owns the acceptor, the worker pool, and the optional factory.
/// Parameterized over the application connection type, so the same
/// machinery hosts arbitrary upper-layer protocols.
///
/// Cheap to clone; clones share the same listener.
pub struct Listener<C: Connection> {
    shared: Arc<Shared<C>>,
}

impl<C: Connection> Clone for Listener<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Connection> {
    listen_worker: Worker,
    pool: WorkerPool,
    factory: Option<Arc<dyn ConnectionFactory<C>>>,
    args: C::Args,
    state: Mutex<State>,
    /// Liveness of the accept loop. Cleared when the loop exits, on
    /// stop or on a terminal accept error.
    accepting: AtomicBool,
}

struct State {
    running: bool,
    options: ListenerOptions,
    security: Option<SecurityContext>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<watch::Sender<bool>>,
    /// Acknowledged once the accept loop has dropped the acceptor.
    closed: Option<std::sync::mpsc::Receiver<()>>,
}

/// Capability handed to every connection that requests its destruction
/// on the listener's own worker.
///
/// Holds a weak reference back to the listener, so a connection never
/// keeps a half-torn-down listener alive; once the listener is gone,
/// destroy is a no-op.
pub struct Destroyer<C: Connection> {
    shared: Weak<Shared<C>>,
}

impl<C: Connection> Clone for Destroyer<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<C: Connection> std::fmt::Debug for Destroyer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Destroyer(..)")
    }
}

impl<C: Connection> Destroyer<C> {
    /// Request destruction of `conn`. Safe to call from any thread; the
    /// factory's destroy path always runs queued on the listen worker.
    pub fn destroy(&self, conn: ConnPtr<C>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.destroy(conn);
        }
    }
}

impl<C: Connection> Listener<C> {
    /// Create a listener with an optional factory, a dedicated listen
    /// worker, and arguments forwarded to every connection construction.
    ///
    /// The listen worker is started here if it was not already.
    pub fn new(
        factory: Option<Arc<dyn ConnectionFactory<C>>>,
        listen_worker: Worker,
        args: C::Args,
    ) -> Self {
        listen_worker.start();
        Self {
            shared: Arc::new(Shared {
                listen_worker,
                pool: WorkerPool::new(),
                factory,
                args,
                state: Mutex::new(State {
                    running: false,
                    options: ListenerOptions::default(),
                    security: None,
                    local_addr: None,
                    shutdown: None,
                    closed: None,
                }),
                accepting: AtomicBool::new(false),
            }),
        }
    }

    /// Create a listener without a factory, on a fresh listen worker.
    pub fn with_defaults(args: C::Args) -> Self {
        Self::new(None, Worker::new(), args)
    }

    /// Append a worker to the dispatch pool. May be called before or
    /// during operation; the worker is started if it was not already.
    pub fn add_worker(&self, worker: Worker) {
        worker.start();
        self.shared.pool.add(worker);
    }

    /// Bind, listen, and arm the first accept.
    ///
    /// Idempotent: returns `Ok(())` without rebinding when already
    /// running. On failure the listener stays not-running; there is no
    /// automatic retry.
    pub fn start(
        &self,
        options: ListenerOptions,
        security: Option<SecurityContext>,
    ) -> Result<(), ListenerError> {
        let mut state = self.shared.state.lock().expect("listener state poisoned");
        if state.running {
            return Ok(());
        }

        let addr = resolve_endpoint(&options.host, options.port)?;

        // Open the acceptor on the listen worker: the accept loop and
        // everything it owns stays on that thread.
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let opts = options.clone();
        let sec = security.clone();
        let submitted = self.shared.listen_worker.dispatch(move || {
            let _ = done_tx.send(shared.open_acceptor(addr, opts, sec));
        });
        if !submitted {
            return Err(ListenerError::NoWorker);
        }

        let (local_addr, shutdown, closed) =
            done_rx.recv().unwrap_or(Err(ListenerError::NoWorker))?;

        state.running = true;
        state.options = options;
        state.security = security;
        state.local_addr = Some(local_addr);
        state.shutdown = Some(shutdown);
        state.closed = Some(closed);
        Ok(())
    }

    /// Convenience overload: start on `host:port`, keeping the other
    /// options at their current values.
    pub fn start_on(
        &self,
        port: u16,
        host: &str,
        security: Option<SecurityContext>,
    ) -> Result<(), ListenerError> {
        let mut options = {
            self.shared
                .state
                .lock()
                .expect("listener state poisoned")
                .options
                .clone()
        };
        options.host = host.to_string();
        options.port = port;
        self.start(options, security)
    }

    /// Stop accepting and close the acceptor.
    ///
    /// Synchronous: by the time this returns the acceptor has been
    /// dropped, so new connection attempts are refused and the port can
    /// be rebound immediately. Already-accepted connections are not
    /// touched; each manages its own shutdown.
    ///
    /// When called from the listen worker itself, only signals the
    /// accept loop; the loop cannot wind down until the current job
    /// returns, so waiting there would deadlock.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().expect("listener state poisoned");
        if !state.running {
            return;
        }
        state.running = false;
        state.local_addr = None;
        let closed = state.closed.take();
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if !self.shared.listen_worker.is_current() {
            if let Some(closed) = closed {
                // Err means the loop was dropped without acking, which
                // also implies the acceptor is gone.
                let _ = closed.recv();
            }
        }
        tracing::debug!("Listener stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .expect("listener state poisoned")
            .running
    }

    /// Whether the accept loop is live. Distinguishes a running
    /// listener from one whose loop died on a terminal accept error.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Address the acceptor is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .state
            .lock()
            .expect("listener state poisoned")
            .local_addr
    }

    /// The listener's own worker, used for acceptance and destruction.
    pub fn listen_worker(&self) -> &Worker {
        &self.shared.listen_worker
    }
}

impl<C: Connection> Shared<C> {
    /// Runs on the listen worker. Opens, configures, binds, and listens,
    /// then arms the accept loop.
    fn open_acceptor(
        self: &Arc<Self>,
        addr: SocketAddr,
        options: ListenerOptions,
        security: Option<SecurityContext>,
    ) -> Result<
        (
            SocketAddr,
            watch::Sender<bool>,
            std::sync::mpsc::Receiver<()>,
        ),
        ListenerError,
    > {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|source| ListenerError::Bind { addr, source })?;

        socket
            .set_reuseaddr(true)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        // 0 leaves the OS default in place
        if options.send_buffer_size > 0 {
            socket
                .set_send_buffer_size(options.send_buffer_size)
                .map_err(|source| ListenerError::Bind { addr, source })?;
        }
        if options.recv_buffer_size > 0 {
            socket
                .set_recv_buffer_size(options.recv_buffer_size)
                .map_err(|source| ListenerError::Bind { addr, source })?;
        }

        if let Err(source) = socket.bind(addr) {
            tracing::error!(address = %addr, error = %source, "Bind failed");
            return Err(ListenerError::Bind { addr, source });
        }

        let acceptor = match socket.listen(options.backlog) {
            Ok(acceptor) => acceptor,
            Err(source) => {
                tracing::error!(address = %addr, error = %source, "Listen failed");
                return Err(ListenerError::Listen { addr, source });
            }
        };
        let local_addr = acceptor
            .local_addr()
            .map_err(|source| ListenerError::Listen { addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = std::sync::mpsc::channel();
        self.accepting.store(true, Ordering::SeqCst);
        tokio::task::spawn_local(accept_loop(
            Arc::clone(self),
            acceptor,
            shutdown_rx,
            security,
            closed_tx,
        ));

        tracing::info!(
            address = %local_addr,
            backlog = options.backlog,
            pool_size = self.pool.len(),
            "Listener bound"
        );
        Ok((local_addr, shutdown_tx, closed_rx))
    }

    /// Dispatch policy: round-robin over the pool, fall back to the
    /// listen worker when the pool is empty.
    fn select_worker(&self) -> Option<Worker> {
        if let Some(worker) = self.pool.select() {
            return Some(worker);
        }
        if self.listen_worker.is_alive() {
            Some(self.listen_worker.clone())
        } else {
            None
        }
    }

    /// Construct and initialize the connection on its worker.
    ///
    /// Runs the constructor, delivers `Connected`, then starts the read
    /// loop, in that order, all on the chosen worker's thread.
    fn init_conn(self: &Arc<Self>, worker: Worker, sock: ConnSock) {
        let shared = Arc::clone(self);
        let worker_id = worker.id();
        let delivered = worker.dispatch(move || {
            let conn = shared.create_connection(sock);
            conn.lock()
                .expect("connection poisoned")
                .handle_event(NetEvent::Connected);
            C::do_read(&conn);
        });
        if !delivered {
            tracing::error!(worker = %worker_id, "Dropped accepted connection, worker is gone");
        }
    }

    fn create_connection(self: &Arc<Self>, sock: ConnSock) -> ConnPtr<C> {
        let mut conn = match &self.factory {
            Some(factory) => {
                tracing::debug!("Creating connection via factory");
                factory.create(self.args.clone())
            }
            None => {
                tracing::debug!("Creating connection via default path");
                C::build(self.args.clone())
            }
        };
        conn.init(
            sock,
            Destroyer {
                shared: Arc::downgrade(self),
            },
        );
        Arc::new(Mutex::new(conn))
    }

    /// Queue the factory destroy path onto the listen worker.
    ///
    /// Always posted, never inlined: destruction must not reenter the
    /// caller's stack, and serializing on the listen worker gives a
    /// total order over all destroys.
    fn destroy(&self, conn: ConnPtr<C>) {
        let factory = self.factory.clone();
        self.listen_worker.post(move || {
            if let Some(factory) = factory {
                factory.destroy(conn);
            }
        });
    }
}

/// The recurring accept loop. Lives on the listen worker.
async fn accept_loop<C: Connection>(
    shared: Arc<Shared<C>>,
    acceptor: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    security: Option<SecurityContext>,
    closed_tx: std::sync::mpsc::Sender<()>,
) {
    loop {
        // Worker is chosen before the accept so the socket is born
        // already bound to its execution context.
        let Some(worker) = shared.select_worker() else {
            tracing::error!("No live worker available, accept loop halted");
            break;
        };
        let mut sock = ConnSock::new(worker.clone(), security.clone());

        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("Closing acceptor");
                break;
            }
            accepted = acceptor.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer_addr = %peer, worker = %worker.id(), "Connection accepted");
                    sock.attach(stream, peer);
                    shared.init_conn(worker, sock);
                    // loop re-arms immediately; construction is in
                    // flight on the chosen worker
                }
                Err(e) => {
                    // Terminal for this listener instance: a persistent
                    // accept error must not spin. is_accepting() goes
                    // false so the death is observable.
                    tracing::error!(error = %e, "Accept failed, no longer accepting");
                    break;
                }
            }
        }
    }

    // The acceptor must be gone before stop() is released: that is what
    // makes a post-stop connect attempt refusable and the port
    // immediately rebindable.
    drop(acceptor);
    shared.accepting.store(false, Ordering::SeqCst);
    let _ = closed_tx.send(());
}

fn resolve_endpoint(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ListenerError::InvalidEndpoint {
            host: host.to_string(),
            port,
        })
}
