//! Per-connection transport object.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::worker::Worker;

/// Opaque security handle threaded from the listener down to each
/// accepted socket (for example a TLS acceptor context).
///
/// The core never interprets it; consumers downcast back to the
/// concrete type they installed.
#[derive(Clone)]
pub struct SecurityContext(Arc<dyn Any + Send + Sync>);

impl SecurityContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Recover the concrete context, if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecurityContext(..)")
    }
}

/// Transport handed to a connection at initialization.
///
/// Built before the accept completes, bound to the worker the
/// connection will live on; the stream and peer address are attached
/// once the accept succeeds.
pub struct ConnSock {
    worker: Worker,
    security: Option<SecurityContext>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl ConnSock {
    pub(crate) fn new(worker: Worker, security: Option<SecurityContext>) -> Self {
        Self {
            worker,
            security,
            stream: None,
            peer: None,
        }
    }

    pub(crate) fn attach(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.stream = Some(stream);
        self.peer = Some(peer);
    }

    /// The worker this connection is bound to.
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn security(&self) -> Option<&SecurityContext> {
        self.security.as_ref()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Take ownership of the accepted stream to drive the read loop.
    /// Subsequent calls return `None`.
    pub fn take_stream(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }
}

impl std::fmt::Debug for ConnSock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnSock")
            .field("worker", &self.worker.id())
            .field("peer", &self.peer)
            .field("has_stream", &self.stream.is_some())
            .finish()
    }
}
