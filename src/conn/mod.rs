//! Connection contract consumed by the listener core.
//!
//! # Responsibilities
//! - Define the capability interface an application connection type
//!   must expose (construction, initialization, lifecycle events,
//!   starting its read loop)
//! - Define the shared-ownership handle connections travel under
//!
//! The core is protocol-agnostic: it constructs connections, delivers
//! the `Connected` event, and starts the read loop, but never touches
//! the bytes on the wire.

pub mod factory;
pub mod socket;

use std::sync::{Arc, Mutex};

use crate::net::listener::Destroyer;

pub use factory::ConnectionFactory;
pub use socket::{ConnSock, SecurityContext};

/// Shared-ownership handle for a connection.
///
/// Connections are created on their owning worker thread but the handle
/// crosses threads (the destroy path runs on the listen worker), so the
/// interior is mutex-guarded. Lifetime follows the longest holder.
pub type ConnPtr<C> = Arc<Mutex<C>>;

/// Lifecycle events delivered to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// Peer accepted; delivered before the first read begins.
    Connected,
    /// Transport closed by either side.
    Disconnected,
    /// Outbound connect attempt failed.
    ConnectFailed,
    /// A read or write deadline elapsed.
    Timeout,
}

impl std::fmt::Display for NetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NetEvent::Connected => "connected",
            NetEvent::Disconnected => "disconnected",
            NetEvent::ConnectFailed => "connect-failed",
            NetEvent::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// An application-defined object representing one accepted peer.
///
/// All methods except [`build`](Connection::build) run on the worker
/// thread the connection was dispatched to, inside that worker's task
/// context: [`do_read`](Connection::do_read) may call
/// `tokio::task::spawn_local` to leave its read loop running there.
pub trait Connection: Send + Sized + 'static {
    /// Extra arguments forwarded verbatim to every construction, on
    /// both the factory and the default path.
    type Args: Clone + Send + Sync + 'static;

    /// Default construction path, used when no factory is installed.
    fn build(args: Self::Args) -> Self;

    /// Install the transport and the destroyer capability.
    ///
    /// The `ConnSock` carries the accepted stream, the owning worker's
    /// handle, and the listener's security context. The destroyer is a
    /// non-owning callback: invoking it requests destruction on the
    /// listener's own worker.
    fn init(&mut self, sock: ConnSock, destroyer: Destroyer<Self>);

    /// Handle a lifecycle event. `Connected` always arrives before the
    /// first read is issued.
    fn handle_event(&mut self, event: NetEvent);

    /// Begin the read loop. Called once, on the owning worker, after
    /// `Connected` has been delivered.
    fn do_read(conn: &ConnPtr<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_event_display() {
        assert_eq!(NetEvent::Connected.to_string(), "connected");
        assert_eq!(NetEvent::Disconnected.to_string(), "disconnected");
    }
}
