//! Connection factory strategy.

use crate::conn::{ConnPtr, Connection};

/// Strategy object that constructs and destroys connections in place of
/// the defaults.
///
/// A listener built without a factory uses [`Connection::build`] and a
/// no-op destroy path; both methods default accordingly, so a factory
/// only has to override what it customizes.
pub trait ConnectionFactory<C: Connection>: Send + Sync + 'static {
    /// Construct a connection. Runs on the worker the connection was
    /// dispatched to.
    fn create(&self, args: C::Args) -> C {
        C::build(args)
    }

    /// Tear down a connection. Always runs on the listener's own
    /// worker, serialized with its other queued work.
    fn destroy(&self, conn: ConnPtr<C>) {
        let _ = conn;
    }
}
