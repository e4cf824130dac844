//! Networking core.
//!
//! # Data Flow
//! `Listener::start` binds and listens, then arms the accept loop on
//! the listen worker. Each accepted peer is assigned a worker, the
//! connection is constructed there, receives `Connected`, and begins
//! reading; destruction is serialized back onto the listen worker.

pub mod listener;

pub use listener::{Destroyer, Listener, ListenerError};
