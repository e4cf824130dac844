//! Generic connection-acceptance and dispatch core.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                  LISTENER                     │
//!                 │                                               │
//!   peer connect  │  ┌──────────┐   round-robin   ┌────────────┐ │
//!   ──────────────┼─▶│  accept  │────────────────▶│   worker   │ │
//!                 │  │   loop   │    dispatch     │ (construct │ │
//!                 │  └────┬─────┘                 │ init, read)│ │
//!                 │       │ re-arm immediately    └─────┬──────┘ │
//!                 │       ▼                             │        │
//!                 │  next accept          destroyer ────┘        │
//!                 │                        (posts destruction    │
//!                 │                         to listen worker)    │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! A [`Listener`] binds a TCP endpoint and runs a continuously re-armed
//! accept loop on its own [`Worker`]. Each accepted peer is handed to a
//! worker chosen by round-robin over the [`WorkerPool`] (falling back
//! to the listen worker), where the application [`Connection`] type is
//! constructed (directly or via a [`ConnectionFactory`]), initialized,
//! given the `Connected` event, and started reading. Destruction always
//! runs queued on the listen worker, requested through the [`Destroyer`]
//! capability each connection holds.
//!
//! The core is protocol-agnostic: framing, TLS handshakes, and all wire
//! semantics belong to the `Connection` implementation.

// Core subsystems
pub mod config;
pub mod conn;
pub mod net;
pub mod worker;

// Cross-cutting concerns
pub mod observability;

pub use config::{ListenerOptions, ValidationError};
pub use conn::{ConnPtr, ConnSock, Connection, ConnectionFactory, NetEvent, SecurityContext};
pub use net::{Destroyer, Listener, ListenerError};
pub use worker::{Worker, WorkerId, WorkerPool};
