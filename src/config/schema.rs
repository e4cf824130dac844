//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Options for a single listener.
///
/// Immutable once a listen attempt begins; `start` captures its own
/// copy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerOptions {
    /// Address to bind (IP literal or resolvable hostname).
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// SO_SNDBUF for the acceptor; 0 leaves the OS default.
    pub send_buffer_size: u32,

    /// SO_RCVBUF for the acceptor; 0 leaves the OS default.
    pub recv_buffer_size: u32,

    /// Listen backlog.
    pub backlog: u32,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            send_buffer_size: 256 * 1024,
            recv_buffer_size: 256 * 1024,
            backlog: 128,
        }
    }
}
