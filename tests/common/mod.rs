//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::thread::ThreadId;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use conncore::{ConnPtr, ConnSock, Connection, ConnectionFactory, Destroyer, NetEvent};

/// What a probe connection observed, tagged with the thread it ran on.
pub enum Probe {
    Init {
        thread: ThreadId,
    },
    Event {
        event: NetEvent,
        thread: ThreadId,
    },
    ReadStarted {
        thread: ThreadId,
    },
    /// Escape hatch handing the connection and its destroyer out to the
    /// test body.
    Handle {
        conn: ConnPtr<ProbeConn>,
        destroyer: Destroyer<ProbeConn>,
    },
    Destroyed {
        thread: ThreadId,
    },
}

/// Connection that reports every lifecycle step through a channel.
pub struct ProbeConn {
    tx: UnboundedSender<Probe>,
    sock: Option<ConnSock>,
    destroyer: Option<Destroyer<Self>>,
}

impl Connection for ProbeConn {
    type Args = UnboundedSender<Probe>;

    fn build(tx: Self::Args) -> Self {
        Self {
            tx,
            sock: None,
            destroyer: None,
        }
    }

    fn init(&mut self, sock: ConnSock, destroyer: Destroyer<Self>) {
        let _ = self.tx.send(Probe::Init {
            thread: std::thread::current().id(),
        });
        self.sock = Some(sock);
        self.destroyer = Some(destroyer);
    }

    fn handle_event(&mut self, event: NetEvent) {
        let _ = self.tx.send(Probe::Event {
            event,
            thread: std::thread::current().id(),
        });
    }

    fn do_read(conn: &ConnPtr<Self>) {
        let (tx, stream, destroyer) = {
            let mut guard = conn.lock().unwrap();
            let stream = guard.sock.as_mut().and_then(|s| s.take_stream());
            (guard.tx.clone(), stream, guard.destroyer.clone().unwrap())
        };

        let _ = tx.send(Probe::ReadStarted {
            thread: std::thread::current().id(),
        });
        let _ = tx.send(Probe::Handle {
            conn: conn.clone(),
            destroyer,
        });

        if let Some(mut stream) = stream {
            tokio::task::spawn_local(async move {
                let mut buf = [0u8; 1024];
                while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    }
}

/// Factory that reports which thread its destroy path ran on.
pub struct RecordingFactory {
    tx: UnboundedSender<Probe>,
}

impl RecordingFactory {
    pub fn new(tx: UnboundedSender<Probe>) -> Self {
        Self { tx }
    }
}

impl ConnectionFactory<ProbeConn> for RecordingFactory {
    fn destroy(&self, _conn: ConnPtr<ProbeConn>) {
        let _ = self.tx.send(Probe::Destroyed {
            thread: std::thread::current().id(),
        });
    }
}

/// Receive the next probe within a bounded time.
pub async fn next_probe(rx: &mut UnboundedReceiver<Probe>) -> Probe {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for probe")
        .expect("probe channel closed")
}

/// Consume the standard construction sequence of one connection and
/// return the thread it was built on plus its handle and destroyer.
///
/// Asserts the ordering invariant: init, then the connected event, then
/// the read start, all on the same worker thread.
pub async fn expect_construction(
    rx: &mut UnboundedReceiver<Probe>,
) -> (ThreadId, ConnPtr<ProbeConn>, Destroyer<ProbeConn>) {
    let thread = match next_probe(rx).await {
        Probe::Init { thread } => thread,
        _ => panic!("expected init probe first"),
    };
    match next_probe(rx).await {
        Probe::Event { event, thread: t } => {
            assert_eq!(event, NetEvent::Connected, "first event must be connected");
            assert_eq!(t, thread, "connected event must run on the init thread");
        }
        _ => panic!("expected connected event after init"),
    }
    match next_probe(rx).await {
        Probe::ReadStarted { thread: t } => {
            assert_eq!(t, thread, "read must start on the init thread");
        }
        _ => panic!("expected read start after connected event"),
    }
    match next_probe(rx).await {
        Probe::Handle { conn, destroyer } => (thread, conn, destroyer),
        _ => panic!("expected connection handle after read start"),
    }
}
