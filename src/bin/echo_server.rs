//! Sample echo server built on the conncore listener.
//!
//! Run with `cargo run --bin echo_server -- --port 9999 --workers 2`,
//! then `nc 127.0.0.1 9999` and type.

use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use conncore::{ConnPtr, ConnSock, Connection, Destroyer, Listener, NetEvent, Worker};

#[derive(Parser, Debug)]
#[command(about = "Echo server sample")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Number of pool workers (0 serializes onto the listen worker).
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

struct EchoConn {
    sock: Option<ConnSock>,
    destroyer: Option<Destroyer<Self>>,
}

impl Connection for EchoConn {
    type Args = ();

    fn build(_args: ()) -> Self {
        Self {
            sock: None,
            destroyer: None,
        }
    }

    fn init(&mut self, sock: ConnSock, destroyer: Destroyer<Self>) {
        self.sock = Some(sock);
        self.destroyer = Some(destroyer);
    }

    fn handle_event(&mut self, event: NetEvent) {
        let peer = self.sock.as_ref().and_then(|s| s.peer_addr());
        tracing::info!(event = %event, peer = ?peer, "Connection event");
    }

    fn do_read(conn: &ConnPtr<Self>) {
        let (stream, destroyer) = {
            let mut guard = conn.lock().expect("echo connection poisoned");
            let stream = guard.sock.as_mut().and_then(|s| s.take_stream());
            (stream, guard.destroyer.clone())
        };
        let Some(mut stream) = stream else {
            return;
        };

        let conn = conn.clone();
        tokio::task::spawn_local(async move {
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }

            conn.lock()
                .expect("echo connection poisoned")
                .handle_event(NetEvent::Disconnected);
            if let Some(destroyer) = destroyer {
                destroyer.destroy(conn.clone());
            }
        });
    }
}

fn main() {
    conncore::observability::logging::init();

    let args = Args::parse();

    let listener = Listener::<EchoConn>::with_defaults(());
    for _ in 0..args.workers {
        listener.add_worker(Worker::new());
    }

    if let Err(e) = listener.start_on(args.port, &args.host, None) {
        tracing::error!(error = %e, "Failed to start echo server");
        std::process::exit(1);
    }

    tracing::info!(
        address = ?listener.local_addr(),
        workers = args.workers,
        "Echo server running"
    );

    loop {
        std::thread::sleep(Duration::from_secs(1));
        if !listener.is_accepting() {
            tracing::error!("Accept loop is no longer live, exiting");
            std::process::exit(1);
        }
    }
}
