//! Listener start/stop semantics.

mod common;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use common::{expect_construction, ProbeConn};
use conncore::{Listener, ListenerError, ListenerOptions};

#[tokio::test]
async fn start_accepts_within_bounded_time() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Listener::<ProbeConn>::with_defaults(tx);

    let options = ListenerOptions {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ListenerOptions::default()
    };
    listener.start(options, None).unwrap();
    assert!(listener.is_running());
    assert!(listener.is_accepting());

    let _stream = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    expect_construction(&mut rx).await;

    listener.stop();
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let listener = Listener::<ProbeConn>::with_defaults(tx);

    listener.start_on(0, "127.0.0.1", None).unwrap();
    let first_addr = listener.local_addr().unwrap();

    // Second start is a no-op success: no rebinding, same acceptor.
    listener.start_on(0, "127.0.0.1", None).unwrap();
    assert_eq!(listener.local_addr().unwrap(), first_addr);

    assert!(TcpStream::connect(first_addr).await.is_ok());

    listener.stop();
}

#[tokio::test]
async fn start_fails_when_port_already_bound() {
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let first = Listener::<ProbeConn>::with_defaults(tx1);
    first.start_on(0, "127.0.0.1", None).unwrap();
    let taken = first.local_addr().unwrap().port();

    let (tx2, _rx2) = mpsc::unbounded_channel();
    let second = Listener::<ProbeConn>::with_defaults(tx2);
    let err = second.start_on(taken, "127.0.0.1", None).unwrap_err();

    assert!(matches!(err, ListenerError::Bind { .. }));
    assert!(!second.is_running());
    assert!(!second.is_accepting());

    first.stop();
}

#[tokio::test]
async fn start_rejects_unresolvable_host() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let listener = Listener::<ProbeConn>::with_defaults(tx);

    let err = listener
        .start_on(1, "definitely.not.a.real.host.invalid", None)
        .unwrap_err();
    assert!(matches!(err, ListenerError::InvalidEndpoint { .. }));
    assert!(!listener.is_running());
}

#[tokio::test]
async fn stop_refuses_subsequent_connections() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Listener::<ProbeConn>::with_defaults(tx);

    listener.start_on(0, "127.0.0.1", None).unwrap();
    let addr = listener.local_addr().unwrap();

    let _stream = TcpStream::connect(addr).await.unwrap();
    expect_construction(&mut rx).await;

    // stop() is synchronous: the acceptor is gone when it returns, so
    // the very next connect attempt must already be refused.
    listener.stop();
    assert!(!listener.is_running());
    assert!(!listener.is_accepting());
    assert!(
        TcpStream::connect(addr).await.is_err(),
        "connect right after stop must be refused"
    );
}

#[tokio::test]
async fn restart_after_stop_accepts_again_on_same_port() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Listener::<ProbeConn>::with_defaults(tx);

    listener.start_on(0, "127.0.0.1", None).unwrap();
    let port = listener.local_addr().unwrap().port();
    listener.stop();

    // No grace period: the old acceptor was closed before stop()
    // returned, so rebinding the same fixed port succeeds immediately.
    listener.start_on(port, "127.0.0.1", None).unwrap();
    let addr = listener.local_addr().unwrap();
    assert_eq!(addr.port(), port);

    let _stream = TcpStream::connect(addr).await.unwrap();
    expect_construction(&mut rx).await;

    listener.stop();
}
