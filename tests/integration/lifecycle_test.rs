use crate::{get_free_port, local, start_uppercase_server, wait_for_server};
use portrelay::{Engine, Protocol, Rule};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_stop_releases_tcp_port() {
    let port = get_free_port();
    let engine = Engine::new(Rule::new("tcp-release", port, "127.0.0.1", 9, Protocol::Tcp));

    engine.start().await.unwrap();
    engine.stop();

    let rebound = std::net::TcpListener::bind(("0.0.0.0", port));
    assert!(rebound.is_ok(), "port is free after stop");
}

#[tokio::test]
async fn test_stop_releases_udp_port() {
    let port = get_free_port();
    let engine = Engine::new(Rule::new("udp-release", port, "127.0.0.1", 9, Protocol::Udp));

    engine.start().await.unwrap();
    engine.stop();

    let rebound = std::net::UdpSocket::bind(("0.0.0.0", port));
    assert!(rebound.is_ok(), "port is free after stop");
}

#[tokio::test]
async fn test_other_engine_takes_over_stopped_port() {
    for protocol in [Protocol::Tcp, Protocol::Udp] {
        let port = get_free_port();
        let old = Engine::new(Rule::new("old", port, "127.0.0.1", 9, protocol));
        let new = Engine::new(Rule::new("new", port, "127.0.0.1", 9, protocol));

        old.start().await.unwrap();
        old.stop();
        new.start().await.unwrap();
        assert!(new.is_running());
        new.stop();
    }
}

#[tokio::test]
async fn test_stop_then_start_rebinds_immediately() {
    for protocol in [Protocol::Tcp, Protocol::Udp] {
        let port = get_free_port();
        let engine = Engine::new(Rule::new("rebind", port, "127.0.0.1", 9, protocol));

        engine.start().await.unwrap();
        engine.stop();
        assert!(!engine.is_running());

        tokio::time::timeout(Duration::from_secs(3), engine.start())
            .await
            .expect("restart did not finish")
            .expect("restart failed");
        assert!(engine.is_running());
        engine.stop();
    }
}

#[tokio::test]
async fn test_start_twice_binds_once() {
    let port = get_free_port();
    let engine = Engine::new(Rule::new("twice", port, "127.0.0.1", 9, Protocol::Tcp));

    engine.start().await.unwrap();
    engine.start().await.unwrap();
    assert!(engine.is_running());
    assert!(wait_for_server(local(port), Duration::from_secs(2)).await);

    engine.stop();
}

#[tokio::test]
async fn test_bind_error_leaves_engine_stopped() {
    let port = get_free_port();
    let first = Engine::new(Rule::new("owner", port, "127.0.0.1", 9, Protocol::Udp));
    let second = Engine::new(Rule::new("intruder", port, "127.0.0.1", 9, Protocol::Udp));

    first.start().await.unwrap();
    let err = second.start().await.unwrap_err();
    assert!(err.is_bind_error());
    assert!(!second.is_running());
    assert!(!second.rule().enabled);

    // The failed start left nothing behind; it can succeed once the port frees.
    first.stop_and_wait().await;
    second.start().await.unwrap();
    second.stop();
}

#[tokio::test]
async fn test_counters_survive_restart() {
    let (target, _server) = start_uppercase_server().await;
    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "monotonic",
        port,
        "127.0.0.1",
        target.port(),
        Protocol::Tcp,
    ));

    let mut last_out = 0;
    for _ in 0..2 {
        engine.start().await.unwrap();
        let mut client = TcpStream::connect(local(port)).await.unwrap();
        client.write_all(b"xyz").await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        drop(client);

        let out = engine.get_status().traffic.total_out;
        assert!(out >= last_out + 3);
        last_out = out;
        engine.stop();
    }
}

#[tokio::test]
async fn test_stop_is_safe_in_any_state() {
    let engine = Engine::new(Rule::new("safe", get_free_port(), "127.0.0.1", 9, Protocol::Tcp));
    engine.stop();
    engine.start().await.unwrap();
    engine.stop();
    engine.stop();
    engine.stop_and_wait().await;
    assert!(!engine.get_status().running);
}
