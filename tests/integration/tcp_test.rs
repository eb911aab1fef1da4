use crate::{get_free_port, local, start_uppercase_server, wait_for_server};
use portrelay::{Engine, Protocol, Rule};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_tcp_round_trip_uppercases_and_counts() {
    let (target, _server) = start_uppercase_server().await;
    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "tcp-echo",
        port,
        target.ip().to_string(),
        target.port(),
        Protocol::Tcp,
    ));
    engine.start().await.unwrap();
    assert!(wait_for_server(local(port), Duration::from_secs(2)).await);

    let mut client = TcpStream::connect(local(port)).await.unwrap();
    client.write_all(b"abc").await.unwrap();

    let mut buf = [0u8; 3];
    tokio::time::timeout(Duration::from_secs(3), client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ABC");

    drop(client);
    let drained = crate::eventually(Duration::from_secs(3), || {
        engine.counters().connections() == 0
    })
    .await;
    assert!(drained);

    let status = engine.get_status();
    assert!(status.traffic.total_out >= 3, "client -> target bytes");
    assert!(status.traffic.total_in >= 3, "target -> client bytes");
    assert!(status.running);

    engine.stop();
}

#[tokio::test]
async fn test_tcp_connection_count_tracks_open_clients() {
    let (target, _server) = start_uppercase_server().await;
    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "tcp-count",
        port,
        "127.0.0.1",
        target.port(),
        Protocol::Tcp,
    ));
    engine.start().await.unwrap();

    let mut first = TcpStream::connect(local(port)).await.unwrap();
    let mut second = TcpStream::connect(local(port)).await.unwrap();
    let mut buf = [0u8; 2];
    for client in [&mut first, &mut second] {
        client.write_all(b"hi").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
    }
    assert_eq!(engine.get_status().traffic.connections, 2);

    drop(first);
    assert!(
        crate::eventually(Duration::from_secs(3), || engine.counters().connections() == 1).await
    );
    drop(second);
    assert!(
        crate::eventually(Duration::from_secs(3), || engine.counters().connections() == 0).await
    );

    engine.stop();
}

#[tokio::test]
async fn test_unreachable_target_drops_connection_only() {
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);

    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "tcp-dead",
        port,
        "127.0.0.1",
        dead_port,
        Protocol::Tcp,
    ));
    engine.start().await.unwrap();

    let mut client = TcpStream::connect(local(port)).await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(3), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0, "client connection is closed");

    assert!(engine.is_running());
    assert!(
        crate::eventually(Duration::from_secs(3), || engine.counters().connections() == 0).await
    );
    let status = engine.get_status();
    assert_eq!(status.traffic.total_in, 0);
    assert_eq!(status.traffic.total_out, 0);

    engine.stop();
}
