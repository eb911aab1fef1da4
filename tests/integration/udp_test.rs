use crate::{
    get_free_port, local, start_udp_echo_server, start_udp_tagging_server, udp_round_trip,
};
use portrelay::{Engine, EngineConfig, Protocol, Rule};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

#[tokio::test]
async fn test_udp_clients_are_isolated() {
    let (target, _server) = start_udp_tagging_server().await;
    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "udp-iso",
        port,
        "127.0.0.1",
        target.port(),
        Protocol::Udp,
    ));
    engine.start().await.unwrap();

    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bob = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let (a, b) = tokio::join!(
        udp_round_trip(&alice, local(port), b"from-alice"),
        udp_round_trip(&bob, local(port), b"from-bob"),
    );
    let a = String::from_utf8(a).unwrap();
    let b = String::from_utf8(b).unwrap();

    assert!(a.ends_with(":from-alice"), "alice got {a}");
    assert!(b.ends_with(":from-bob"), "bob got {b}");
    // Each client reached the target through its own outbound socket.
    assert_ne!(a.split(':').next(), b.split(':').next());
    assert_eq!(engine.session_count(), 2);

    engine.stop();
}

#[tokio::test]
async fn test_udp_direction_counters() {
    let (target, _server) = start_udp_tagging_server().await;
    let port = get_free_port();
    let engine = Engine::new(Rule::new(
        "udp-dir",
        port,
        "127.0.0.1",
        target.port(),
        Protocol::Udp,
    ));
    engine.start().await.unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let reply = udp_round_trip(&client, local(port), b"1234").await;

    let status = engine.get_status();
    assert_eq!(status.traffic.total_out, 4, "client -> target");
    assert_eq!(status.traffic.total_in, reply.len() as u64, "target -> client");
    assert!(status.traffic.total_in > status.traffic.total_out);
    assert_eq!(status.traffic.connections, 0);

    engine.stop();
}

#[tokio::test]
async fn test_udp_idle_session_is_evicted_then_recreated() {
    let (target, _server) = start_udp_echo_server().await;
    let port = get_free_port();
    let config = EngineConfig {
        udp_idle_timeout: Duration::from_millis(300),
        udp_recv_poll: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(
        Rule::new("udp-idle", port, "127.0.0.1", target.port(), Protocol::Udp),
        Arc::new(config),
    );
    engine.start().await.unwrap();
    let baseline = engine.session_count();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp_round_trip(&client, local(port), b"first").await;
    assert_eq!(engine.session_count(), baseline + 1);

    let evicted = crate::eventually(Duration::from_secs(3), || {
        engine.session_count() == baseline
    })
    .await;
    assert!(evicted, "idle session removed");

    assert_eq!(udp_round_trip(&client, local(port), b"again").await, b"again");
    assert_eq!(engine.session_count(), baseline + 1);

    engine.stop();
}
