use crate::{get_free_port, local, start_uppercase_server};
use portrelay::{Agent, AgentClient, AgentConfig, Protocol, RelayError, Rule, RuleControl};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const KEY: &str = "integration-key";

async fn start_agent() -> (AgentClient, CancellationToken, tokio::task::JoinHandle<()>) {
    let config = AgentConfig {
        node_key: KEY.to_string(),
        node_name: "edge-test".to_string(),
        ..AgentConfig::default()
    };
    let agent = Agent::new(config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        agent.serve(listener, token).await.unwrap();
    });

    let client = AgentClient::new(&format!("http://{addr}"), KEY, Duration::from_secs(5)).unwrap();
    (client, shutdown, handle)
}

#[tokio::test]
async fn test_remote_rule_relays_traffic() {
    let (target, _server) = start_uppercase_server().await;
    let (client, shutdown, handle) = start_agent().await;
    let port = get_free_port();

    client
        .create(
            Rule::new("remote", port, "127.0.0.1", target.port(), Protocol::Tcp),
            true,
        )
        .await
        .unwrap();

    let mut stream = TcpStream::connect(local(port)).await.unwrap();
    stream.write_all(b"agent").await.unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"AGENT");
    drop(stream);

    let node = client.node_status().await.unwrap();
    assert_eq!(node.node_name, "edge-test");
    assert_eq!(node.tunnel_count, 1);
    assert!(node.tunnels[0].running);
    assert!(node.tunnels[0].traffic.total_out >= 5);

    client.stop("remote").await.unwrap();
    assert!(!client.status().await.unwrap()[0].running);
    client.delete("remote").await.unwrap();
    assert!(client.status().await.unwrap().is_empty());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_remote_errors_map_to_relay_errors() {
    let (client, shutdown, _handle) = start_agent().await;

    let err = client.start("missing").await.unwrap_err();
    assert!(matches!(err, RelayError::RuleNotFound(_)));

    let rule = Rule::new("dup", get_free_port(), "127.0.0.1", 9, Protocol::Udp);
    client.create(rule.clone(), false).await.unwrap();
    let err = client.create(rule, false).await.unwrap_err();
    assert!(matches!(err, RelayError::Remote(_)));

    shutdown.cancel();
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let (client, shutdown, _handle) = start_agent().await;
    let intruder = AgentClient::new(client.base_url(), "wrong", Duration::from_secs(5)).unwrap();

    let err = intruder.status().await.unwrap_err();
    assert!(matches!(err, RelayError::Remote(message) if message == "Invalid node key"));

    shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_stops_every_engine() {
    let (client, shutdown, handle) = start_agent().await;
    let port = get_free_port();
    client
        .create(Rule::new("bye", port, "127.0.0.1", 9, Protocol::Tcp), true)
        .await
        .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());
}

#[tokio::test]
async fn test_stopped_port_reused_by_new_remote_rule() {
    let (client, shutdown, handle) = start_agent().await;
    let port = get_free_port();

    client
        .create(Rule::new("a", port, "127.0.0.1", 9, Protocol::Tcp), true)
        .await
        .unwrap();
    client.stop("a").await.unwrap();
    client
        .create(Rule::new("b", port, "127.0.0.1", 9, Protocol::Tcp), true)
        .await
        .unwrap();

    let running: Vec<_> = client
        .status()
        .await
        .unwrap()
        .into_iter()
        .filter(|status| status.running)
        .map(|status| status.rule.id)
        .collect();
    assert_eq!(running, vec!["b"]);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
