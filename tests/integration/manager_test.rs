use crate::{get_free_port, local, start_uppercase_server};
use portrelay::{Manager, Protocol, RelayError, Rule};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn enabled(mut rule: Rule) -> Rule {
    rule.enabled = true;
    rule
}

#[tokio::test]
async fn test_update_rule_retargets_running_engine() {
    let (first_target, _a) = start_uppercase_server().await;
    let port = get_free_port();
    let manager = Manager::default();

    manager
        .add_rule(enabled(Rule::new(
            "web",
            port,
            "127.0.0.1",
            first_target.port(),
            Protocol::Tcp,
        )))
        .await
        .unwrap();

    let new_port = get_free_port();
    let mut rule = manager.status("web").unwrap().rule;
    rule.local_port = new_port;
    manager.update_rule(rule).await.unwrap();

    let status = manager.status("web").unwrap();
    assert!(status.running);
    assert_eq!(status.rule.local_port, new_port);
    assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());

    let mut client = TcpStream::connect(local(new_port)).await.unwrap();
    client.write_all(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OK");

    manager.stop_all().await;
}

#[tokio::test]
async fn test_failed_start_keeps_rule_registered() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let manager = Manager::default();

    manager
        .add_rule(enabled(Rule::new("busy", port, "127.0.0.1", 9, Protocol::Tcp)))
        .await
        .unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.active_count(), 0);

    let err = manager.start_rule("busy").await.unwrap_err();
    assert!(err.is_bind_error());

    drop(occupied);
    manager.start_rule("busy").await.unwrap();
    assert_eq!(manager.active_count(), 1);
    manager.stop_all().await;
}

#[tokio::test]
async fn test_global_traffic_sums_engines() {
    let (target, _server) = start_uppercase_server().await;
    let manager = Manager::default();
    let ports = [get_free_port(), get_free_port()];

    for (i, port) in ports.iter().enumerate() {
        manager
            .add_rule(enabled(Rule::new(
                format!("r{i}"),
                *port,
                "127.0.0.1",
                target.port(),
                Protocol::Tcp,
            )))
            .await
            .unwrap();
    }

    for port in ports {
        let mut client = TcpStream::connect(local(port)).await.unwrap();
        client.write_all(b"abcd").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.update_all_rates();

    let traffic = manager.global_traffic();
    assert!(traffic.total_out >= 8);
    assert!(traffic.total_in >= 8);
    assert_eq!(manager.all_rules().len(), 2);

    manager.stop_all().await;
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_update_unknown_rule() {
    let manager = Manager::default();
    let err = manager
        .update_rule(Rule::new("ghost", 4000, "127.0.0.1", 9, Protocol::Tcp))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::RuleNotFound(_)));
}
