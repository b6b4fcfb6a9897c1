//! Configuration → supervisor → fake Kuma server, end to end

use kuma_connect::testing::{eventually, FakeKumaServer};
use kuma_connect::{CommandKind, Heartbeat, Inventory, Monitor, MonitorStatus};
use kuma_sentinel::{build_sentinel, SentinelConfig};
use sentinel_core::ReconnectPolicy;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(5);

fn inventory() -> Inventory {
    vec![
        Monitor::new(1, "WAN", "ping"),
        Monitor::group(7, "Offsite"),
        Monitor::new(10, "NAS", "http").with_parent(7),
        Monitor::new(11, "Router UI", "http").with_parent(7),
        Monitor::new(12, "Cloud Backup", "keyword").with_parent(7),
        Monitor::new(20, "Weather API", "http").with_tag("internet-dependent"),
    ]
    .into_iter()
    .collect()
}

fn config(vars: &[(&str, String)]) -> SentinelConfig {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    SentinelConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
}

#[tokio::test]
async fn test_configured_group_is_suppressed() {
    let server = FakeKumaServer::start("ops", "s3cret", inventory())
        .await
        .unwrap();
    let config = config(&[
        ("KUMA_URL", server.url().to_string()),
        ("KUMA_USER", "ops".to_string()),
        ("KUMA_PASS", "s3cret".to_string()),
        ("SENTINEL_NAME", "WAN".to_string()),
        ("GROUP_TO_PAUSE", "Offsite".to_string()),
    ]);

    let policy = ReconnectPolicy::with_retry_delay(Duration::from_millis(50));
    let sentinel = build_sentinel(&config, policy).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(sentinel.run_until(async {
        let _ = stopped.await;
    }));

    assert!(eventually(WAIT, || server.logins() == 1).await);
    server.push_heartbeat(Heartbeat::new(1, MonitorStatus::Down, "Request timeout"));
    assert!(eventually(WAIT, || server.commands_of(CommandKind::Pause) == vec![10, 11, 12]).await);

    server.push_heartbeat(Heartbeat::new(1, MonitorStatus::Up, "OK"));
    assert!(eventually(WAIT, || server.commands_of(CommandKind::Resume) == vec![10, 11, 12]).await);

    let _ = stop.send(());
    let state = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!state.suppressed);
    assert_eq!(state.sentinel_id, Some(1));
}

#[tokio::test]
async fn test_configured_tag_is_suppressed() {
    let server = FakeKumaServer::start("admin", "changeme", inventory())
        .await
        .unwrap();
    let config = config(&[
        ("KUMA_URL", server.url().to_string()),
        ("SENTINEL_NAME", "WAN".to_string()),
        ("TAG_TO_SUPPRESS", "internet-dependent".to_string()),
    ]);

    let policy = ReconnectPolicy::with_retry_delay(Duration::from_millis(50));
    let sentinel = build_sentinel(&config, policy).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(sentinel.run_until(async {
        let _ = stopped.await;
    }));

    assert!(eventually(WAIT, || server.logins() == 1).await);
    server.push_heartbeat(Heartbeat::new(1, MonitorStatus::Down, "Request timeout"));
    assert!(eventually(WAIT, || server.commands_of(CommandKind::Pause) == vec![20]).await);

    let _ = stop.send(());
    let state = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(state.suppressed);
    assert_eq!(state.target_ids, vec![20]);
}
