//! The file-based host: committed state is written, removed state deleted.

mod common;

use common::{FakeServer, PROJECT};
use keel_provider::host::{dispatch, Invocation, Kind, Verb};
use keel_provider::resources::Network;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_create_read_delete_through_state_file() {
    let server = FakeServer::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let desired = dir.path().join("desired.json");
    let state = dir.path().join("state.json");
    tokio::fs::write(
        &desired,
        format!(r#"{{"project_id":"{}","name":"net","nameservers":["1.1.1.1"]}}"#, PROJECT),
    )
    .await
    .unwrap();

    let run = |verb: Verb| Invocation {
        verb,
        desired: Some(desired.clone()),
        state: Some(state.clone()),
        id: None,
    };
    let cancel = CancellationToken::new();

    let report = dispatch(Kind::Network, server.api(), server.engine_config(), &run(Verb::Create), &cancel)
        .await
        .unwrap();
    assert_eq!(report.change, "commit");
    assert!(!report.has_error());

    let written: Network = serde_json::from_slice(&tokio::fs::read(&state).await.unwrap()).unwrap();
    assert!(written.network_id.value().is_some());
    assert_eq!(written.prefix_length_v4.value(), Some(&25));

    let report = dispatch(Kind::Network, server.api(), server.engine_config(), &run(Verb::Read), &cancel)
        .await
        .unwrap();
    assert_eq!(report.change, "commit");

    let report = dispatch(Kind::Network, server.api(), server.engine_config(), &run(Verb::Delete), &cancel)
        .await
        .unwrap();
    assert_eq!(report.change, "remove");
    assert!(!state.exists());

    server.shutdown().await;
}

#[tokio::test]
async fn test_report_serializes_diagnostics() {
    let server = FakeServer::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");

    let invocation = Invocation {
        verb: Verb::Import,
        desired: None,
        state: Some(state.clone()),
        id: Some(format!("{},missing-instance", PROJECT)),
    };
    let report = dispatch(
        Kind::Instance,
        server.api(),
        server.engine_config(),
        &invocation,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.change, "keep");
    assert!(report.has_error());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["change"], "keep");
    assert_eq!(json["diagnostics"][0]["severity"], "error");
    assert!(!state.exists());

    server.shutdown().await;
}
