//! Scrape job lifecycle against the fake control plane.

mod common;

use std::collections::BTreeMap;

use common::{FakeServer, PROJECT};
use keel_engine::{Field, Reconciler, StateChange};
use keel_provider::clients::ArgusClient;
use keel_provider::resources::job::{BasicAuth, Saml2, Target};
use keel_provider::resources::{Job, JobKind};
use tokio_util::sync::CancellationToken;

fn reconciler(server: &FakeServer) -> Reconciler<JobKind> {
    Reconciler::new(
        JobKind::new(ArgusClient::new(server.api())),
        server.engine_config(),
    )
}

fn desired() -> Job {
    Job {
        project_id: PROJECT.to_string(),
        argus_instance_id: "argus-1".to_string(),
        name: "node-exporter".into(),
        targets: Field::Value(vec![
            Target {
                urls: Field::Value(vec!["10.0.0.5:9100".into()]),
                labels: Field::Null,
            },
            Target {
                urls: Field::Value(vec!["10.0.0.6:9100".into()]),
                labels: Field::Value(BTreeMap::from([("env".to_string(), "prod".into())])),
            },
        ]),
        ..Default::default()
    }
}

async fn create(server: &FakeServer, job: Job) -> Job {
    let outcome = reconciler(server)
        .create(job, &CancellationToken::new())
        .await;
    match outcome.change {
        StateChange::Commit(job) => job,
        other => panic!("Unexpected change: {:?} {:?}", other, outcome.diagnostics),
    }
}

#[tokio::test]
async fn test_create_applies_defaults() {
    let server = FakeServer::spawn().await;
    let job = create(&server, desired()).await;

    assert_eq!(job.metrics_path, Field::Value("/metrics".to_string()));
    assert_eq!(job.scheme, Field::Value("https".to_string()));
    assert_eq!(job.scrape_interval, Field::Value("5m".to_string()));
    assert_eq!(job.scrape_timeout, Field::Value("2m".to_string()));
    assert!(job.saml2.is_null());

    let targets = job.targets.value().unwrap();
    assert!(targets[0].labels.is_null());
    assert_eq!(targets[1].labels, desired().targets.value().unwrap()[1].labels);

    let stored = server.with_state(|s| s.jobs["node-exporter"].clone());
    assert!(stored.params.is_none());
    assert!(stored.static_configs[0].labels.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_saml2_and_basic_auth_round_trip() {
    let server = FakeServer::spawn().await;
    let mut plan = desired();
    plan.saml2 = Field::Value(Saml2 {
        enable_url_parameters: Field::Value(false),
    });
    plan.basic_auth = Field::Value(BasicAuth {
        username: "prom".into(),
        password: "pw".into(),
    });
    let job = create(&server, plan.clone()).await;

    assert_eq!(job.saml2, plan.saml2);
    assert_eq!(job.basic_auth, plan.basic_auth);
    let stored = server.with_state(|s| s.jobs["node-exporter"].clone());
    assert_eq!(
        stored.params.unwrap().get("saml2"),
        Some(&vec!["disabled".to_string()])
    );

    let outcome = reconciler(&server)
        .read(&job, &CancellationToken::new())
        .await;
    assert_eq!(outcome.change, StateChange::Commit(job));

    server.shutdown().await;
}

#[tokio::test]
async fn test_update_changes_interval() {
    let server = FakeServer::spawn().await;
    let job = create(&server, desired()).await;

    let outcome = reconciler(&server)
        .update(desired(), &job, &CancellationToken::new())
        .await;
    assert_eq!(outcome.change, StateChange::Commit(job.clone()));
    assert_eq!(server.count("PUT job"), 0);

    let mut plan = desired();
    plan.scrape_interval = "1m".into();
    let outcome = reconciler(&server)
        .update(plan, &job, &CancellationToken::new())
        .await;
    let StateChange::Commit(updated) = outcome.change else {
        panic!("Unexpected outcome: {:?}", outcome.diagnostics);
    };
    assert_eq!(updated.scrape_interval, Field::Value("1m".to_string()));
    assert_eq!(server.count("PUT job"), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let server = FakeServer::spawn().await;
    create(&server, desired()).await;

    let outcome = reconciler(&server)
        .create(desired(), &CancellationToken::new())
        .await;
    assert_eq!(outcome.change, StateChange::Keep);
    let error = outcome.diagnostics.iter().next().unwrap();
    assert!(error.detail.contains("409"), "{}", error.detail);
    assert!(!error.summary.contains("unconfirmed"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_import_and_delete() {
    let server = FakeServer::spawn().await;
    create(&server, desired()).await;

    let outcome = reconciler(&server)
        .import(
            &format!("{},argus-1,node-exporter", PROJECT),
            &CancellationToken::new(),
        )
        .await;
    let StateChange::Commit(imported) = outcome.change else {
        panic!("Unexpected outcome: {:?}", outcome.diagnostics);
    };
    assert_eq!(imported.name, Field::Value("node-exporter".to_string()));
    assert!(imported.targets.value().unwrap()[0].labels.is_null());

    for _ in 0..2 {
        let outcome = reconciler(&server)
            .delete(&imported, &CancellationToken::new())
            .await;
        assert_eq!(outcome.change, StateChange::Remove);
        assert!(outcome.is_success(), "{:?}", outcome.diagnostics);
    }
    assert!(server.with_state(|s| s.jobs.is_empty()));

    server.shutdown().await;
}
