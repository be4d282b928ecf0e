//! Integration tests for change detection runs against a mock HTTP server.

mod support;
use support::socket_guard::{html_page, mount_html, start_mock_server_or_skip};

use std::sync::Arc;

use sitewatch_core::diff::{DiffKind, LineOp};
use sitewatch_core::snapshot::file_key_for_url;
use sitewatch_core::{
    ChangeDetectionPipeline, HttpClient, JsonFileNotifier, LogNotifier, Notifier, PipelineConfig,
    RetryPolicy, RunContext, SnapshotStore, archive_name_for,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(root: &std::path::Path, retention: usize, notifier: Arc<dyn Notifier>) -> ChangeDetectionPipeline {
    let store = SnapshotStore::new(root, retention).expect("valid retention");
    let config = PipelineConfig {
        concurrency: 4,
        retry_policy: RetryPolicy::no_retry(),
    };
    ChangeDetectionPipeline::new(store, Arc::new(HttpClient::new()), notifier, config)
        .expect("valid concurrency")
}

fn url(server: &MockServer, route: &str) -> String {
    format!("{}{route}", server.uri())
}

#[tokio::test]
async fn test_second_run_reports_changed_and_new_pages() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    let reports = temp.path().join("reports");
    let pipeline = pipeline(
        &temp.path().join("archive"),
        2,
        Arc::new(JsonFileNotifier::new(&reports)),
    );
    let ctx = RunContext::new();
    let p1 = url(&server, "/p1");
    let p2 = url(&server, "/p2");
    let archive = archive_name_for(&[p1.clone()]).expect("archive name");

    mount_html(&server, "/p1", &html_page("Home", &["Old"], &[])).await;
    let first = pipeline
        .run_once(&ctx, &archive, &[p1.clone()])
        .await
        .expect("first run");
    assert_eq!(first.captured, 1);
    assert!(!first.compared);
    assert!(first.report.is_none());

    server.reset().await;
    mount_html(&server, "/p1", &html_page("Home", &["New"], &[])).await;
    mount_html(&server, "/p2", &html_page("Second", &["Hello"], &[])).await;
    let second = pipeline
        .run_once(&ctx, &archive, &[p1.clone(), p2.clone()])
        .await
        .expect("second run");

    assert!(second.compared);
    assert!(second.notified);
    let report = second.report.expect("changes reported");
    assert_eq!(report.changed_count(), 1);
    assert_eq!(report.new_count(), 1);

    let p1_key = file_key_for_url(&p1).expect("key");
    let p1_record = report
        .records
        .iter()
        .find(|record| record.key == p1_key)
        .expect("p1 record");
    let changes: Vec<_> = p1_record
        .changed_lines()
        .map(|line| (line.op, line.text.as_str()))
        .collect();
    assert_eq!(changes, vec![(LineOp::Remove, "Old"), (LineOp::Add, "New")]);

    let p2_key = file_key_for_url(&p2).expect("key");
    assert!(
        report
            .records
            .iter()
            .any(|record| record.key == p2_key && record.kind == DiffKind::NewInLatest)
    );

    let report_path = reports.join(format!("report_{}.json", second.snapshot));
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(report_path).expect("report written"))
            .expect("valid json");
    assert_eq!(json["report"]["records"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_unchanged_pages_produce_no_report() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    let pipeline = pipeline(temp.path(), 2, Arc::new(LogNotifier));
    let ctx = RunContext::new();
    let targets = vec![url(&server, "/p1")];
    let archive = archive_name_for(&targets).expect("archive name");

    mount_html(&server, "/p1", &html_page("Home", &["Same"], &[])).await;
    pipeline.run_once(&ctx, &archive, &targets).await.expect("first run");
    let second = pipeline.run_once(&ctx, &archive, &targets).await.expect("second run");

    assert!(second.compared);
    assert!(second.report.is_none());
    assert!(!second.notified);
}

#[tokio::test]
async fn test_retention_keeps_newest_snapshots() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    let pipeline = pipeline(temp.path(), 2, Arc::new(LogNotifier));
    let ctx = RunContext::new();
    let targets = vec![url(&server, "/p1")];
    let archive = archive_name_for(&targets).expect("archive name");
    mount_html(&server, "/p1", &html_page("Home", &["Text"], &[])).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let outcome = pipeline.run_once(&ctx, &archive, &targets).await.expect("run");
        ids.push(outcome.snapshot);
    }

    let remaining = pipeline
        .store()
        .list_snapshots(&archive)
        .await
        .expect("list snapshots");
    assert_eq!(remaining, ids[1..].to_vec());
}

#[tokio::test]
async fn test_failed_target_is_left_out_and_reported_missing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    let pipeline = pipeline(temp.path(), 2, Arc::new(LogNotifier));
    let ctx = RunContext::new();
    let targets = vec![url(&server, "/p1"), url(&server, "/p2")];
    let archive = archive_name_for(&targets).expect("archive name");

    mount_html(&server, "/p1", &html_page("One", &["a"], &[])).await;
    mount_html(&server, "/p2", &html_page("Two", &["b"], &[])).await;
    pipeline.run_once(&ctx, &archive, &targets).await.expect("first run");

    server.reset().await;
    mount_html(&server, "/p1", &html_page("One", &["a"], &[])).await;
    Mock::given(method("GET"))
        .and(path("/p2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let second = pipeline.run_once(&ctx, &archive, &targets).await.expect("second run");

    assert_eq!(second.captured, 1);
    assert_eq!(second.failures.len(), 1);
    assert_eq!(second.failures[0].url, targets[1]);

    let snapshot = pipeline
        .store()
        .open_snapshot(&archive, &second.snapshot)
        .await
        .expect("open snapshot");
    let p2_key = file_key_for_url(&targets[1]).expect("key");
    assert!(!snapshot.keys().contains(&p2_key));

    let report = second.report.expect("missing page surfaced");
    assert_eq!(report.missing_count(), 1);
    assert_eq!(report.records[0].kind, DiffKind::MissingFromLatest);
}
