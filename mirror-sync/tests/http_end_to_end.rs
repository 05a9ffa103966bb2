use std::fs;

use mirror_core::MirrorConfig;
use mirror_sync::pipeline::{self, Job, RunReport, StoreTarget};
use mirror_sync::{EntryOutcome, FailureKind, PassOptions, PassStatus, SyncError};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const LISTING: &str = r#"<html><body><pre>
<A HREF="/pub/">[To Parent Directory]</A><br>
<A HREF="/pub/pr/pr.class">pr.class</A><br>
<A HREF="/pub/pr/pr.series">pr.series</A><br>
<A HREF="/pub/pr/archive/">archive</A><br>
</pre></body></html>"#;

fn config_for(server: &MockServer) -> MirrorConfig {
    MirrorConfig {
        data_url: Some(format!("{}/pub/pr/", server.uri())),
        api_url: Some(format!("{}/api/data?drilldowns=Nation", server.uri())),
        payload_key: Some("population.json".to_string()),
        workers: 2,
        request_timeout_secs: 5,
        ..MirrorConfig::default()
    }
}

async fn serve(server: &MockServer, route: &str, status: u16, content_type: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status).set_body_raw(body.as_bytes().to_vec(), content_type),
        )
        .mount(server)
        .await;
}

async fn serve_directory(server: &MockServer) {
    serve(server, "/pub/pr/", 200, "text/html", LISTING).await;
    serve(server, "/pub/pr/pr.class", 200, "text/plain", "class codes\n").await;
    serve(server, "/pub/pr/pr.series", 200, "text/plain", "series ids\n").await;
}

async fn serve_api(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(query_param("drilldowns", "Nation"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/json"),
        )
        .mount(server)
        .await;
}

/// The pipeline is blocking; keep it off the runtime's worker threads.
async fn run_job(
    config: MirrorConfig,
    target: StoreTarget,
    job: Job,
) -> Result<RunReport, SyncError> {
    tokio::task::spawn_blocking(move || pipeline::run(&config, &target, job))
        .await
        .expect("pipeline thread")
}

fn local(dir: &TempDir) -> StoreTarget {
    StoreTarget::LocalDir(dir.path().to_path_buf())
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn html_directory_is_mirrored_into_local_container() {
    let server = MockServer::start().await;
    serve_directory(&server).await;

    let bucket = TempDir::new().expect("bucket");
    fs::write(bucket.path().join("retired.txt"), "old").expect("seed orphan");

    let report = run_job(config_for(&server), local(&bucket), Job::Sync(PassOptions::default()))
        .await
        .expect("sync");
    let pass = report.pass.expect("pass summary");

    assert_eq!(pass.status(), PassStatus::FullySynced);
    assert_eq!(pass.created(), 2);
    assert_eq!(pass.deleted(), 1);
    assert_eq!(
        fs::read_to_string(bucket.path().join("pr.class")).unwrap(),
        "class codes\n"
    );
    assert!(!bucket.path().join("retired.txt").exists());
    assert!(!bucket.path().join("archive").exists());

    // Unchanged source: nothing to do.
    let again = run_job(config_for(&server), local(&bucket), Job::Sync(PassOptions::default()))
        .await
        .expect("second sync")
        .pass
        .expect("pass summary");
    assert_eq!(again.unchanged(), 2);
    assert_eq!(again.created() + again.updated() + again.deleted(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn redirected_directory_resolves_links_under_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pub/pr"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/pub/pr/"))
        .mount(&server)
        .await;
    serve(
        &server,
        "/pub/pr/",
        200,
        "text/html",
        r#"<a href="../">up</a><a href="pr.class">pr.class</a>"#,
    )
    .await;
    serve(&server, "/pub/pr/pr.class", 200, "text/plain", "class codes\n").await;

    let bucket = TempDir::new().expect("bucket");
    let config = MirrorConfig {
        data_url: Some(format!("{}/pub/pr", server.uri())),
        ..config_for(&server)
    };

    let pass = run_job(config, local(&bucket), Job::Sync(PassOptions::default()))
        .await
        .expect("sync")
        .pass
        .expect("pass summary");

    assert_eq!(pass.status(), PassStatus::FullySynced);
    assert_eq!(pass.created(), 1);
    assert_eq!(
        fs::read_to_string(bucket.path().join("pr.class")).unwrap(),
        "class codes\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn json_listing_and_fetch_failure_degrade_the_pass() {
    let server = MockServer::start().await;
    serve(&server, "/pub/pr/", 200, "application/json", r#"["a.csv", "missing.csv"]"#).await;
    serve(&server, "/pub/pr/a.csv", 200, "text/csv", "x,y\n1,2\n").await;

    let bucket = TempDir::new().expect("bucket");

    let pass = run_job(config_for(&server), local(&bucket), Job::Sync(PassOptions::default()))
        .await
        .expect("sync")
        .pass
        .expect("pass summary");

    assert_eq!(pass.status(), PassStatus::Degraded { failed: 1 });
    let missing = pass
        .entries
        .iter()
        .find(|o| o.key() == "missing.csv")
        .expect("missing.csv outcome");
    match missing {
        EntryOutcome::Failed { kind, error, .. } => {
            assert_eq!(*kind, FailureKind::Fetch);
            assert!(error.contains("404"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(bucket.path().join("a.csv").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_listing_aborts_and_keeps_container() {
    let server = MockServer::start().await;
    serve(&server, "/pub/pr/", 500, "text/plain", "boom").await;

    let bucket = TempDir::new().expect("bucket");
    fs::write(bucket.path().join("keep.txt"), "keep").expect("seed");

    let err = run_job(config_for(&server), local(&bucket), Job::Sync(PassOptions::default()))
        .await
        .expect_err("abort");

    assert!(matches!(err, SyncError::SourceUnreachable { .. }), "{err}");
    assert!(bucket.path().join("keep.txt").exists());
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn payload_data_member_is_stored_under_key() {
    let server = MockServer::start().await;
    serve_api(
        &server,
        r#"{"data":[{"Nation":"United States","Year":"2021","Population":331893745}],"source":[{"name":"acs"}]}"#,
    )
    .await;

    let bucket = TempDir::new().expect("bucket");

    let report = run_job(config_for(&server), local(&bucket), Job::Fetch)
        .await
        .expect("fetch");
    let payload = report.payload.expect("payload outcome");
    assert_eq!(payload.key, "population.json");

    let stored: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(bucket.path().join("population.json")).expect("stored payload"),
    )
    .expect("stored JSON");
    assert_eq!(stored[0]["Population"], 331893745);
    assert!(stored.get("source").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn payload_without_data_member_is_rejected() {
    let server = MockServer::start().await;
    serve_api(&server, r#"{"errors":["rate limited"]}"#).await;

    let bucket = TempDir::new().expect("bucket");

    let err = run_job(config_for(&server), local(&bucket), Job::Fetch)
        .await
        .expect_err("reject");
    assert!(matches!(err, SyncError::PayloadFormat { .. }), "{err}");
    assert!(!bucket.path().join("population.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_job_syncs_then_fetches() {
    let server = MockServer::start().await;
    serve_directory(&server).await;
    serve_api(&server, r#"{"data":[]}"#).await;

    let bucket = TempDir::new().expect("bucket");

    let report = run_job(config_for(&server), local(&bucket), Job::All(PassOptions::default()))
        .await
        .expect("run");

    assert!(report.is_fully_synced());
    assert_eq!(report.pass.expect("pass").created(), 2);
    assert!(report.payload.is_some());
    assert_eq!(
        fs::read_to_string(bucket.path().join("population.json")).unwrap(),
        "[]"
    );
}
