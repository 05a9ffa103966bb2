use std::fs;

use assert_cmd::assert::Assert;
use assert_cmd::prelude::*;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const LISTING: &str = r#"<html><body>
<a href="/pub/pr/">[To Parent Directory]</a>
<a href="/pub/pr/pr.class">pr.class</a>
<a href="/pub/pr/pr.series">pr.series</a>
</body></html>"#;

async fn serve(server: &MockServer, route: &str, status: u16, content_type: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status).set_body_raw(body.as_bytes().to_vec(), content_type),
        )
        .mount(server)
        .await;
}

/// The published directory plus the population API.
async fn source_server() -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "/pub/pr/", 200, "text/html", LISTING).await;
    serve(&server, "/pub/pr/pr.class", 200, "text/plain", "class codes\n").await;
    serve(&server, "/pub/pr/pr.series", 200, "text/plain", "series ids\n").await;
    serve(
        &server,
        "/api/data",
        200,
        "application/json",
        r#"{"data":[{"Nation":"United States","Population":331893745}]}"#,
    )
    .await;
    server
}

/// Run the binary off the runtime's worker threads, then assert on it.
async fn run(mut cmd: Command) -> Assert {
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .expect("mirror thread")
        .expect("run mirror")
        .assert()
}

/// A `mirror` command isolated from the caller's config and environment.
fn mirror(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mirror").expect("mirror binary");
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("BUCKET_NAME")
        .env_remove("AWS_REGION")
        .env_remove("AWS_DEFAULT_REGION")
        .env_remove("AWS_ENDPOINT_URL")
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("RUST_LOG");
    cmd
}

// ---------------------------------------------------------------------------
// sync / plan
// ---------------------------------------------------------------------------

fn sync_into(home: &TempDir, bucket: &TempDir, args: &[&str]) -> Command {
    let mut cmd = mirror(home);
    cmd.arg("--local-dir").arg(bucket.path()).args(args);
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_mirrors_directory_into_local_dir() {
    let server = source_server().await;
    let url = format!("{}/pub/pr/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();
    fs::write(bucket.path().join("retired.txt"), "old").unwrap();

    run(sync_into(&home, &bucket, &["sync", "--data-url", &url]))
        .await
        .success()
        .stdout(predicate::str::contains("2 created"))
        .stdout(predicate::str::contains("1 deleted"))
        .stdout(predicate::str::contains("pr.series"));

    assert_eq!(
        fs::read_to_string(bucket.path().join("pr.class")).unwrap(),
        "class codes\n"
    );
    assert!(!bucket.path().join("retired.txt").exists());

    run(sync_into(&home, &bucket, &["sync", "--verify-metadata", "--data-url", &url]))
        .await
        .success()
        .stdout(predicate::str::contains("already mirrors"));
}

#[tokio::test(flavor = "multi_thread")]
async fn plan_reports_changes_and_writes_nothing() {
    let server = source_server().await;
    let url = format!("{}/pub/pr/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();
    fs::write(bucket.path().join("retired.txt"), "old").unwrap();

    run(sync_into(&home, &bucket, &["plan", "--data-url", &url]))
        .await
        .success()
        .stdout(predicate::str::contains("[dry-run]"))
        .stdout(predicate::str::contains("retired.txt (delete)"))
        .stdout(predicate::str::contains("pr.class (create)"));

    assert!(bucket.path().join("retired.txt").exists());
    assert!(!bucket.path().join("pr.class").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn json_summary_is_machine_readable() {
    let server = source_server().await;
    let url = format!("{}/pub/pr/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();

    let assert = run(sync_into(&home, &bucket, &["sync", "--json", "--data-url", &url]))
        .await
        .success();

    let summary: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("JSON stdout");
    assert_eq!(summary["dry_run"], false);
    assert_eq!(summary["entries"].as_array().unwrap().len(), 2);
    assert_eq!(summary["entries"][0]["key"], "pr.class");
    assert_eq!(summary["entries"][0]["outcome"], "created");
}

#[tokio::test(flavor = "multi_thread")]
async fn strict_mode_exits_two_when_a_file_fails() {
    let server = MockServer::start().await;
    serve(&server, "/pub/", 200, "application/json", r#"["ok.txt", "gone.txt"]"#).await;
    serve(&server, "/pub/ok.txt", 200, "text/plain", "ok").await;
    let url = format!("{}/pub/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();

    run(sync_into(&home, &bucket, &["sync", "--data-url", &url]))
        .await
        .success()
        .stdout(predicate::str::contains("1 failed"))
        .stdout(predicate::str::contains("gone.txt"));

    run(sync_into(&home, &bucket, &["sync", "--strict", "--data-url", &url]))
        .await
        .code(2);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_source_exits_one() {
    let server = MockServer::start().await;
    serve(&server, "/pub/", 503, "text/plain", "maintenance").await;
    let url = format!("{}/pub/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();
    fs::write(bucket.path().join("keep.txt"), "keep").unwrap();

    run(sync_into(&home, &bucket, &["sync", "--data-url", &url]))
        .await
        .code(1)
        .stderr(predicate::str::contains("unreachable"));

    assert!(bucket.path().join("keep.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn refuse_empty_keeps_bucket_contents() {
    let server = MockServer::start().await;
    serve(&server, "/pub/", 200, "application/json", "[]").await;
    let url = format!("{}/pub/", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();
    fs::write(bucket.path().join("keep.txt"), "keep").unwrap();

    run(sync_into(&home, &bucket, &["sync", "--refuse-empty", "--data-url", &url]))
        .await
        .code(1)
        .stderr(predicate::str::contains("refusing to delete"));

    assert!(bucket.path().join("keep.txt").exists());
}

// ---------------------------------------------------------------------------
// fetch / run
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn fetch_reads_settings_from_config_file() {
    let server = source_server().await;
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();
    let config = home.path().join("mirror.yaml");
    fs::write(
        &config,
        format!("api_url: {}/api/data\npayload_key: population.json\n", server.uri()),
    )
    .unwrap();

    let mut cmd = mirror(&home);
    cmd.arg("--config")
        .arg(&config)
        .arg("--local-dir")
        .arg(bucket.path())
        .arg("fetch");
    run(cmd)
        .await
        .success()
        .stdout(predicate::str::contains("population.json"));

    let stored = fs::read_to_string(bucket.path().join("population.json")).unwrap();
    assert!(stored.starts_with('['), "stored: {stored}");
    assert!(stored.contains("331893745"));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_syncs_then_fetches() {
    let server = source_server().await;
    let data_url = format!("{}/pub/pr/", server.uri());
    let api_url = format!("{}/api/data", server.uri());
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();

    run(sync_into(
        &home,
        &bucket,
        &["run", "--data-url", &data_url, "--api-url", &api_url, "--key", "api_data.json"],
    ))
    .await
    .success();

    for name in ["pr.class", "pr.series", "api_data.json"] {
        assert!(bucket.path().join(name).exists(), "{name} missing");
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn s3_without_bucket_is_rejected() {
    let home = TempDir::new().unwrap();

    mirror(&home)
        .args(["sync", "--data-url", "https://example.invalid/pub/"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no bucket configured"));
}

#[test]
fn malformed_config_is_reported_with_path() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("broken.yaml");
    fs::write(&config, "workers: [not, a, number]\n").unwrap();

    mirror(&home)
        .arg("--config")
        .arg(&config)
        .arg("sync")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("broken.yaml"));
}

#[test]
fn zero_workers_is_rejected() {
    let home = TempDir::new().unwrap();
    let bucket = TempDir::new().unwrap();

    mirror(&home)
        .arg("--local-dir")
        .arg(bucket.path())
        .args(["sync", "--workers", "0", "--data-url", "http://127.0.0.1:9/"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("workers"));
}
