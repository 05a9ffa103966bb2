//! Shared pipeline entrypoint used by every CLI command.

use std::path::PathBuf;

use serde::Serialize;
use ureq::Agent;

use mirror_core::MirrorConfig;

use crate::error::{io_err, SyncError};
use crate::http;
use crate::payload::{self, PayloadOutcome};
use crate::reconcile::{self, PassOptions, PassSummary};
use crate::source::HttpSource;
use crate::store::{LocalStore, ObjectStore, S3Credentials, S3Store};

/// Which container backend a run writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// The configured S3 bucket.
    S3,
    /// A local directory standing in for a bucket; created if missing.
    LocalDir(PathBuf),
}

/// What a pipeline run does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Reconcile the container against the source directory.
    Sync(PassOptions),
    /// Store the single API payload.
    Fetch,
    /// Sync, then fetch the payload.
    All(PassOptions),
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<PassSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadOutcome>,
}

impl RunReport {
    /// `true` when no per-key failure was recorded.
    pub fn is_fully_synced(&self) -> bool {
        self.pass.as_ref().map_or(true, PassSummary::is_fully_synced)
    }
}

/// Build the configured container.
///
/// The client is created here and handed to callers explicitly; nothing is
/// cached process-wide.
pub fn open_store(
    config: &MirrorConfig,
    target: &StoreTarget,
    agent: &Agent,
) -> Result<Box<dyn ObjectStore>, SyncError> {
    match target {
        StoreTarget::S3 => {
            let bucket = config.bucket()?;
            let credentials = S3Credentials::from_env()?;
            let endpoint = config.endpoint_url()?;
            tracing::debug!(
                bucket = %bucket,
                region = config.region(),
                endpoint = ?endpoint.as_ref().map(|u| u.as_str()),
                "using S3 container"
            );
            Ok(Box::new(S3Store::new(
                agent.clone(),
                bucket,
                config.region(),
                endpoint,
                credentials,
            )))
        }
        StoreTarget::LocalDir(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            tracing::debug!(dir = %dir.display(), "using local directory container");
            Ok(Box::new(LocalStore::new(dir.clone())))
        }
    }
}

/// Run a job against the configured source and container.
///
/// This is the canonical entrypoint for `mirror sync`, `mirror fetch` and
/// `mirror run`.
pub fn run(config: &MirrorConfig, target: &StoreTarget, job: Job) -> Result<RunReport, SyncError> {
    let agent = http::agent(config);
    let store = open_store(config, target, &agent)?;

    let mut report = RunReport::default();
    match job {
        Job::Sync(options) => {
            report.pass = Some(sync_with(config, &agent, store.as_ref(), &options)?);
        }
        Job::Fetch => {
            report.payload = Some(fetch_with(config, &agent, store.as_ref())?);
        }
        Job::All(options) => {
            report.pass = Some(sync_with(config, &agent, store.as_ref(), &options)?);
            report.payload = Some(fetch_with(config, &agent, store.as_ref())?);
        }
    }
    Ok(report)
}

fn sync_with(
    config: &MirrorConfig,
    agent: &Agent,
    store: &dyn ObjectStore,
    options: &PassOptions,
) -> Result<PassSummary, SyncError> {
    let source = HttpSource::new(agent.clone(), config.data_url()?)?
        .with_temp_dir(config.temp_dir.clone());
    reconcile::run_pass(&source, store, options)
}

fn fetch_with(
    config: &MirrorConfig,
    agent: &Agent,
    store: &dyn ObjectStore,
) -> Result<PayloadOutcome, SyncError> {
    payload::fetch_payload(
        agent,
        &config.api_url()?,
        store,
        config.payload_key()?,
        config.temp_dir.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn local_dir_target_is_created() {
        let scratch = TempDir::new().expect("scratch");
        let dir = scratch.path().join("bucket");
        let config = MirrorConfig::default();

        let store = open_store(&config, &StoreTarget::LocalDir(dir.clone()), &http::agent(&config))
            .expect("open");
        assert!(dir.is_dir());
        assert!(store.inventory().expect("inventory").is_empty());
    }

    #[test]
    fn s3_target_without_bucket_is_a_config_error() {
        let config = MirrorConfig::default();
        let err = open_store(&config, &StoreTarget::S3, &http::agent(&config))
            .err()
            .expect("missing bucket");
        assert!(matches!(err, SyncError::Config(_)), "{err}");
    }

    #[test]
    fn sync_without_data_url_fails_before_listing() {
        let scratch = TempDir::new().expect("scratch");
        let config = MirrorConfig::default();
        let err = run(
            &config,
            &StoreTarget::LocalDir(scratch.path().to_path_buf()),
            Job::Sync(PassOptions::default()),
        )
        .expect_err("no data_url");
        assert!(err.to_string().contains("data_url"), "{err}");
    }

    #[test]
    fn empty_report_counts_as_synced() {
        assert!(RunReport::default().is_fully_synced());
    }
}
