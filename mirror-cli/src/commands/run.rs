//! `mirror run`: the scheduled job. Sync the bucket, then fetch the payload.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use mirror_sync::{
    pipeline::{self, Job},
    PassOptions,
};

use super::{exit_code, print_json, print_payload, print_summary, GlobalArgs};

/// Arguments for `mirror run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, value_name = "URL")]
    pub data_url: Option<String>,

    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Bucket key for the payload.
    #[arg(long)]
    pub key: Option<String>,

    #[arg(long)]
    pub workers: Option<usize>,

    /// Abort instead of emptying the bucket when the source lists no files.
    #[arg(long)]
    pub refuse_empty: bool,

    /// Exit with status 2 when any file failed to sync.
    #[arg(long)]
    pub strict: bool,

    /// Compare against the recorded content digest even when the ETag looks
    /// like an MD5 (needed for SSE-KMS buckets).
    #[arg(long)]
    pub verify_metadata: bool,

    /// Emit the combined report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let (config, target) = global.resolve(|config| {
            if let Some(url) = &self.data_url {
                config.data_url = Some(url.clone());
            }
            if let Some(url) = &self.api_url {
                config.api_url = Some(url.clone());
            }
            if let Some(key) = &self.key {
                config.payload_key = Some(key.clone());
            }
            if let Some(workers) = self.workers {
                config.workers = workers;
            }
            if self.verify_metadata {
                config.verify_metadata = true;
            }
        })?;

        let options = PassOptions {
            workers: config.workers,
            dry_run: false,
            refuse_empty_source: self.refuse_empty,
            verify_metadata: config.verify_metadata,
        };
        let report = pipeline::run(&config, &target, Job::All(options)).context("run failed")?;

        if self.json {
            print_json(&report)?;
        } else {
            if let Some(summary) = report.pass.as_ref() {
                print_summary(summary);
            }
            if let Some(payload) = report.payload.as_ref() {
                print_payload(payload);
            }
        }
        Ok(exit_code(report.is_fully_synced(), self.strict))
    }
}
