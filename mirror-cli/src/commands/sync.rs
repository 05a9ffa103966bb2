//! `mirror sync` and `mirror plan`: reconcile the bucket against the source.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use mirror_sync::{
    pipeline::{self, Job},
    PassOptions,
};

use super::{exit_code, print_json, print_summary, GlobalArgs};

/// Arguments for `mirror sync`.
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Source directory URL (overrides `data_url` from the config file).
    #[arg(long, value_name = "URL")]
    pub data_url: Option<String>,

    /// Show what would change without writing or deleting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the pass summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Parallel uploads (overrides `workers` from the config file).
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
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let (config, target) = global.resolve(|config| {
            if let Some(url) = &self.data_url {
                config.data_url = Some(url.clone());
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
            dry_run: self.dry_run,
            refuse_empty_source: self.refuse_empty,
            verify_metadata: config.verify_metadata,
        };
        let report = pipeline::run(&config, &target, Job::Sync(options)).context("sync failed")?;
        let Some(summary) = report.pass.as_ref() else {
            return Ok(ExitCode::SUCCESS);
        };

        if self.json {
            print_json(summary)?;
        } else {
            print_summary(summary);
        }
        Ok(exit_code(summary.is_fully_synced(), self.strict))
    }
}

/// Arguments for `mirror plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Source directory URL (overrides `data_url` from the config file).
    #[arg(long, value_name = "URL")]
    pub data_url: Option<String>,

    /// Emit the planned changes as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        SyncArgs {
            data_url: self.data_url,
            dry_run: true,
            json: self.json,
            ..SyncArgs::default()
        }
        .run(global)
    }
}
