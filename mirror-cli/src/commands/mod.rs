pub mod fetch;
pub mod run;
pub mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::MirrorConfig;
use mirror_sync::{DeleteOutcome, EntryOutcome, PassSummary, PayloadOutcome, StoreTarget};

/// Exit status for a completed pass that left some keys unsynced under `--strict`.
pub const EXIT_DEGRADED: u8 = 2;

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: <config dir>/bucket-mirror/config.yaml, if present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use a local directory as the bucket instead of S3.
    #[arg(long, global = true, value_name = "DIR")]
    pub local_dir: Option<PathBuf>,

    /// Destination bucket. BUCKET_NAME overrides this when set.
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    #[arg(long, global = true)]
    pub region: Option<String>,

    /// S3-compatible endpoint (MinIO, LocalStack); enables path-style addressing.
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,
}

impl GlobalArgs {
    /// Resolve the effective configuration: defaults, then the config file,
    /// then flags (`overrides` carries the subcommand's own), then the
    /// environment.
    pub fn resolve(
        &self,
        overrides: impl FnOnce(&mut MirrorConfig),
    ) -> Result<(MirrorConfig, StoreTarget)> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::load_at(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => MirrorConfig::load_at(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => MirrorConfig::default(),
            },
        };

        if let Some(bucket) = &self.bucket {
            config.bucket = Some(bucket.clone());
        }
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        overrides(&mut config);
        config.apply_env();
        config.validate().context("invalid configuration")?;
        tracing::debug!(
            bucket = ?config.bucket,
            region = config.region(),
            local_dir = ?self.local_dir,
            "configuration resolved"
        );

        let target = match &self.local_dir {
            Some(dir) => StoreTarget::LocalDir(dir.clone()),
            None => StoreTarget::S3,
        };
        Ok((config, target))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bucket-mirror").join("config.yaml"))
}

/// `--strict` turns a degraded pass into a distinct exit status.
pub fn exit_code(fully_synced: bool, strict: bool) -> ExitCode {
    if strict && !fully_synced {
        ExitCode::from(EXIT_DEGRADED)
    } else {
        ExitCode::SUCCESS
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

pub fn print_summary(summary: &PassSummary) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    let counts = summary.counts();

    let touched = counts.deleted + counts.created + counts.updated + counts.failed;
    if touched == 0 {
        println!(
            "{prefix}{} '{}' already mirrors {} ({} unchanged)",
            "✓".green(),
            summary.container,
            summary.source,
            counts.unchanged
        );
        return;
    }

    let mark = if counts.failed == 0 {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!(
        "{prefix}{mark} '{}' synced from {} ({} created, {} updated, {} deleted, {} unchanged, {} failed)",
        summary.container,
        summary.source,
        counts.created,
        counts.updated,
        counts.deleted,
        counts.unchanged,
        counts.failed
    );

    for deletion in &summary.deletions {
        match deletion {
            DeleteOutcome::Deleted { key } => println!("  {}  {key}", "-".red()),
            DeleteOutcome::WouldDelete { key } => println!("  ~  {key} (delete)"),
            DeleteOutcome::Failed { key, error } => {
                println!("  {}  {key}: {error}", "✗".red())
            }
        }
    }
    for entry in &summary.entries {
        match entry {
            EntryOutcome::Created { key, .. } => println!("  {}  {key}", "+".green()),
            EntryOutcome::Updated { key, .. } => println!("  ✎  {key}"),
            EntryOutcome::WouldCreate { key, .. } => println!("  ~  {key} (create)"),
            EntryOutcome::WouldUpdate { key, .. } => println!("  ~  {key} (update)"),
            EntryOutcome::Unchanged { key } => println!("  ·  {key}"),
            EntryOutcome::Failed { key, error, .. } => {
                println!("  {}  {key}: {error}", "✗".red())
            }
        }
    }
}

pub fn print_payload(payload: &PayloadOutcome) {
    println!(
        "{} stored payload as '{}' ({} bytes, md5 {})",
        "✓".green(),
        payload.key,
        payload.bytes,
        payload.fingerprint
    );
}
