//! `mirror fetch`: store the API payload under its key.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use mirror_sync::pipeline::{self, Job};

use super::{print_json, print_payload, GlobalArgs};

/// Arguments for `mirror fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// API endpoint (overrides `api_url` from the config file).
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Bucket key for the payload (overrides `payload_key`).
    #[arg(long)]
    pub key: Option<String>,

    /// Emit the result as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl FetchArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let (config, target) = global.resolve(|config| {
            if let Some(url) = &self.api_url {
                config.api_url = Some(url.clone());
            }
            if let Some(key) = &self.key {
                config.payload_key = Some(key.clone());
            }
        })?;

        let report = pipeline::run(&config, &target, Job::Fetch).context("payload fetch failed")?;
        if let Some(payload) = report.payload.as_ref() {
            if self.json {
                print_json(payload)?;
            } else {
                print_payload(payload);
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}
