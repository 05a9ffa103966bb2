//! Mirror: keep an object store bucket in sync with a published HTTP directory.
//!
//! # Usage
//!
//! ```text
//! mirror sync  [--data-url <URL>] [--dry-run] [--json] [--workers N] [--refuse-empty] [--strict] [--verify-metadata]
//! mirror plan  [--data-url <URL>] [--json]
//! mirror fetch [--api-url <URL>] [--key <KEY>] [--json]
//! mirror run   [--data-url <URL>] [--api-url <URL>] [--key <KEY>] [--strict] [--verify-metadata]
//!
//! global: --config <PATH> --local-dir <DIR> --bucket <NAME> --region <R> --endpoint <URL> -v
//! ```
//!
//! Exit status: 0 when the pass completed (even with per-file failures),
//! 1 when it aborted, 2 when `--strict` is set and some files failed.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    fetch::FetchArgs,
    run::RunArgs,
    sync::{PlanArgs, SyncArgs},
    GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Mirror a published HTTP directory into an object store bucket",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Log at debug level (RUST_LOG takes precedence when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the bucket against the source directory.
    Sync(SyncArgs),

    /// Show what `sync` would change without touching the bucket.
    Plan(PlanArgs),

    /// Fetch the API payload and store it under its key.
    Fetch(FetchArgs),

    /// Sync, then fetch the API payload.
    Run(RunArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Plan(args) => args.run(&cli.global),
        Commands::Fetch(args) => args.run(&cli.global),
        Commands::Run(args) => args.run(&cli.global),
    }
}
