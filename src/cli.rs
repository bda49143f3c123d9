//! Command-line surface (spec §6): `jobrunner <path-to-job-manifest> [--dry-run]`.
use std::path::PathBuf;

use clap::Parser;

/// Sequential orchestration engine for YAML job and task manifests.
#[derive(Parser, Debug)]
#[command(name = "jobrunner", about = "Run a YAML job manifest", version)]
pub struct Cli {
    /// Path to the job manifest to run.
    pub job: PathBuf,

    /// Load, discover, and bind the job but do not execute any command.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}
