use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bucket-watcher",
    about = "Watch object-storage buckets and report added, removed, and modified objects",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the watcher configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "BUCKET_WATCHER_CONFIG",
        default_value = "bucket-watcher.toml"
    )]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch every configured target until interrupted
    Watch(WatchArgs),
    /// Run a single cycle for every configured target
    Once(OnceArgs),
    /// Print the stored snapshot of a target
    Snapshot(SnapshotArgs),
    /// Show one object as the watcher sees it
    Stat(StatArgs),
    /// Delete the stored snapshot of a target so the next cycle re-baselines
    Forget(ForgetArgs),
    /// Validate the configuration file
    Check(CheckArgs),
}

#[derive(Args)]
pub struct WatchArgs {
    /// Override the poll interval of every target, in seconds
    #[arg(
        long,
        env = "BUCKET_WATCHER_POLL_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: Option<u64>,
}

#[derive(Args)]
pub struct OnceArgs {
    /// Emit every object as added when no snapshot is stored yet
    #[arg(long)]
    pub emit_initial: bool,
}

#[derive(Args)]
pub struct SnapshotArgs {
    pub bucket: String,
    #[arg(default_value = "")]
    pub prefix: String,
}

#[derive(Args)]
pub struct StatArgs {
    pub bucket: String,
    pub key: String,
}

#[derive(Args)]
pub struct ForgetArgs {
    pub bucket: String,
    #[arg(default_value = "")]
    pub prefix: String,
}

#[derive(Args)]
pub struct CheckArgs {}
