use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::settings::MAX_LOOKBACK_DAYS;
use crate::config::RunRequest;

#[derive(Parser, Debug)]
#[command(name = "zoom-drive-sync")]
#[command(
    about = "Copy Zoom cloud recordings to a Google Drive remote and announce them on Slack",
    long_about = None
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Download, upload and announce recordings for one meeting
    Run(RunCliArgs),
    /// Verify credentials and the rclone remote without processing recordings
    Check(CheckCliArgs),
    /// Show the effective configuration (secrets redacted)
    Config,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunCliArgs {
    /// Meeting name to search for (case-insensitive substring of the topic)
    #[arg(short, long)]
    pub name: String,
    /// Zoom user email whose recordings are searched
    #[arg(short, long)]
    pub email: String,
    /// How many days back to search (default from config, usually 7)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(..=MAX_LOOKBACK_DAYS as i64))]
    pub days: Option<u32>,
    /// List what would be downloaded without downloading or uploading
    #[arg(long)]
    pub dry_run: bool,
    /// Disable Slack notifications
    #[arg(long)]
    pub no_slack: bool,
    /// Slack webhook URL (overrides config)
    #[arg(long)]
    pub slack_webhook: Option<String>,
    /// rclone remote name (overrides config)
    #[arg(long)]
    pub rclone_remote: Option<String>,
    /// Folder on the remote that receives date folders (overrides config)
    #[arg(long)]
    pub rclone_base_path: Option<String>,
    /// IANA timezone used for dates and file names
    #[arg(long)]
    pub timezone: Option<String>,
    /// Local staging directory
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
    /// Hide download progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CheckCliArgs {
    /// rclone remote name (overrides config)
    #[arg(long)]
    pub rclone_remote: Option<String>,
    /// Skip the Zoom token exchange
    #[arg(long)]
    pub skip_zoom: bool,
}

impl From<RunCliArgs> for RunRequest {
    fn from(args: RunCliArgs) -> Self {
        Self {
            meeting_name: args.name,
            email: args.email,
            lookback_days: args.days,
            dry_run: args.dry_run,
            disable_notifications: args.no_slack,
            slack_webhook: args.slack_webhook,
            rclone_remote: args.rclone_remote,
            rclone_base_path: args.rclone_base_path,
            timezone: args.timezone,
            download_dir: args.download_dir,
            show_progress: !args.no_progress && !args.json,
        }
    }
}
