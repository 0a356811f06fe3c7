use anyhow::{bail, Result};
use std::time::Duration;

use crate::auth::{TokenManager, TokenSource};
use crate::cli::args::CheckCliArgs;
use crate::config::Config;
use crate::transfer::{RcloneTransfer, TransferTool};

/// Report each precondition of a live run, failing if any is unmet.
pub async fn handle_check_command(config: &Config, args: CheckCliArgs) -> Result<()> {
    let mut rclone_config = config.rclone.clone();
    if let Some(remote) = args.rclone_remote {
        rclone_config.remote = remote;
    }

    println!();
    println!("Environment Check");
    println!("=================");
    println!();

    let mut failures = 0;

    if args.skip_zoom {
        println!("  Zoom credentials:  skipped");
    } else {
        let tokens = TokenManager::new(
            &config.zoom,
            Duration::from_secs(config.pipeline.token_refresh_margin_secs),
        );
        match tokens.get_token().await {
            Ok(credential) => println!(
                "  Zoom credentials:  ok (token valid until {})",
                credential.expires_at
            ),
            Err(err) => {
                failures += 1;
                println!("  Zoom credentials:  FAILED - {}", err);
            }
        }
    }

    let rclone = RcloneTransfer::new(&rclone_config);
    match rclone.check_environment().await {
        Ok(()) => println!(
            "  rclone remote:     ok ({})",
            rclone.destination("<date>")
        ),
        Err(err) => {
            failures += 1;
            println!("  rclone remote:     FAILED - {}", err);
        }
    }

    let slack = match (&config.slack.webhook_url, config.slack.enabled) {
        (_, false) => "disabled",
        (Some(url), true) if !url.trim().is_empty() => "configured",
        _ => "not configured (notifications will be skipped)",
    };
    println!("  Slack webhook:     {}", slack);
    println!();

    if failures > 0 {
        bail!("{} check(s) failed", failures);
    }
    println!("All checks passed.");
    Ok(())
}
