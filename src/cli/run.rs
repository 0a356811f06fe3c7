use anyhow::{Context, Result};

use crate::cli::args::RunCliArgs;
use crate::config::{Config, RunRequest, RunSettings};
use crate::pipeline::{Pipeline, RunReport};

/// Execute one pipeline run and print its report.
pub async fn handle_run_command(config: &Config, args: RunCliArgs) -> Result<RunReport> {
    let json = args.json;
    let settings = RunSettings::assemble(config, RunRequest::from(args))?;

    let report = Pipeline::from_settings(settings).run().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else {
        println!();
        println!("{}", report.render_text());
    }

    Ok(report)
}
