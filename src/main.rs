use anyhow::Result;
use clap::Parser;
use zoom_drive_sync::{
    cli::{handle_check_command, handle_config_command, handle_run_command, Cli, CliCommand},
    config::Config,
    logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let CliCommand::Version = cli.command {
        println!("zoom-drive-sync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load()?;
    logging::init(cli.verbose, config.logging.event_log);

    match cli.command {
        CliCommand::Run(args) => {
            let report = handle_run_command(&config, args).await?;
            if report.is_aborted() {
                std::process::exit(1);
            }
        }
        CliCommand::Check(args) => handle_check_command(&config, args).await?,
        CliCommand::Config => handle_config_command(&config)?,
        CliCommand::Version => {}
    }

    Ok(())
}
