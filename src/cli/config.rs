use anyhow::{Context, Result};

use crate::config::Config;
use crate::global;

pub fn handle_config_command(config: &Config) -> Result<()> {
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;

    println!("{}", rendered.trim_end());
    println!();
    println!("Config file:  {}", global::config_file()?.display());
    println!("Staging root: {}", staging_root(config)?.display());
    Ok(())
}

fn staging_root(config: &Config) -> Result<std::path::PathBuf> {
    match &config.pipeline.download_dir {
        Some(dir) => Ok(dir.clone()),
        None => global::downloads_dir(),
    }
}
