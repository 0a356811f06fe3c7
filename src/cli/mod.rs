pub mod args;
pub mod check;
pub mod config;
pub mod run;

pub use args::{CheckCliArgs, Cli, CliCommand, RunCliArgs};
pub use check::handle_check_command;
pub use config::handle_config_command;
pub use run::handle_run_command;
