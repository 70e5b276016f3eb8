mod assistant;
mod cli;
mod clock;
mod commands;
mod config;
mod dates;
mod dispatch;
mod intent;
mod logging;
mod model;
mod protocol;
mod storage;
mod store;
mod ui;
mod views;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let mut config = config::Config::load();
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    let _logger = match logging::init(&config.log_level, &config.data_dir()?) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::Task { command } => commands::task(&config, command),
        cli::Command::Event { command } => commands::event(&config, command),
        cli::Command::Chat { message } => commands::chat(&config, message),
        cli::Command::Tui => commands::tui(&config),
    }
}
