mod cli;
mod display;
mod error;

use std::path::Path;

use clap::Parser;
use cli::{Cli, RunCommand};
use covidnl::config::Config;
use error::{CovidCliError, CovidCliResult};
use log::debug;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> CovidCliResult<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config = read_config(args.config.as_deref())?;
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        // Return ok if pipe is closed instead of error, otherwise return error
        if let Err(err) = command.run(config).await {
            if let CovidCliError::IOError(err) = &err {
                if err.kind() == std::io::ErrorKind::BrokenPipe {
                    return Ok(());
                }
            }
            Err(err)?;
        }
    }
    Ok(())
}

/// Reads `path` when given. Otherwise falls back to the user config file, and to the defaults
/// when there is none.
fn read_config(path: Option<&Path>) -> CovidCliResult<Config> {
    if let Some(path) = path {
        return Ok(toml::from_str(&std::fs::read_to_string(path)?)?);
    }
    // macOS: ~/Library/Application Support/covidnl/config.toml
    let Some(file_path) = dirs::config_dir().map(|dir| dir.join("covidnl").join("config.toml"))
    else {
        return Ok(Config::default());
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}
