use std::{io, panic, path::PathBuf, process};

use clap::{CommandFactory, Parser};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    commands::{defaults::defaults_handler, run::run_handler, Commands, FfmiddlemanCli},
    logging::init_logging,
};

mod commands;
mod display;
mod logging;
mod operator;

pub const DEFAULT_CONFIG_PATH: &str = "./ffmiddleman.json";
pub const DEFAULT_LOG_PATH: &str = "./logs/ffmiddleman.log";

fn main() -> anyhow::Result<()> {
    let orig_hook = panic::take_hook();
    // Catch panics in child threads
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));
    run()
}

fn run() -> anyhow::Result<()> {
    let cli = FfmiddlemanCli::parse();
    let cwd = std::env::current_dir()?;

    if let Commands::Completions {
        shell,
    } = cli.command
    {
        clap_complete::generate(
            shell,
            &mut FfmiddlemanCli::command(),
            "ffmiddleman",
            &mut io::stdout(),
        );
        return Ok(());
    }

    let config_path = path_abs::PathAbs::new(
        cli.config_file.unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_PATH)),
    )?
    .as_path()
    .to_path_buf();
    let logs = cli.logs.unwrap_or_else(|| cwd.join(DEFAULT_LOG_PATH));
    init_logging(LevelFilter::INFO, &logs, LevelFilter::DEBUG)?;

    match cli.command {
        Commands::Run(args) => run_handler(&config_path, *args)?,
        Commands::Defaults {
            subcommand,
        } => defaults_handler(&config_path, subcommand)?,
        Commands::Completions {
            ..
        } => (),
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum FfmiddlemanCliError {
    #[error("Input file does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("{failed} of {total} job(s) failed")]
    JobsFailed { failed: usize, total: usize },
    #[error("Batch stopped before all jobs ran")]
    Interrupted,
}
