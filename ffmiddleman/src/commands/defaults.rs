use std::{
    io::{self, Write},
    path::Path,
};

use anyhow::Result;
use clap::Subcommand;
use ffmiddleman_core::FieldDefaults;
use tracing::info;

#[derive(Subcommand)]
pub enum DefaultsSubcommand {
    /// Print the saved field defaults as JSON
    Show,
    /// Forget the saved field defaults
    Clear,
}

#[tracing::instrument(skip_all)]
pub fn defaults_handler(config_path: &Path, subcommand: DefaultsSubcommand) -> Result<()> {
    match subcommand {
        DefaultsSubcommand::Show => {
            let defaults = FieldDefaults::load(config_path)?.unwrap_or_default();
            let mut stdout = io::stdout().lock();
            stdout.write_all(&defaults.to_json()?)?;
            writeln!(stdout)?;
        },
        DefaultsSubcommand::Clear => {
            if FieldDefaults::clear(config_path)? {
                info!("Removed {}", config_path.display());
            } else {
                info!("No field defaults saved at {}", config_path.display());
            }
        },
    }

    Ok(())
}
