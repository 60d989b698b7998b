//! Config command - show or write the configuration file.

use fsbridge_core::Config;
use std::path::PathBuf;

/// Run the config command.
///
/// Writes to `path` when one was given on the command line, otherwise to the
/// default location.
pub fn run(config: Config, path: Option<PathBuf>, write: bool) -> anyhow::Result<()> {
    if !write {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    config.save_to(&path)?;
    println!("Configuration written to {}", path.display());

    Ok(())
}
