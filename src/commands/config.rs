//! Config subcommands handler

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};

use memlog::Config;

use super::load_config;

fn target_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path().context("Failed to locate config file"),
    }
}

/// Show the effective configuration as TOML.
#[cfg(not(tarpaulin_include))]
pub fn handle_show(path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(path)?;
    print!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}

/// Write the default configuration unless a file already exists.
#[cfg(not(tarpaulin_include))]
pub fn handle_init(path: Option<&Path>, force: bool) -> Result<ExitCode> {
    let path = target_path(path)?;
    if path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    Config::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(ExitCode::SUCCESS)
}
