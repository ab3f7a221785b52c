use std::path::Path;

use crate::config::ConfigLoader;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (files and environment merged)
    Show,
    /// Print where configuration files are read from
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config() -> Result<()> {
    let config = ConfigLoader::load()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn show_paths() -> Result<()> {
    match ConfigLoader::user_config_path() {
        Some(path) => println!("User config:    {}", describe(&path)),
        None => println!("User config:    (no home directory)"),
    }
    println!(
        "Project config: {}",
        describe(&ConfigLoader::project_config_path())
    );
    Ok(())
}

fn describe(path: &Path) -> String {
    let status = if path.exists() { "found" } else { "not found" };
    format!("{} ({})", path.display(), status)
}
