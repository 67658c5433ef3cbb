//! CLI configuration persisted at `~/.docpress/config.toml`.
//!
//! Flags and environment variables always win; the file only supplies
//! defaults for the server URL and API key.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// One of: api-url, api-key
        key: String,
        /// Value to store
        value: String,
    },

    /// Print a single configuration value
    Get {
        /// One of: api-url, api-key
        key: String,
    },

    /// Show the stored configuration
    Show,

    /// Delete the configuration file
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// On-disk CLI settings.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl CliConfig {
    fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Home directory could not be determined")?;
        Ok(home.join(".docpress").join("config.toml"))
    }

    /// Read the config file; missing or unparseable files yield defaults.
    fn read() -> Self {
        Self::path()
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|text| toml::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn persist(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn get(&self, key: &str) -> Result<Option<&str>> {
        match key {
            "api-url" => Ok(self.api_url.as_deref()),
            "api-key" => Ok(self.api_key.as_deref()),
            other => bail!("Unknown configuration key '{}' (expected api-url or api-key)", other),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        match key {
            "api-url" => self.api_url = Some(value),
            "api-key" => self.api_key = Some(value),
            other => bail!("Unknown configuration key '{}' (expected api-url or api-key)", other),
        }
        Ok(())
    }
}

/// Server URL from the config file, if stored.
pub fn load_api_url() -> Option<String> {
    CliConfig::read().api_url
}

/// API key from the config file, if stored.
pub fn load_api_key() -> Option<String> {
    CliConfig::read().api_key
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = CliConfig::read();
            cfg.set(&key, value.clone())?;
            cfg.persist()?;

            match format {
                OutputFormat::Table => output::success(&format!("{} stored", key)),
                other => output::structured(&serde_json::json!({ "key": key, "value": value }), other),
            }
        }

        ConfigCommands::Get { key } => match CliConfig::read().get(&key)? {
            Some(value) => match format {
                OutputFormat::Table => println!("{}", value),
                other => {
                    output::structured(&serde_json::json!({ "key": key, "value": value }), other)
                }
            },
            None => bail!("'{}' is not set", key),
        },

        ConfigCommands::Show => {
            let cfg = CliConfig::read();
            match format {
                OutputFormat::Table => {
                    output::heading("CLI Configuration");
                    output::field("api-url", cfg.api_url.as_deref().unwrap_or("(unset)"));
                    // Never echo the key itself.
                    let key_state = if cfg.api_key.is_some() { "(set)" } else { "(unset)" };
                    output::field("api-key", key_state);
                }
                other => output::structured(&cfg, other),
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::info("Pass --force to delete the CLI configuration file.");
                return Ok(());
            }

            let path = CliConfig::path()?;
            match std::fs::remove_file(&path) {
                Ok(()) => output::success("Configuration cleared"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    output::info("No configuration file to remove.");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
    }

    Ok(())
}
