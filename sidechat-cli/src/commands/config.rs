use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use shared::config::Config;

/// File formats the configuration can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
}

impl ConfigFormat {
    const fn default_file_name(self) -> &'static str {
        match self {
            Self::Yaml => "sidechat.yaml",
            Self::Json => "sidechat.json",
        }
    }
}

/// Writes the default configuration in the requested format.
///
/// # Arguments
/// * `format` - The format of the configuration file.
/// * `output` - Destination; `sidechat.yaml` or `sidechat.json` in the
///   working directory when omitted.
///
/// # Errors
/// Returns an error if serialisation or writing the file fails.
pub fn generate_config(format: ConfigFormat, output: Option<PathBuf>) -> Result<PathBuf> {
    let config = Config::with_defaults();
    let serialized = render(&config, format)?;

    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write configuration file {}", path.display()))?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(path)
}

fn render(config: &Config, format: ConfigFormat) -> Result<String> {
    Ok(match format {
        ConfigFormat::Yaml => serde_yml::to_string(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    })
}
