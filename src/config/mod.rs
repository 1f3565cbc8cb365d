mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./mseforged.toml",
        "./config.toml",
        "~/.config/mseforged/config.toml",
        "/etc/mseforged/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.source.buffer_quota_bytes == 0 {
        anyhow::bail!("source.buffer_quota_bytes cannot be 0");
    }

    if config.source.supported_subtypes.is_empty() {
        anyhow::bail!("source.supported_subtypes cannot be empty");
    }

    for subtype in &config.source.supported_subtypes {
        if subtype.trim().is_empty() || subtype.contains('/') {
            anyhow::bail!("Invalid subtype in source.supported_subtypes: {:?}", subtype);
        }
    }

    if config.feed.chunk_size == 0 {
        anyhow::bail!("feed.chunk_size cannot be 0");
    }

    if !crate::mime::is_type_supported(&config.feed.content_type, &config.source.supported_subtypes)
    {
        tracing::warn!(
            "feed.content_type {:?} is not in source.supported_subtypes",
            config.feed.content_type
        );
    }

    Ok(())
}
