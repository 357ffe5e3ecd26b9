mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Longest accepted pause between queued refreshes.
const MAX_THROTTLE_MS: u64 = 60_000;

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

    let default_paths = [
        "./curator.toml",
        "~/.config/curator/config.toml",
        "/etc/curator/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.refresh.throttle_ms > MAX_THROTTLE_MS {
        anyhow::bail!(
            "refresh.throttle_ms must be at most {} (got {})",
            MAX_THROTTLE_MS,
            config.refresh.throttle_ms
        );
    }

    let mut seen = HashSet::new();
    for options in &config.metadata.type_options {
        if !seen.insert(options.item_kind) {
            anyhow::bail!(
                "metadata.type_options defines '{}' more than once",
                options.item_kind
            );
        }

        for name in &options.metadata_fetcher_order {
            if options
                .disabled_metadata_fetchers
                .iter()
                .any(|d| d.eq_ignore_ascii_case(name))
            {
                tracing::warn!(
                    "Metadata fetcher '{}' for '{}' is both ordered and disabled",
                    name,
                    options.item_kind
                );
            }
        }
    }

    if config.metadata.preferred_language.trim().is_empty() {
        anyhow::bail!("metadata.preferred_language cannot be empty");
    }

    Ok(())
}
