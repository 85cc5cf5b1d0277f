mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = ["./hlscast.toml", "~/.config/hlscast/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    let session = &mut config.session;
    for dir in [
        &mut session.work_root,
        &mut session.log_dir,
        &mut session.failure_log_dir,
    ]
    .into_iter()
    .flatten()
    {
        let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
        *dir = expanded.into();
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.host.trim().is_empty() {
        anyhow::bail!("Server host cannot be empty");
    }
    if config.server.bind_attempts == 0 {
        anyhow::bail!("server.bind_attempts must be at least 1");
    }

    if config.encoder.segment_duration_secs == 0 {
        anyhow::bail!("encoder.segment_duration_secs must be at least 1");
    }
    if config.encoder.window_size == 0 {
        anyhow::bail!("encoder.window_size must be at least 1");
    }
    if config.encoder.manifest_name.is_empty() || config.encoder.segment_prefix.is_empty() {
        anyhow::bail!("encoder.manifest_name and encoder.segment_prefix cannot be empty");
    }

    if config.session.encoder_attempts == 0 {
        anyhow::bail!("session.encoder_attempts must be at least 1");
    }
    if config.session.poll_interval_ms == 0 || config.session.retention_interval_ms == 0 {
        anyhow::bail!("session poll and retention intervals must be positive");
    }
    if config.session.startup_timeout_secs == 0 {
        anyhow::bail!("session.startup_timeout_secs must be at least 1");
    }
    if config.session.log_lines == 0 {
        anyhow::bail!("session.log_lines must be at least 1");
    }

    if config.hardware.backends.is_empty() {
        tracing::debug!("No encoder backends configured, using software encoding");
    }

    Ok(())
}
