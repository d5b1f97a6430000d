use anyhow::Context;
use std::path::{Path, PathBuf};
use wagerduel_core::ServerConfig;

/// `<config_dir>/wagerduel/server.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wagerduel")
        .join("server.json")
}

/// Load the explicit config file, else the default one if present, else defaults.
pub fn load_server_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let path = default_config_path();
            if path.exists() {
                tracing::debug!("Using config file {}", path.display());
                ServerConfig::load(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))
            } else {
                Ok(ServerConfig::default())
            }
        }
    }
}
