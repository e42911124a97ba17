//! CLI-side config resolution: the scenepilot-config file plus global flag
//! overrides. Core never sees these types; it receives pre-built runtime
//! configs.

use std::path::PathBuf;

use scenepilot_config::{Config, config_path, load_config_from};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file in effect: `--config` or the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config file and apply `--host`, `--port` and `--auth-token`.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = active_path(global);
    let mut cfg = load_config_from(&path)?;
    tracing::debug!(path = %path.display(), "loaded config");

    if let Some(ref host) = global.host {
        cfg.surface.host.clone_from(host);
    }
    if let Some(port) = global.port {
        cfg.surface.port = port;
    }
    if let Some(ref token) = global.auth_token {
        cfg.surface.auth_token = Some(token.clone());
        cfg.surface.auth_token_env = None;
    }
    Ok(cfg)
}
