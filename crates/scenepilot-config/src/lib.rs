//! On-disk configuration for the scenepilot binary.
//!
//! A single TOML file with `[surface]`, `[switching]`, `[engine]` and
//! `[scenes.<name>]` sections, layered with figment (built-in defaults,
//! then the file, then `SCENEPILOT_` environment variables) and translated
//! into the runtime configs of `scenepilot-api` and `scenepilot-core`.
//! Those crates never see the types defined here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scenepilot_api::ConnectionConfig;
use scenepilot_core::{
    EngineConfig, SceneControllerConfig, SceneDescriptor, TransitionConfig, TransitionKind,
    default_scene_overlays,
};

/// Prefix for environment overrides, e.g. `SCENEPILOT_SURFACE__PORT=4456`.
pub const ENV_PREFIX: &str = "SCENEPILOT_";

const MAPPINGS_FILE_NAME: &str = "emotion_mappings.json";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub surface: SurfaceSection,

    #[serde(default)]
    pub switching: SwitchingSection,

    #[serde(default)]
    pub engine: EngineSection,

    /// Local scene descriptors keyed by scene name. Entries replace the
    /// built-in overlay of the same name.
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneOverlay>,
}

/// Where the control surface listens and how hard to try reaching it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SurfaceSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Plaintext token. Prefer `auth_token_env`.
    pub auth_token: Option<String>,

    /// Environment variable holding the token.
    pub auth_token_env: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Zero disables the heartbeat.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_base_delay_secs: f64,

    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: f64,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
            auth_token_env: None,
            connect_timeout_secs: default_connect_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            response_timeout_secs: default_response_timeout(),
            max_reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_delay_secs: default_reconnect_delay(),
            reconnect_backoff: default_reconnect_backoff(),
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    4455
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_heartbeat_timeout() -> u64 {
    3
}
fn default_response_timeout() -> u64 {
    5
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay() -> f64 {
    2.0
}
fn default_reconnect_backoff() -> f64 {
    1.5
}

/// Scene controller policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SwitchingSection {
    #[serde(default = "default_switch_cooldown")]
    pub switch_cooldown_secs: f64,

    #[serde(default = "default_true")]
    pub auto_switch: bool,

    /// Transition name as the surface spells it ("Fade", "Luma Wipe", ...).
    #[serde(default = "default_transition")]
    pub transition: String,

    #[serde(default = "default_transition_duration")]
    pub transition_duration_ms: u64,

    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for SwitchingSection {
    fn default() -> Self {
        Self {
            switch_cooldown_secs: default_switch_cooldown(),
            auto_switch: true,
            transition: default_transition(),
            transition_duration_ms: default_transition_duration(),
            history_size: default_history_size(),
        }
    }
}

fn default_switch_cooldown() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_transition() -> String {
    TransitionKind::Fade.to_string()
}
fn default_transition_duration() -> u64 {
    500
}
fn default_history_size() -> usize {
    100
}

/// Decision engine tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_global_cooldown")]
    pub global_cooldown_secs: f64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// JSON emotion-mapping file. Defaults to the platform data directory.
    pub mappings_file: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            global_cooldown_secs: default_global_cooldown(),
            learning_rate: default_learning_rate(),
            history_size: default_history_size(),
            mappings_file: None,
        }
    }
}

fn default_global_cooldown() -> f64 {
    1.0
}
fn default_learning_rate() -> f64 {
    0.1
}

/// A locally configured scene, merged in when the surface reports it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SceneOverlay {
    pub display_name: Option<String>,

    pub description: Option<String>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_min_duration")]
    pub min_duration_secs: f64,

    #[serde(default = "default_true")]
    pub auto_switch: bool,

    #[serde(default)]
    pub emotion_triggers: Vec<String>,
}

fn default_min_duration() -> f64 {
    2.0
}

impl SceneOverlay {
    fn to_descriptor(&self, name: &str) -> Result<SceneDescriptor, ConfigError> {
        let mut descriptor = SceneDescriptor::discovered(name)
            .with_triggers(self.emotion_triggers.iter().map(String::as_str))
            .with_priority(self.priority)
            .with_min_duration(secs(
                &format!("scenes.{name}.min_duration_secs"),
                self.min_duration_secs,
            )?);
        if let Some(ref display_name) = self.display_name {
            descriptor.display_name.clone_from(display_name);
        }
        if let Some(ref description) = self.description {
            descriptor.description.clone_from(description);
        }
        descriptor.auto_switch = self.auto_switch;
        Ok(descriptor)
    }
}

fn secs(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| invalid(field, e.to_string()))
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "scenepilot", "scenepilot")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the emotion-mapping file.
pub fn default_mappings_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join(MAPPINGS_FILE_NAME),
        |dirs| dirs.data_dir().join(MAPPINGS_FILE_NAME),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("scenepilot");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider chain: defaults, the TOML file at `path`, then env.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the config at `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load the config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Reject values the runtime configs cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection_config()?;
        self.controller_config()?;
        self.engine_config()?;
        Ok(())
    }

    /// Resolve the auth token: the named env var wins over the plaintext value.
    pub fn auth_token(&self) -> Option<SecretString> {
        if let Some(ref env_name) = self.surface.auth_token_env {
            if let Ok(val) = std::env::var(env_name) {
                return Some(SecretString::from(val));
            }
        }
        self.surface.auth_token.clone().map(SecretString::from)
    }

    /// Build the transport's `ConnectionConfig`.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let s = &self.surface;
        if s.host.trim().is_empty() {
            return Err(invalid("surface.host", "must not be empty"));
        }
        if s.port == 0 {
            return Err(invalid("surface.port", "must be between 1 and 65535"));
        }
        if !s.reconnect_backoff.is_finite() || s.reconnect_backoff < 1.0 {
            return Err(invalid(
                "surface.reconnect_backoff",
                format!("expected a factor >= 1.0, got {}", s.reconnect_backoff),
            ));
        }

        let config = ConnectionConfig {
            host: s.host.clone(),
            port: s.port,
            auth_token: self.auth_token(),
            connect_timeout: Duration::from_secs(s.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(s.heartbeat_timeout_secs),
            response_timeout: Duration::from_secs(s.response_timeout_secs),
            max_reconnect_attempts: s.max_reconnect_attempts,
            reconnect_base_delay: secs(
                "surface.reconnect_base_delay_secs",
                s.reconnect_base_delay_secs,
            )?,
            reconnect_backoff: s.reconnect_backoff,
            ..ConnectionConfig::default()
        };
        config
            .url()
            .map_err(|e| invalid("surface.host", e.to_string()))?;
        Ok(config)
    }

    /// Build the `SceneControllerConfig`, merging `[scenes]` over the
    /// built-in overlays.
    pub fn controller_config(&self) -> Result<SceneControllerConfig, ConfigError> {
        let sw = &self.switching;
        let kind: TransitionKind = sw.transition.parse().map_err(|_| {
            invalid(
                "switching.transition",
                format!(
                    "unknown transition '{}', expected Cut, Fade, Slide, Stinger, Swipe or Luma Wipe",
                    sw.transition
                ),
            )
        })?;
        if sw.history_size == 0 {
            return Err(invalid("switching.history_size", "must be at least 1"));
        }

        let mut overlays = default_scene_overlays();
        for (name, overlay) in &self.scenes {
            let descriptor = overlay.to_descriptor(name)?;
            match overlays.iter_mut().find(|d| d.name == *name) {
                Some(existing) => *existing = descriptor,
                None => overlays.push(descriptor),
            }
        }

        Ok(SceneControllerConfig {
            switch_cooldown: secs("switching.switch_cooldown_secs", sw.switch_cooldown_secs)?,
            auto_switch: sw.auto_switch,
            transition: TransitionConfig::new(
                kind,
                Duration::from_millis(sw.transition_duration_ms),
            ),
            history_size: sw.history_size,
            scene_overlays: overlays,
        })
    }

    /// Build the `EngineConfig`.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let e = &self.engine;
        if !e.global_cooldown_secs.is_finite() || e.global_cooldown_secs < 0.0 {
            return Err(invalid(
                "engine.global_cooldown_secs",
                "must be a non-negative number of seconds",
            ));
        }
        if e.learning_rate.is_nan() || e.learning_rate <= 0.0 || e.learning_rate > 1.0 {
            return Err(invalid(
                "engine.learning_rate",
                format!("expected a value in (0, 1], got {}", e.learning_rate),
            ));
        }
        if e.history_size == 0 {
            return Err(invalid("engine.history_size", "must be at least 1"));
        }
        Ok(EngineConfig {
            global_cooldown_secs: e.global_cooldown_secs,
            learning_rate: e.learning_rate,
            history_size: e.history_size,
        })
    }

    /// Where the emotion-mapping file lives.
    pub fn mappings_path(&self) -> PathBuf {
        self.engine
            .mappings_file
            .clone()
            .unwrap_or_else(default_mappings_path)
    }
}
