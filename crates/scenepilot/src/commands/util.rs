//! Shared helpers for command handlers.

use std::io::BufRead;
use std::sync::Arc;

use scenepilot_api::{ControlChannel, TransportClient};
use scenepilot_config::Config;
use scenepilot_core::{DecisionEngine, EmotionContext, SceneController, TransitionKind};

use crate::error::CliError;

// ── Live session ────────────────────────────────────────────────────

/// A connected transport and the control channel on top of it.
pub struct Surface {
    pub transport: TransportClient,
    pub channel: ControlChannel,
}

impl Surface {
    /// Connect using the `[surface]` section.
    pub async fn connect(cfg: &Config) -> Result<Self, CliError> {
        let transport = TransportClient::new(cfg.connection_config()?);
        let channel = ControlChannel::new(transport.clone());
        transport.connect().await?;
        Ok(Self { transport, channel })
    }

    /// A scene controller over this session, already initialized.
    pub async fn controller(
        &self,
        cfg: &Config,
    ) -> Result<Arc<SceneController<ControlChannel>>, CliError> {
        let controller = SceneController::new(self.channel.clone(), cfg.controller_config()?);
        let current = controller.initialize().await?;
        tracing::debug!(scene = %current, "scene controller initialized");
        Ok(Arc::new(controller))
    }

    pub async fn close(self) {
        self.channel.detach();
        self.transport.disconnect().await;
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Engine with the mapping file overlaid; a broken file falls back to the
/// built-in table with a warning.
pub fn open_engine(cfg: &Config) -> Result<DecisionEngine, CliError> {
    Ok(DecisionEngine::with_mapping_file(
        cfg.engine_config()?,
        &cfg.mappings_path(),
    ))
}

/// Engine with the mapping file overlaid; a broken file is an error.
/// Used by commands that write the file back.
pub fn open_engine_strict(cfg: &Config) -> Result<DecisionEngine, CliError> {
    let mut engine = DecisionEngine::new(cfg.engine_config()?);
    engine.load_configuration(&cfg.mappings_path())?;
    Ok(engine)
}

// ── Input parsing ───────────────────────────────────────────────────

/// Parse one JSON-lines observation. Blank lines and `#` comments yield `None`.
pub fn parse_observation(line: &str, line_no: usize) -> Result<Option<EmotionContext>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| CliError::Validation {
            field: format!("observation on line {line_no}"),
            reason: e.to_string(),
        })
}

/// Read every observation from a JSON-lines source.
pub fn read_observations(reader: impl BufRead) -> Result<Vec<EmotionContext>, CliError> {
    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        if let Some(frame) = parse_observation(&line?, i + 1)? {
            frames.push(frame);
        }
    }
    Ok(frames)
}

/// Parse a transition name as the surface spells it.
pub fn parse_transition(name: &str) -> Result<TransitionKind, CliError> {
    name.parse().map_err(|_| CliError::Validation {
        field: "transition".into(),
        reason: format!(
            "unknown transition '{name}', expected Cut, Fade, Slide, Stinger, Swipe or Luma Wipe"
        ),
    })
}
