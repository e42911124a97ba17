// ── Scene registry and switch bookkeeping types ──

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use scenepilot_api::TransitionSettings;

/// Everything the controller knows about one switchable scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub auto_switch: bool,
    /// Higher wins when several scenes match an emotion.
    #[serde(default)]
    pub priority: i32,
    /// Minimum dwell time on the current scene before an automatic switch here.
    #[serde(default = "default_min_duration", with = "super::duration_secs")]
    pub min_duration: Duration,
    #[serde(default)]
    pub emotion_triggers: Vec<String>,
    #[serde(default)]
    pub custom_settings: Map<String, Value>,
    /// Set when the surface stopped reporting this scene.
    #[serde(default)]
    pub stale: bool,
}

fn default_true() -> bool {
    true
}

fn default_min_duration() -> Duration {
    Duration::from_secs(2)
}

impl SceneDescriptor {
    /// Descriptor for a scene first seen in the surface's scene list.
    pub fn discovered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            auto_switch: true,
            priority: 0,
            min_duration: default_min_duration(),
            emotion_triggers: Vec::new(),
            custom_settings: Map::new(),
            stale: false,
        }
    }

    pub fn with_triggers<I, T>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.emotion_triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn is_triggered_by(&self, emotion: &str) -> bool {
        self.emotion_triggers.iter().any(|e| e == emotion)
    }
}

// ── Transitions ─────────────────────────────────────────────────────

/// Built-in transition types, named as the surface names them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum TransitionKind {
    #[serde(alias = "Cut")]
    Cut,
    #[default]
    #[serde(alias = "Fade")]
    Fade,
    #[serde(alias = "Slide")]
    Slide,
    #[serde(alias = "Stinger")]
    Stinger,
    #[serde(alias = "Swipe")]
    Swipe,
    #[serde(alias = "Luma Wipe")]
    #[strum(to_string = "Luma Wipe", serialize = "luma_wipe")]
    LumaWipe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub kind: TransitionKind,
    #[serde(with = "super::duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            duration: Duration::from_millis(500),
            settings: None,
        }
    }
}

impl TransitionConfig {
    pub fn new(kind: TransitionKind, duration: Duration) -> Self {
        Self {
            kind,
            duration,
            settings: None,
        }
    }

    pub fn to_settings(&self) -> TransitionSettings {
        TransitionSettings {
            name: self.kind.to_string(),
            duration: self.duration,
            settings: self.settings.clone(),
        }
    }
}

// ── Switch history ──────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwitchType {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub timestamp: DateTime<Utc>,
    pub from_scene: Option<String>,
    pub to_scene: String,
    pub emotion: Option<String>,
    pub switch_type: SwitchType,
}

/// Result of a switch request that did not error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Switched { from: Option<String> },
    AlreadyCurrent,
    CoolingDown { remaining: Duration },
    MinDurationPending { remaining: Duration },
    AutoSwitchDisabled,
    NoMatchingScene,
    /// Another non-forced switch is still talking to the surface.
    InFlight,
}

impl SwitchOutcome {
    /// `true` when the surface is (now) showing the requested scene.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Switched { .. } | Self::AlreadyCurrent)
    }

    pub fn performed(&self) -> bool {
        matches!(self, Self::Switched { .. })
    }
}

/// Snapshot returned by `SceneController::get_scene_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SceneStats {
    pub total_switches: u64,
    pub auto_switches: u64,
    pub manual_switches: u64,
    pub failed_switches: u64,
    pub current_scene: Option<String>,
    pub previous_scene: Option<String>,
    pub total_scenes: usize,
    pub auto_switch_enabled: bool,
    pub recent_switches: Vec<SwitchRecord>,
    pub average_scene_duration_secs: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn luma_wipe_uses_surface_name() {
        assert_eq!(TransitionKind::LumaWipe.to_string(), "Luma Wipe");
        assert_eq!(
            TransitionKind::from_str("luma_wipe").unwrap(),
            TransitionKind::LumaWipe
        );
        let parsed: TransitionKind = serde_json::from_value("Luma Wipe".into()).unwrap();
        assert_eq!(parsed, TransitionKind::LumaWipe);
    }

    #[test]
    fn transition_config_serializes_duration_in_ms() {
        let value = serde_json::to_value(TransitionConfig::default()).unwrap();
        assert_eq!(value["kind"], "fade");
        assert_eq!(value["duration"], 500);
    }

    #[test]
    fn descriptor_defaults_match_discovered_scene() {
        let parsed: SceneDescriptor = serde_json::from_str(r#"{"name":"Intro"}"#).unwrap();
        let mut expected = SceneDescriptor::discovered("Intro");
        expected.display_name = String::new();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.min_duration, Duration::from_secs(2));
    }

    #[test]
    fn outcome_success_flags() {
        assert!(SwitchOutcome::AlreadyCurrent.succeeded());
        assert!(!SwitchOutcome::AlreadyCurrent.performed());
        assert!(!SwitchOutcome::InFlight.succeeded());
    }
}
