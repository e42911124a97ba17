// ── Emotion mapping file ──
//
// JSON document holding the mapping table plus learned preferences:
//
//   { "mappings": { "<emotion>": { "scene_name": ..., ... } },
//     "user_preferences": { "<emotion>": 0.8 },
//     "scene_performance": { "<scene>": { "user_satisfaction": 0.7, "feedback_count": 3 } },
//     "metadata": { "last_updated": ..., "total_switches": ..., "version": "1.0" } }
//
// Every mapping field is optional on load. `metadata` is written on save and
// ignored on load.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::model::{EmotionMapping, MappingStrategy, ScenePerformance, TriggerCondition};

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingFile {
    #[serde(default)]
    pub mappings: IndexMap<String, MappingEntry>,
    #[serde(default)]
    pub user_preferences: BTreeMap<String, f64>,
    #[serde(default)]
    pub scene_performance: BTreeMap<String, ScenePerformance>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub last_updated: DateTime<Utc>,
    pub total_switches: usize,
    pub version: String,
}

/// One mapping as stored on disk. The emotion is the map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Defaults to "<Emotion> Scene".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_name: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_sustained")]
    pub sustained_duration: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_period: f64,
    #[serde(default)]
    pub trigger_condition: TriggerCondition,
    #[serde(default)]
    pub strategy: MappingStrategy,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_priority() -> u8 {
    5
}
fn default_threshold() -> f64 {
    0.7
}
fn default_sustained() -> f64 {
    2.0
}
fn default_cooldown() -> f64 {
    5.0
}
fn default_weight() -> f64 {
    1.0
}
fn default_enabled() -> bool {
    true
}

impl From<&EmotionMapping> for MappingEntry {
    fn from(m: &EmotionMapping) -> Self {
        Self {
            scene_name: Some(m.scene_name.clone()),
            priority: m.priority,
            confidence_threshold: m.confidence_threshold,
            sustained_duration: m.sustained_duration,
            cooldown_period: m.cooldown_period,
            trigger_condition: m.trigger_condition,
            strategy: m.strategy,
            weight: m.weight,
            enabled: m.enabled,
            metadata: m.metadata.clone(),
        }
    }
}

impl MappingEntry {
    pub fn into_mapping(self, emotion: &str) -> Result<EmotionMapping, CoreError> {
        let mapping = EmotionMapping {
            emotion: emotion.to_owned(),
            scene_name: self
                .scene_name
                .unwrap_or_else(|| format!("{} Scene", title_case(emotion))),
            priority: self.priority,
            confidence_threshold: self.confidence_threshold,
            sustained_duration: self.sustained_duration,
            cooldown_period: self.cooldown_period,
            trigger_condition: self.trigger_condition,
            strategy: self.strategy,
            weight: self.weight,
            enabled: self.enabled,
            metadata: self.metadata,
        };
        validate_mapping(&mapping)?;
        Ok(mapping)
    }
}

/// Reject mappings the engine cannot evaluate meaningfully.
pub fn validate_mapping(m: &EmotionMapping) -> Result<(), CoreError> {
    let invalid = |message: String| CoreError::InvalidMapping {
        emotion: m.emotion.clone(),
        message,
    };

    if m.emotion.is_empty() {
        return Err(invalid("emotion label is empty".into()));
    }
    if !(EmotionMapping::MIN_PRIORITY..=EmotionMapping::MAX_PRIORITY).contains(&m.priority) {
        return Err(invalid(format!(
            "priority {} outside {}..={}",
            m.priority,
            EmotionMapping::MIN_PRIORITY,
            EmotionMapping::MAX_PRIORITY
        )));
    }
    if !(0.0..=1.0).contains(&m.confidence_threshold) {
        return Err(invalid(format!(
            "confidence_threshold {} outside [0, 1]",
            m.confidence_threshold
        )));
    }
    for (field, value) in [
        ("sustained_duration", m.sustained_duration),
        ("cooldown_period", m.cooldown_period),
        ("weight", m.weight),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("{field} must be a non-negative number")));
        }
    }
    Ok(())
}

fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Disk I/O ────────────────────────────────────────────────────────

/// Read and parse a mapping file. `Ok(None)` when the file does not exist.
pub fn read(path: &Path) -> Result<Option<MappingFile>, CoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(config_load(path, e.to_string())),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| config_load(path, e.to_string()))
}

/// Write the file as pretty JSON, creating parent directories.
pub fn write(path: &Path, file: &MappingFile) -> Result<(), CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(file)
        .map_err(|e| CoreError::Internal(format!("cannot encode mapping file: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

pub(crate) fn config_load(path: &Path, message: String) -> CoreError {
    CoreError::ConfigLoad {
        path: path.display().to_string(),
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_fields_take_stock_defaults() {
        let file: MappingFile =
            serde_json::from_str(r#"{"mappings":{"bored":{"priority":3}}}"#).unwrap();
        let mapping = file.mappings["bored"].clone().into_mapping("bored").unwrap();

        let expected = EmotionMapping::new("bored", "Bored Scene").with_priority(3);
        assert_eq!(mapping, expected);
    }

    #[test]
    fn metadata_is_ignored_on_load() {
        let file: MappingFile = serde_json::from_str(
            r#"{"metadata":{"last_updated":"2024-01-01T00:00:00Z","total_switches":4,"version":"1.0"}}"#,
        )
        .unwrap();
        assert_eq!(file.metadata, None);
        assert!(file.mappings.is_empty());
    }

    #[test]
    fn out_of_range_priority_is_rejected() {
        let entry: MappingEntry = serde_json::from_str(r#"{"priority":11}"#).unwrap();
        let err = entry.into_mapping("happy").unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidMapping { ref emotion, .. } if emotion == "happy"),
            "got {err:?}"
        );
    }

    #[test]
    fn title_case_handles_multiword_labels() {
        assert_eq!(title_case("very happy"), "Very Happy");
        assert_eq!(title_case("SAD"), "Sad");
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read(&dir.path().join("absent.json")).unwrap(), None);
    }

    #[test]
    fn unparsable_file_is_config_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigLoad { .. }), "got {err:?}");
    }
}
