//! Emotion → scene decision engine.
//!
//! [`DecisionEngine`] turns a high-rate stream of [`EmotionContext`]
//! observations into infrequent switch recommendations. It performs no I/O
//! apart from explicit mapping-file loads and saves, and never reads a wall
//! clock: "now" is always the timestamp of the observation being evaluated,
//! so the engine is deterministic under test and tolerant of a classifier
//! clock with any origin.
//!
//! A recommendation has to clear, in order:
//!
//! 1. an enabled mapping for the emotion,
//! 2. the global cooldown and the per-emotion cooldown,
//! 3. the mapping's trigger condition.
//!
//! Anything short of that is an ordinary [`MappingResult`] with
//! `should_switch == false`; only a malformed observation is an error.

mod defaults;
pub mod mapping_file;

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

pub use defaults::default_mappings;
pub use mapping_file::{FileMetadata, MappingEntry, MappingFile};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{
    EmotionContext, EmotionMapping, MappingResult, MappingStrategy, ScenePerformance,
    TriggerCondition,
};

/// Observations inspected by the history consistency factor.
const HISTORY_WINDOW: usize = 5;
const HISTORY_BOOST: f64 = 1.2;
/// Face area treated as "large enough" for full context confidence.
const REFERENCE_FACE_AREA: f64 = 0.1;

/// A switch the engine has been told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSwitch {
    pub from_scene: Option<String>,
    pub to_scene: String,
    pub emotion: Option<String>,
    pub at: f64,
}

// ── Statistics ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingDetail {
    pub scene_name: String,
    pub priority: u8,
    pub enabled: bool,
    pub strategy: MappingStrategy,
    pub trigger_condition: TriggerCondition,
}

/// Read-only snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingStatistics {
    pub total_mappings: usize,
    pub enabled_mappings: usize,
    pub total_switches: usize,
    pub emotion_history_size: usize,
    pub current_scene: Option<String>,
    pub last_global_switch_time: Option<f64>,
    pub last_emotion_switch_times: BTreeMap<String, f64>,
    pub user_preferences: BTreeMap<String, f64>,
    pub scene_performance: BTreeMap<String, ScenePerformance>,
    pub mapping_details: IndexMap<String, MappingDetail>,
}

// ── DecisionEngine ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: EngineConfig,
    mappings: IndexMap<String, EmotionMapping>,
    user_preferences: BTreeMap<String, f64>,
    scene_performance: BTreeMap<String, ScenePerformance>,
    /// Sorted by timestamp, oldest first.
    history: VecDeque<EmotionContext>,
    switches: VecDeque<EngineSwitch>,
    current_scene: Option<String>,
    last_global_switch: Option<f64>,
    last_emotion_switch: BTreeMap<String, f64>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DecisionEngine {
    /// Engine seeded with the built-in mapping table.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            mappings: default_mappings()
                .into_iter()
                .map(|m| (m.emotion.clone(), m))
                .collect(),
            user_preferences: BTreeMap::new(),
            scene_performance: BTreeMap::new(),
            history: VecDeque::new(),
            switches: VecDeque::new(),
            current_scene: None,
            last_global_switch: None,
            last_emotion_switch: BTreeMap::new(),
        }
    }

    /// Engine seeded with the built-in table, overlaid by `path`.
    ///
    /// A missing or unreadable file is logged and the defaults are kept.
    pub fn with_mapping_file(config: EngineConfig, path: &Path) -> Self {
        let mut engine = Self::new(config);
        match engine.load_configuration(path) {
            Ok(true) => {}
            Ok(false) => info!(path = %path.display(), "no mapping file, using defaults"),
            Err(e) => warn!(error = %e, "falling back to default mappings"),
        }
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_scene(&self) -> Option<&str> {
        self.current_scene.as_deref()
    }

    // ── Mapping table ────────────────────────────────────────────────

    pub fn mapping(&self, emotion: &str) -> Option<&EmotionMapping> {
        self.mappings.get(emotion)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &EmotionMapping> {
        self.mappings.values()
    }

    /// Add or replace the mapping for `mapping.emotion`.
    pub fn add_mapping(&mut self, mapping: EmotionMapping) -> Result<(), CoreError> {
        mapping_file::validate_mapping(&mapping)?;
        info!(emotion = %mapping.emotion, scene = %mapping.scene_name, "mapping added");
        self.mappings.insert(mapping.emotion.clone(), mapping);
        Ok(())
    }

    pub fn remove_mapping(&mut self, emotion: &str) -> Option<EmotionMapping> {
        let removed = self.mappings.shift_remove(emotion);
        if removed.is_some() {
            info!(emotion, "mapping removed");
        } else {
            warn!(emotion, "no mapping to remove");
        }
        removed
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Overlay mappings and learned data from a mapping file.
    ///
    /// Returns `Ok(false)` when the file does not exist. The file is parsed
    /// and validated in full before anything is applied.
    pub fn load_configuration(&mut self, path: &Path) -> Result<bool, CoreError> {
        let Some(file) = mapping_file::read(path)? else {
            return Ok(false);
        };

        let mappings = file
            .mappings
            .into_iter()
            .map(|(emotion, entry)| entry.into_mapping(&emotion))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| mapping_file::config_load(path, e.to_string()))?;

        let count = mappings.len();
        for mapping in mappings {
            self.mappings.insert(mapping.emotion.clone(), mapping);
        }
        self.user_preferences = file.user_preferences;
        self.scene_performance = file.scene_performance;

        info!(path = %path.display(), mappings = count, "loaded mapping file");
        Ok(true)
    }

    pub fn to_mapping_file(&self) -> MappingFile {
        MappingFile {
            mappings: self
                .mappings
                .iter()
                .map(|(emotion, m)| (emotion.clone(), MappingEntry::from(m)))
                .collect(),
            user_preferences: self.user_preferences.clone(),
            scene_performance: self.scene_performance.clone(),
            metadata: Some(FileMetadata {
                last_updated: Utc::now(),
                total_switches: self.switches.len(),
                version: mapping_file::FORMAT_VERSION.into(),
            }),
        }
    }

    pub fn save_configuration(&self, path: &Path) -> Result<(), CoreError> {
        mapping_file::write(path, &self.to_mapping_file())?;
        info!(path = %path.display(), "saved mapping file");
        Ok(())
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Append an observation to the history.
    ///
    /// Out-of-order timestamps are placed where they belong. The stored
    /// copy gets its `sustained_duration` filled in.
    pub fn update_emotion_context(&mut self, mut context: EmotionContext) -> Result<(), CoreError> {
        validate_context(&context)?;

        let idx = self
            .history
            .partition_point(|c| c.timestamp <= context.timestamp);
        let run_start = self
            .history
            .range(..idx)
            .rev()
            .take_while(|c| c.emotion == context.emotion)
            .last()
            .map_or(context.timestamp, |c| c.timestamp);
        context.sustained_duration = context.timestamp - run_start;

        self.history.insert(idx, context);
        self.trim_history();
        Ok(())
    }

    /// Record an observation and evaluate it.
    pub fn observe(&mut self, context: EmotionContext) -> Result<MappingResult, CoreError> {
        self.update_emotion_context(context.clone())?;
        self.evaluate_mapping(&context)
    }

    /// Decide whether `context` warrants a switch.
    pub fn evaluate_mapping(&self, context: &EmotionContext) -> Result<MappingResult, CoreError> {
        validate_context(context)?;

        let Some(mapping) = self.mappings.get(&context.emotion) else {
            return Ok(MappingResult::none(format!(
                "No mapping configured for emotion: {}",
                context.emotion
            )));
        };
        if !mapping.enabled {
            return Ok(MappingResult::none(format!(
                "Mapping for {} is disabled",
                context.emotion
            )));
        }

        let now = context.timestamp;
        let base = format!(
            "Emotion '{}' detected with {:.2} confidence",
            context.emotion, context.confidence
        );

        let global_remaining = remaining(self.last_global_switch, self.config.global_cooldown_secs, now);
        let emotion_remaining = remaining(
            self.last_emotion_switch.get(&context.emotion).copied(),
            mapping.cooldown_period,
            now,
        );
        if global_remaining > 0.0 || emotion_remaining > 0.0 {
            let reasoning = if emotion_remaining >= global_remaining {
                format!(
                    "{base}, but cooldown for '{}' is active ({emotion_remaining:.1}s remaining)",
                    context.emotion
                )
            } else {
                format!("{base}, but global cooldown is active ({global_remaining:.1}s remaining)")
            };
            let mut metadata = result_metadata(mapping, context);
            metadata.insert("global_cooldown_remaining".into(), json!(global_remaining));
            metadata.insert("emotion_cooldown_remaining".into(), json!(emotion_remaining));
            debug!(emotion = %context.emotion, global_remaining, emotion_remaining, "cooling down");
            return Ok(MappingResult {
                recommended_scene: Some(mapping.scene_name.clone()),
                confidence: context.confidence,
                reasoning,
                should_switch: false,
                priority: mapping.priority,
                metadata,
            });
        }

        let confidence_ok = context.confidence >= mapping.confidence_threshold;
        let needs_sustain = matches!(
            mapping.trigger_condition,
            TriggerCondition::Sustained | TriggerCondition::Combined
        );
        let sustained = if needs_sustain {
            self.sustained_duration(&context.emotion, now)
        } else {
            0.0
        };
        let sustain_ok = !needs_sustain || sustained >= mapping.sustained_duration;
        let should_switch = confidence_ok && sustain_ok;

        let reasoning = if !confidence_ok {
            format!(
                "{base}, below threshold {:.2}",
                mapping.confidence_threshold
            )
        } else if !sustain_ok {
            format!(
                "{base}, need {:.1}s sustained (current: {sustained:.1}s)",
                mapping.sustained_duration
            )
        } else {
            format!(
                "{base}, recommending '{}' (priority {})",
                mapping.scene_name, mapping.priority
            )
        };

        let mut metadata = result_metadata(mapping, context);
        if needs_sustain {
            metadata.insert("sustained_duration".into(), json!(sustained));
        }

        Ok(MappingResult {
            recommended_scene: Some(mapping.scene_name.clone()),
            confidence: self.strategy_confidence(mapping, context),
            reasoning,
            should_switch,
            priority: mapping.priority,
            metadata,
        })
    }

    // ── Switch bookkeeping ───────────────────────────────────────────

    /// Record a switch at the newest observed timestamp.
    pub fn record_switch(&mut self, from_scene: Option<&str>, to_scene: &str, emotion: Option<&str>) {
        let at = self.history.back().map_or(0.0, |c| c.timestamp);
        self.record_switch_at(from_scene, to_scene, emotion, at);
    }

    /// Record a switch at an explicit observation-clock time.
    pub fn record_switch_at(
        &mut self,
        from_scene: Option<&str>,
        to_scene: &str,
        emotion: Option<&str>,
        at: f64,
    ) {
        self.switches.push_back(EngineSwitch {
            from_scene: from_scene.map(str::to_owned),
            to_scene: to_scene.to_owned(),
            emotion: emotion.map(str::to_owned),
            at,
        });
        while self.switches.len() > self.config.history_size.max(1) {
            self.switches.pop_front();
        }

        self.current_scene = Some(to_scene.to_owned());
        self.last_global_switch = Some(at);
        if let Some(emotion) = emotion {
            self.last_emotion_switch.insert(emotion.to_owned(), at);
        }
        info!(
            from = from_scene.unwrap_or("-"),
            to = to_scene,
            emotion = emotion.unwrap_or("-"),
            at,
            "recorded switch"
        );
    }

    pub fn switch_history(&self) -> impl Iterator<Item = &EngineSwitch> {
        self.switches.iter()
    }

    // ── Learning ─────────────────────────────────────────────────────

    /// Fold a satisfaction score in `[0, 1]` into the learned state.
    pub fn learn_from_feedback(
        &mut self,
        emotion: &str,
        scene: &str,
        satisfaction: f64,
    ) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&satisfaction) {
            return Err(CoreError::InvalidFeedback {
                message: format!("satisfaction {satisfaction} outside [0, 1]"),
            });
        }

        let rate = self.config.learning_rate;
        self.user_preferences
            .entry(emotion.to_owned())
            .and_modify(|p| *p += rate * (satisfaction - *p))
            .or_insert(satisfaction);

        self.scene_performance
            .entry(scene.to_owned())
            .and_modify(|perf| {
                let count = f64::from(perf.feedback_count);
                perf.user_satisfaction = (perf.user_satisfaction * count + satisfaction) / (count + 1.0);
                perf.feedback_count += 1;
            })
            .or_insert(ScenePerformance {
                user_satisfaction: satisfaction,
                feedback_count: 1,
            });

        info!(emotion, scene, satisfaction, "learned from feedback");
        Ok(())
    }

    pub fn user_preference(&self, emotion: &str) -> Option<f64> {
        self.user_preferences.get(emotion).copied()
    }

    pub fn scene_performance(&self, scene: &str) -> Option<ScenePerformance> {
        self.scene_performance.get(scene).copied()
    }

    /// Forget learned data, history and switch timers. Mappings stay.
    pub fn reset_learning_data(&mut self) {
        self.user_preferences.clear();
        self.scene_performance.clear();
        self.history.clear();
        self.switches.clear();
        self.last_global_switch = None;
        self.last_emotion_switch.clear();
        self.current_scene = None;
        info!("reset learning data");
    }

    pub fn get_mapping_statistics(&self) -> MappingStatistics {
        MappingStatistics {
            total_mappings: self.mappings.len(),
            enabled_mappings: self.mappings.values().filter(|m| m.enabled).count(),
            total_switches: self.switches.len(),
            emotion_history_size: self.history.len(),
            current_scene: self.current_scene.clone(),
            last_global_switch_time: self.last_global_switch,
            last_emotion_switch_times: self.last_emotion_switch.clone(),
            user_preferences: self.user_preferences.clone(),
            scene_performance: self.scene_performance.clone(),
            mapping_details: self
                .mappings
                .iter()
                .map(|(emotion, m)| {
                    (
                        emotion.clone(),
                        MappingDetail {
                            scene_name: m.scene_name.clone(),
                            priority: m.priority,
                            enabled: m.enabled,
                            strategy: m.strategy,
                            trigger_condition: m.trigger_condition,
                        },
                    )
                })
                .collect(),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn trim_history(&mut self) {
        while self.history.len() > self.config.history_size.max(1) {
            self.history.pop_front();
        }
    }

    /// How long `emotion` has been the latest observation as of `now`.
    fn sustained_duration(&self, emotion: &str, now: f64) -> f64 {
        let end = self.history.partition_point(|c| c.timestamp <= now);
        let start = self
            .history
            .range(..end)
            .rev()
            .take_while(|c| c.emotion == emotion)
            .last()
            .map(|c| c.timestamp);
        start.map_or(0.0, |start| now - start)
    }

    fn strategy_confidence(&self, mapping: &EmotionMapping, context: &EmotionContext) -> f64 {
        let raw = context.confidence;
        let adjusted = match mapping.strategy {
            MappingStrategy::Direct => raw,
            MappingStrategy::Weighted => raw * mapping.weight * context_factor(context),
            MappingStrategy::Adaptive => {
                let preference = self.user_preference(&context.emotion).unwrap_or(1.0);
                let performance = self
                    .scene_performance(&mapping.scene_name)
                    .map_or(1.0, |p| p.user_satisfaction);
                raw * preference * performance
            }
            MappingStrategy::ContextAware => {
                raw * context_factor(context) * self.history_factor(&context.emotion)
            }
        };
        adjusted.min(1.0)
    }

    fn history_factor(&self, emotion: &str) -> f64 {
        if self.history.len() < 2 {
            return 1.0;
        }
        let repeats = self
            .history
            .iter()
            .rev()
            .take(HISTORY_WINDOW)
            .filter(|c| c.emotion == emotion)
            .count();
        if repeats >= 2 { HISTORY_BOOST } else { 1.0 }
    }
}

fn result_metadata(mapping: &EmotionMapping, context: &EmotionContext) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("emotion".into(), json!(context.emotion));
    metadata.insert("mapping_strategy".into(), json!(mapping.strategy.to_string()));
    metadata.insert(
        "trigger_condition".into(),
        json!(mapping.trigger_condition.to_string()),
    );
    metadata.insert("context_timestamp".into(), json!(context.timestamp));
    metadata
}

/// Signal-quality multiplier from face size, lighting and face count.
fn context_factor(context: &EmotionContext) -> f64 {
    let mut factor = 1.0;
    if context.face_area > 0.0 {
        let area = (context.face_area / REFERENCE_FACE_AREA).min(1.0);
        factor *= 0.8 + 0.2 * area;
    }
    factor *= 0.7 + 0.3 * context.lighting_quality;
    if context.face_count > 1 {
        factor *= 0.8 / f64::from(context.face_count);
    }
    factor
}

/// Seconds left on a cooldown of `period` started at `since`, or zero.
fn remaining(since: Option<f64>, period: f64, now: f64) -> f64 {
    since.map_or(0.0, |since| (period - (now - since)).max(0.0))
}

fn validate_context(context: &EmotionContext) -> Result<(), CoreError> {
    let invalid = |message: String| Err(CoreError::InvalidContext { message });

    if context.emotion.is_empty() {
        return invalid("emotion label is empty".into());
    }
    if !(0.0..=1.0).contains(&context.confidence) {
        return invalid(format!("confidence {} outside [0, 1]", context.confidence));
    }
    if !context.timestamp.is_finite() {
        return invalid(format!("timestamp {} is not finite", context.timestamp));
    }
    Ok(())
}
