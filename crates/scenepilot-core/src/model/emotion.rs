// ── Emotion observations and mapping rules ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// When a mapping becomes actionable.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TriggerCondition {
    /// Confidence threshold only, intended for fleeting expressions.
    Immediate,
    #[default]
    Confidence,
    /// Confidence threshold plus a continuous run of the same emotion.
    Sustained,
    Combined,
}

/// How raw classifier confidence is adjusted before it is reported.
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
pub enum MappingStrategy {
    #[default]
    #[serde(rename = "direct")]
    #[strum(serialize = "direct")]
    Direct,
    #[serde(rename = "weighted")]
    #[strum(serialize = "weighted")]
    Weighted,
    #[serde(rename = "adaptive")]
    #[strum(serialize = "adaptive")]
    Adaptive,
    #[serde(rename = "context")]
    #[strum(serialize = "context")]
    ContextAware,
}

/// One classifier observation.
///
/// `timestamp` is in seconds on the classifier's clock; the engine uses it as
/// its notion of "now", so any monotonic origin works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionContext {
    pub emotion: String,
    pub confidence: f64,
    pub timestamp: f64,
    #[serde(default = "default_face_count")]
    pub face_count: u32,
    /// Fraction of the frame covered by the primary face.
    #[serde(default)]
    pub face_area: f64,
    #[serde(default = "default_lighting")]
    pub lighting_quality: f64,
    #[serde(default)]
    pub motion_detected: bool,
    #[serde(default)]
    pub previous_emotion: Option<String>,
    /// Filled in by the engine when the context enters its history.
    #[serde(default, alias = "duration")]
    pub sustained_duration: f64,
}

fn default_face_count() -> u32 {
    1
}

fn default_lighting() -> f64 {
    1.0
}

impl EmotionContext {
    pub fn new(emotion: impl Into<String>, confidence: f64, timestamp: f64) -> Self {
        Self {
            emotion: emotion.into(),
            confidence,
            timestamp,
            face_count: default_face_count(),
            face_area: 0.0,
            lighting_quality: default_lighting(),
            motion_detected: false,
            previous_emotion: None,
            sustained_duration: 0.0,
        }
    }
}

/// Per-emotion switching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionMapping {
    pub emotion: String,
    pub scene_name: String,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub confidence_threshold: f64,
    /// Seconds.
    pub sustained_duration: f64,
    /// Seconds.
    pub cooldown_period: f64,
    pub trigger_condition: TriggerCondition,
    pub strategy: MappingStrategy,
    pub weight: f64,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EmotionMapping {
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;

    /// A mapping with the stock defaults for every tunable.
    pub fn new(emotion: impl Into<String>, scene_name: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            scene_name: scene_name.into(),
            priority: 5,
            confidence_threshold: 0.7,
            sustained_duration: 2.0,
            cooldown_period: 5.0,
            trigger_condition: TriggerCondition::Confidence,
            strategy: MappingStrategy::Direct,
            weight: 1.0,
            enabled: true,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_timing(mut self, sustained_duration: f64, cooldown_period: f64) -> Self {
        self.sustained_duration = sustained_duration;
        self.cooldown_period = cooldown_period;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerCondition) -> Self {
        self.trigger_condition = trigger;
        self
    }

    pub fn with_strategy(mut self, strategy: MappingStrategy, weight: f64) -> Self {
        self.strategy = strategy;
        self.weight = weight;
        self
    }
}

/// Outcome of evaluating one observation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub recommended_scene: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub should_switch: bool,
    pub priority: u8,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MappingResult {
    /// A result that recommends nothing.
    pub fn none(reasoning: impl Into<String>) -> Self {
        Self {
            recommended_scene: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            should_switch: false,
            priority: 0,
            metadata: Map::new(),
        }
    }
}

/// Learned satisfaction for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenePerformance {
    #[serde(default = "default_satisfaction")]
    pub user_satisfaction: f64,
    #[serde(default = "default_feedback_count")]
    pub feedback_count: u32,
}

fn default_satisfaction() -> f64 {
    0.5
}

fn default_feedback_count() -> u32 {
    1
}
