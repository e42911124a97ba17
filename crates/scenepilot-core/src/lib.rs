//! Scene switching policy and emotion-driven decisions on top of
//! `scenepilot-api`.
//!
//! - **[`SceneController`]**: single source of truth for the program scene.
//!   Applies switches through a [`SceneSurface`] under cooldown, minimum
//!   dwell and auto-switch policy, and tracks switch history.
//!
//! - **[`DecisionEngine`]**: synchronous, I/O-free mapping from
//!   [`EmotionContext`] observations to [`MappingResult`] recommendations,
//!   with per-emotion rules, cooldowns and feedback learning. Mapping tables
//!   persist as JSON via [`engine::mapping_file`].
//!
//! - **[`Director`]**: runs the engine on its own task and hands its
//!   recommendations to the controller, so classifier frames from any thread
//!   reach the engine through a channel instead of a lock.
//!
//! - **Domain model** ([`model`]): scenes, transitions, switch records,
//!   emotion contexts and mappings.

pub mod config;
pub mod director;
pub mod engine;
pub mod error;
pub mod model;
pub mod scenes;
pub mod status;
pub mod surface;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{EngineConfig, SceneControllerConfig};
pub use director::{Director, Observation};
pub use engine::{DecisionEngine, MappingStatistics};
pub use error::CoreError;
pub use scenes::{ExternalSceneChange, SceneController, default_scene_overlays};
pub use status::StatusReport;
pub use surface::SceneSurface;

pub use model::{
    EmotionContext, EmotionMapping, MappingResult, MappingStrategy, SceneDescriptor, SceneStats,
    ScenePerformance, SwitchOutcome, SwitchRecord, SwitchType, TransitionConfig, TransitionKind,
    TriggerCondition,
};
