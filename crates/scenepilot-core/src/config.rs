// ── Runtime configuration ──
//
// Tuning for the scene controller and the decision engine. Built by the
// CLI (usually from a scenepilot-config profile) and handed in; these types
// never touch disk.

use std::time::Duration;

use crate::model::{SceneDescriptor, TransitionConfig};
use crate::scenes::default_scene_overlays;

/// Switching policy for [`SceneController`](crate::SceneController).
#[derive(Debug, Clone)]
pub struct SceneControllerConfig {
    /// Minimum time between any two non-forced switches.
    pub switch_cooldown: Duration,
    pub auto_switch: bool,
    pub transition: TransitionConfig,
    /// Switch records retained for statistics.
    pub history_size: usize,
    /// Local descriptors merged into scenes as the surface reports them.
    pub scene_overlays: Vec<SceneDescriptor>,
}

impl Default for SceneControllerConfig {
    fn default() -> Self {
        Self {
            switch_cooldown: Duration::from_secs(1),
            auto_switch: true,
            transition: TransitionConfig::default(),
            history_size: 100,
            scene_overlays: default_scene_overlays(),
        }
    }
}

/// Decision engine tuning. Times are seconds on the observation clock.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum time between any two recommended switches.
    pub global_cooldown_secs: f64,
    /// Weight of new feedback in the preference moving average.
    pub learning_rate: f64,
    /// Observations and switches retained.
    pub history_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_cooldown_secs: 1.0,
            learning_rate: 0.1,
            history_size: 100,
        }
    }
}
