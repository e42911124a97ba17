// ── Status report ──
//
// One serializable snapshot of transport, scene and mapping state, for the
// `status` command and for anything that wants to persist a diagnostic dump.

use chrono::{DateTime, Utc};
use scenepilot_api::TransportStats;
use serde::Serialize;

use crate::engine::{DecisionEngine, MappingStatistics};
use crate::model::SceneStats;
use crate::scenes::SceneController;
use crate::surface::SceneSurface;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    /// `None` when no live session backs the controller.
    pub transport: Option<TransportStats>,
    pub scenes: SceneStats,
    pub mappings: MappingStatistics,
}

impl StatusReport {
    pub fn collect<S: SceneSurface>(
        controller: &SceneController<S>,
        engine: &DecisionEngine,
        transport: Option<TransportStats>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            transport,
            scenes: controller.get_scene_stats(),
            mappings: engine.get_mapping_statistics(),
        }
    }
}
