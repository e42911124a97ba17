// ── Scene surface seam ──
//
// The scene controller talks to the production surface only through this
// trait. `ControlChannel` is the live implementation; tests substitute an
// in-memory surface.

use std::future::Future;

use scenepilot_api::{ControlChannel, SceneList};

use crate::error::CoreError;
use crate::model::TransitionConfig;

/// Scene operations the controller needs from the surface.
pub trait SceneSurface: Send + Sync {
    fn list_scenes(&self) -> impl Future<Output = Result<SceneList, CoreError>> + Send;

    fn current_scene(&self) -> impl Future<Output = Result<String, CoreError>> + Send;

    fn set_scene(&self, scene_name: &str) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn set_transition(
        &self,
        transition: &TransitionConfig,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

impl SceneSurface for ControlChannel {
    async fn list_scenes(&self) -> Result<SceneList, CoreError> {
        Ok(ControlChannel::list_scenes(self).await?)
    }

    async fn current_scene(&self) -> Result<String, CoreError> {
        Ok(self.get_current_scene().await?)
    }

    async fn set_scene(&self, scene_name: &str) -> Result<(), CoreError> {
        Ok(self.set_current_scene(scene_name).await?)
    }

    async fn set_transition(&self, transition: &TransitionConfig) -> Result<(), CoreError> {
        Ok(ControlChannel::set_transition(self, &transition.to_settings()).await?)
    }
}
