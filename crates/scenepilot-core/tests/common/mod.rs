// In-memory scene surface for controller and director tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scenepilot_api::{SceneInfo, SceneList};
use scenepilot_core::{
    CoreError, SceneController, SceneControllerConfig, SceneSurface, TransitionConfig,
};
use tokio::sync::Notify;

#[derive(Default)]
pub struct FakeSurface {
    scenes: Mutex<Vec<String>>,
    program: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    reject_scene: Mutex<Option<String>>,
    fail_transition: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeSurface {
    pub fn with_scenes(names: &[&str]) -> Self {
        let surface = Self::default();
        surface.set_scenes(names);
        *surface.program.lock().unwrap() = names.first().map(|s| (*s).to_owned());
        surface
    }

    pub fn set_scenes(&self, names: &[&str]) {
        *self.scenes.lock().unwrap() = names.iter().map(|s| (*s).to_owned()).collect();
    }

    pub fn program(&self) -> Option<String> {
        self.program.lock().unwrap().clone()
    }

    /// Surface calls in order: `list`, `current`, `transition:<kind>`, `scene:<name>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scene_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("scene:").map(str::to_owned))
            .collect()
    }

    pub fn reject_scene(&self, name: &str) {
        *self.reject_scene.lock().unwrap() = Some(name.to_owned());
    }

    pub fn fail_transitions(&self) {
        self.fail_transition.store(true, Ordering::SeqCst);
    }

    /// Make `set_scene` wait until the returned notify fires.
    pub fn hold_switches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SceneSurface for FakeSurface {
    async fn list_scenes(&self) -> Result<SceneList, CoreError> {
        self.log("list".into());
        let scenes = self
            .scenes
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, name)| SceneInfo {
                scene_name: name.clone(),
                scene_index: Some(u32::try_from(i).unwrap()),
            })
            .collect();
        Ok(SceneList {
            current_program_scene_name: self.program(),
            scenes,
        })
    }

    async fn current_scene(&self) -> Result<String, CoreError> {
        self.log("current".into());
        self.program().ok_or(CoreError::ControllerDisconnected)
    }

    async fn set_scene(&self, scene_name: &str) -> Result<(), CoreError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.log(format!("scene:{scene_name}"));

        if self.reject_scene.lock().unwrap().as_deref() == Some(scene_name) {
            return Err(CoreError::RequestRejected {
                request_type: "SetCurrentProgramScene".into(),
                code: 600,
                message: "No source was found".into(),
            });
        }
        *self.program.lock().unwrap() = Some(scene_name.to_owned());
        Ok(())
    }

    async fn set_transition(&self, transition: &TransitionConfig) -> Result<(), CoreError> {
        self.log(format!("transition:{}", transition.kind));
        if self.fail_transition.load(Ordering::SeqCst) {
            return Err(CoreError::Timeout {
                operation: "SetCurrentSceneTransition".into(),
                timeout_ms: 5000,
            });
        }
        Ok(())
    }
}

pub const SCENES: &[&str] = &["Default Scene", "Happy Scene", "Calm Scene", "Dynamic Scene"];

/// Controller over the stock scenes, initialized, program on "Default Scene".
pub async fn controller() -> Arc<SceneController<FakeSurface>> {
    controller_with(SceneControllerConfig::default()).await
}

pub async fn controller_with(config: SceneControllerConfig) -> Arc<SceneController<FakeSurface>> {
    let controller = SceneController::new(FakeSurface::with_scenes(SCENES), config);
    controller.initialize().await.unwrap();
    Arc::new(controller)
}

pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}
