//! Scene-control operations on top of the transport.
//!
//! Typed wrappers for the handful of surface requests the control plane
//! needs, plus re-publication of scene events on a broadcast channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::Error;
use crate::transport::{HandlerId, TransportClient};

const SURFACE_EVENT_CAPACITY: usize = 64;

/// Surface event emitted when the program scene changes.
pub const EVENT_SCENE_CHANGED: &str = "CurrentProgramSceneChanged";
/// Surface event emitted when scenes are created, removed or renamed.
pub const EVENT_SCENE_LIST_CHANGED: &str = "SceneListChanged";

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub obs_version: Option<String>,
    #[serde(default, rename = "obsWebSocketVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub rpc_version: Option<u32>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub available_requests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentScene {
    #[serde(alias = "sceneName")]
    current_program_scene_name: String,
}

/// Transition applied before the next scene change.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSettings {
    /// Transition name as the surface knows it (`"Fade"`, `"Luma Wipe"`, ...).
    pub name: String,
    pub duration: Duration,
    /// Optional transition-specific settings object, overlaid on the existing ones.
    pub settings: Option<Value>,
}

// ── Surface events ───────────────────────────────────────────────────

/// Scene events originating on the surface (operator clicks, scene edits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    SceneChanged { scene_name: String },
    SceneListChanged { scenes: Vec<SceneInfo> },
}

// ── ControlChannel ───────────────────────────────────────────────────

/// Typed scene operations. Holds no state beyond its event subscription;
/// connection resilience comes from the wrapped [`TransportClient`].
#[derive(Clone)]
pub struct ControlChannel {
    transport: TransportClient,
    events_tx: broadcast::Sender<SurfaceEvent>,
    handler_ids: Arc<Mutex<Vec<(&'static str, HandlerId)>>>,
}

impl ControlChannel {
    /// Wrap a transport and start re-publishing scene events from it.
    pub fn new(transport: TransportClient) -> Self {
        let (events_tx, _) = broadcast::channel(SURFACE_EVENT_CAPACITY);

        let tx = events_tx.clone();
        let scene_changed = transport.on_event(EVENT_SCENE_CHANGED, move |data| {
            let scene: CurrentScene = serde_json::from_value(data.clone())?;
            debug!(scene = %scene.current_program_scene_name, "surface switched scene");
            let _ = tx.send(SurfaceEvent::SceneChanged {
                scene_name: scene.current_program_scene_name,
            });
            Ok(())
        });

        let tx = events_tx.clone();
        let list_changed = transport.on_event(EVENT_SCENE_LIST_CHANGED, move |data| {
            let list: SceneList = serde_json::from_value(data.clone())?;
            debug!(count = list.scenes.len(), "surface scene list changed");
            let _ = tx.send(SurfaceEvent::SceneListChanged {
                scenes: list.scenes,
            });
            Ok(())
        });

        Self {
            transport,
            events_tx,
            handler_ids: Arc::new(Mutex::new(vec![
                (EVENT_SCENE_CHANGED, scene_changed),
                (EVENT_SCENE_LIST_CHANGED, list_changed),
            ])),
        }
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Receive scene events reported by the surface.
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events_tx.subscribe()
    }

    /// Stop re-publishing surface events. Safe to call more than once.
    pub fn detach(&self) {
        let ids = std::mem::take(
            &mut *self
                .handler_ids
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for (event, id) in ids {
            self.transport.remove_event_handler(event, id);
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// `GetVersion`. Also serves as the heartbeat probe.
    pub async fn get_version(&self) -> Result<VersionInfo, Error> {
        debug!("fetching surface version");
        self.call("GetVersion", None).await
    }

    /// `GetSceneList`
    pub async fn list_scenes(&self) -> Result<SceneList, Error> {
        debug!("listing scenes");
        self.call("GetSceneList", None).await
    }

    /// `GetCurrentProgramScene`
    pub async fn get_current_scene(&self) -> Result<String, Error> {
        debug!("fetching current program scene");
        let scene: CurrentScene = self.call("GetCurrentProgramScene", None).await?;
        Ok(scene.current_program_scene_name)
    }

    /// `SetCurrentProgramScene`
    pub async fn set_current_scene(&self, scene_name: &str) -> Result<(), Error> {
        debug!(scene = scene_name, "setting program scene");
        self.call_unit(
            "SetCurrentProgramScene",
            Some(json!({ "sceneName": scene_name })),
        )
        .await
    }

    /// `SetCurrentSceneTransition` + `SetCurrentSceneTransitionDuration`,
    /// then `SetCurrentSceneTransitionSettings` when settings are given.
    pub async fn set_transition(&self, transition: &TransitionSettings) -> Result<(), Error> {
        let duration_ms = u64::try_from(transition.duration.as_millis()).unwrap_or(u64::MAX);
        debug!(transition = %transition.name, duration_ms, "configuring transition");

        self.call_unit(
            "SetCurrentSceneTransition",
            Some(json!({ "transitionName": transition.name })),
        )
        .await?;
        self.call_unit(
            "SetCurrentSceneTransitionDuration",
            Some(json!({ "transitionDuration": duration_ms })),
        )
        .await?;

        if let Some(settings) = &transition.settings {
            self.call_unit(
                "SetCurrentSceneTransitionSettings",
                Some(json!({ "transitionSettings": settings, "overlay": true })),
            )
            .await?;
        }
        Ok(())
    }

    // ── Request plumbing ─────────────────────────────────────────────

    async fn call<T: DeserializeOwned>(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<T, Error> {
        let response = self.transport.send_request(request_type, data, None).await?;
        let body = response.into_result().inspect_err(|e| {
            warn!(request_type, error = %e, "surface rejected request");
        })?;
        serde_json::from_value(body).map_err(|e| {
            Error::Protocol(format!("unexpected {request_type} response: {e}"))
        })
    }

    async fn call_unit(&self, request_type: &str, data: Option<Value>) -> Result<(), Error> {
        let response = self.transport.send_request(request_type, data, None).await?;
        response.into_result().map(drop).inspect_err(|e| {
            warn!(request_type, error = %e, "surface rejected request");
        })
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
