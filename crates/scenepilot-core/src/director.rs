// ── Director ──
//
// Couples the synchronous decision engine to the async scene controller.
// The engine lives on a single task; everything else talks to it through a
// command channel, so classifier frames, feedback and snapshot queries from
// any thread are serialized without a lock around the engine.
//
// Surface events (a human switching scenes in the production app) arrive on
// the ControlChannel broadcast and are folded into both the controller and
// the engine on the same task.

use std::path::PathBuf;
use std::sync::Arc;

use scenepilot_api::{SurfaceEvent, TransportStats};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{DecisionEngine, MappingStatistics};
use crate::error::CoreError;
use crate::model::{EmotionContext, MappingResult, SwitchOutcome};
use crate::scenes::SceneController;
use crate::status::StatusReport;
use crate::surface::SceneSurface;

const COMMAND_CHANNEL_SIZE: usize = 64;
const RESULT_CHANNEL_SIZE: usize = 256;

/// What happened to one classifier frame.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub result: MappingResult,
    /// Set when the engine asked for a switch.
    pub outcome: Option<SwitchOutcome>,
    /// Set when the surface rejected or failed the switch.
    pub switch_error: Option<String>,
}

enum DirectorCommand {
    Observe {
        context: EmotionContext,
        reply: oneshot::Sender<Result<Observation, CoreError>>,
    },
    Feedback {
        emotion: String,
        scene: String,
        satisfaction: f64,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Statistics {
        reply: oneshot::Sender<MappingStatistics>,
    },
    Status {
        transport: Option<TransportStats>,
        reply: oneshot::Sender<StatusReport>,
    },
    Save {
        path: PathBuf,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
}

/// Handle to the running engine task.
pub struct Director {
    command_tx: mpsc::Sender<DirectorCommand>,
    results_tx: broadcast::Sender<MappingResult>,
    cancel: CancellationToken,
    task: JoinHandle<DecisionEngine>,
}

impl Director {
    /// Move `engine` onto its own task.
    ///
    /// `surface_events` is usually `ControlChannel::subscribe()`; pass
    /// `None` to ignore externally made scene changes.
    pub fn spawn<S>(
        engine: DecisionEngine,
        controller: Arc<SceneController<S>>,
        surface_events: Option<broadcast::Receiver<SurfaceEvent>>,
    ) -> Self
    where
        S: SceneSurface + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (results_tx, _) = broadcast::channel(RESULT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(director_task(
            DirectorState {
                engine,
                controller,
                results_tx: results_tx.clone(),
            },
            command_rx,
            surface_events,
            cancel.clone(),
        ));

        Self {
            command_tx,
            results_tx,
            cancel,
            task,
        }
    }

    /// Every evaluated [`MappingResult`], switch or not.
    pub fn subscribe(&self) -> broadcast::Receiver<MappingResult> {
        self.results_tx.subscribe()
    }

    /// Record and evaluate one classifier frame, switching if warranted.
    pub async fn observe(&self, context: EmotionContext) -> Result<Observation, CoreError> {
        self.request(|reply| DirectorCommand::Observe { context, reply })
            .await?
    }

    pub async fn feedback(
        &self,
        emotion: impl Into<String>,
        scene: impl Into<String>,
        satisfaction: f64,
    ) -> Result<(), CoreError> {
        let (emotion, scene) = (emotion.into(), scene.into());
        self.request(|reply| DirectorCommand::Feedback {
            emotion,
            scene,
            satisfaction,
            reply,
        })
        .await?
    }

    pub async fn statistics(&self) -> Result<MappingStatistics, CoreError> {
        self.request(|reply| DirectorCommand::Statistics { reply })
            .await
    }

    pub async fn export_status_report(
        &self,
        transport: Option<TransportStats>,
    ) -> Result<StatusReport, CoreError> {
        self.request(|reply| DirectorCommand::Status { transport, reply })
            .await
    }

    pub async fn save_mappings(&self, path: impl Into<PathBuf>) -> Result<(), CoreError> {
        let path = path.into();
        self.request(|reply| DirectorCommand::Save { path, reply })
            .await?
    }

    /// Stop the task and hand the engine back.
    pub async fn shutdown(self) -> Result<DecisionEngine, CoreError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| CoreError::Internal(format!("director task failed: {e}")))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> DirectorCommand,
    ) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| CoreError::Internal("director has stopped".into()))?;
        rx.await
            .map_err(|_| CoreError::Internal("director dropped the request".into()))
    }
}

// ── Background task ──────────────────────────────────────────────────

struct DirectorState<S> {
    engine: DecisionEngine,
    controller: Arc<SceneController<S>>,
    results_tx: broadcast::Sender<MappingResult>,
}

async fn director_task<S: SceneSurface>(
    mut state: DirectorState<S>,
    mut command_rx: mpsc::Receiver<DirectorCommand>,
    mut surface_events: Option<broadcast::Receiver<SurfaceEvent>>,
    cancel: CancellationToken,
) -> DecisionEngine {
    debug!("director started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                state.handle_command(command).await;
            }
            event = next_surface_event(&mut surface_events) => match event {
                Ok(event) => state.handle_surface_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "director lagged behind surface events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("surface event stream closed");
                    surface_events = None;
                }
            },
        }
    }
    debug!("director stopped");
    state.engine
}

async fn next_surface_event(
    events: &mut Option<broadcast::Receiver<SurfaceEvent>>,
) -> Result<SurfaceEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<S: SceneSurface> DirectorState<S> {
    async fn handle_command(&mut self, command: DirectorCommand) {
        match command {
            DirectorCommand::Observe { context, reply } => {
                let _ = reply.send(self.observe(context).await);
            }
            DirectorCommand::Feedback {
                emotion,
                scene,
                satisfaction,
                reply,
            } => {
                let _ = reply.send(self.engine.learn_from_feedback(&emotion, &scene, satisfaction));
            }
            DirectorCommand::Statistics { reply } => {
                let _ = reply.send(self.engine.get_mapping_statistics());
            }
            DirectorCommand::Status { transport, reply } => {
                let report = StatusReport::collect(&self.controller, &self.engine, transport);
                let _ = reply.send(report);
            }
            DirectorCommand::Save { path, reply } => {
                let _ = reply.send(self.engine.save_configuration(&path));
            }
        }
    }

    async fn observe(&mut self, context: EmotionContext) -> Result<Observation, CoreError> {
        let emotion = context.emotion.clone();
        let result = self.engine.observe(context)?;
        let _ = self.results_tx.send(result.clone());

        let mut observation = Observation {
            result,
            outcome: None,
            switch_error: None,
        };
        if !observation.result.should_switch {
            return Ok(observation);
        }
        let Some(scene) = observation.result.recommended_scene.clone() else {
            return Ok(observation);
        };

        match self.controller.switch_for_emotion(&scene, &emotion).await {
            Ok(outcome) => {
                if let SwitchOutcome::Switched { from } = &outcome {
                    self.engine
                        .record_switch(from.as_deref(), &scene, Some(&emotion));
                } else {
                    debug!(scene = %scene, emotion = %emotion, ?outcome, "recommended switch not performed");
                }
                observation.outcome = Some(outcome);
            }
            Err(e) => {
                warn!(scene = %scene, emotion = %emotion, error = %e, "recommended switch failed");
                observation.switch_error = Some(e.to_string());
            }
        }
        Ok(observation)
    }

    async fn handle_surface_event(&mut self, event: &SurfaceEvent) {
        match self.controller.handle_surface_event(event).await {
            Ok(Some(change)) => {
                info!(from = change.from.as_deref().unwrap_or("-"), to = %change.to, "external scene change");
                self.engine
                    .record_switch(change.from.as_deref(), &change.to, None);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to apply surface event"),
        }
    }
}
