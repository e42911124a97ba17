// ── Scene controller ──
//
// Single source of truth for "which scene is on program". Applies switch
// requests through a `SceneSurface` under the cooldown, minimum-dwell and
// auto-switch policy, and keeps a bounded switch history for statistics.
//
// State sits behind a std mutex that is never held across an await; the
// only thing that spans surface I/O is the in-flight counter.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use scenepilot_api::SurfaceEvent;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SceneControllerConfig;
use crate::error::CoreError;
use crate::model::{
    SceneDescriptor, SceneStats, SwitchOutcome, SwitchRecord, SwitchType, TransitionConfig,
};
use crate::surface::SceneSurface;

const RECENT_SWITCHES: usize = 10;

/// A program-scene change made outside this controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalSceneChange {
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total: u64,
    auto: u64,
    manual: u64,
    failed: u64,
}

#[derive(Debug)]
struct TimedSwitch {
    at: Instant,
    record: SwitchRecord,
}

#[derive(Debug)]
struct SceneState {
    scenes: IndexMap<String, SceneDescriptor>,
    overlays: IndexMap<String, SceneDescriptor>,
    current: Option<String>,
    previous: Option<String>,
    last_switch: Option<Instant>,
    /// Target of the switch currently talking to the surface.
    pending_target: Option<String>,
    history: VecDeque<TimedSwitch>,
    history_size: usize,
    counters: Counters,
    auto_switch: bool,
    transition: TransitionConfig,
    switch_cooldown: Duration,
}

impl SceneState {
    /// Why a non-forced switch to `target` has to wait, if it does.
    fn hold_off(&self, target: &SceneDescriptor, now: Instant) -> Option<SwitchOutcome> {
        let elapsed = now.saturating_duration_since(self.last_switch?);
        if elapsed < self.switch_cooldown {
            return Some(SwitchOutcome::CoolingDown {
                remaining: self.switch_cooldown - elapsed,
            });
        }
        if self.current.is_some() && elapsed < target.min_duration {
            return Some(SwitchOutcome::MinDurationPending {
                remaining: target.min_duration - elapsed,
            });
        }
        None
    }

    /// Highest-priority auto-switch scene triggered by `emotion`; the first
    /// registered wins a tie.
    fn best_scene_for(&self, emotion: &str) -> Option<String> {
        self.scenes
            .values()
            .filter(|s| s.auto_switch && !s.stale && s.is_triggered_by(emotion))
            .reduce(|best, s| if s.priority > best.priority { s } else { best })
            .map(|s| s.name.clone())
    }

    fn record(
        &mut self,
        to_scene: &str,
        emotion: Option<&str>,
        switch_type: SwitchType,
        at: Instant,
    ) -> Option<String> {
        let from = self.current.replace(to_scene.to_owned());
        self.previous.clone_from(&from);
        self.last_switch = Some(at);

        self.history.push_back(TimedSwitch {
            at,
            record: SwitchRecord {
                timestamp: Utc::now(),
                from_scene: from.clone(),
                to_scene: to_scene.to_owned(),
                emotion: emotion.map(str::to_owned),
                switch_type,
            },
        });
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }

        self.counters.total += 1;
        match switch_type {
            SwitchType::Auto => self.counters.auto += 1,
            SwitchType::Manual => self.counters.manual += 1,
        }
        from
    }

    fn average_scene_duration(&self) -> Duration {
        if self.history.len() < 2 {
            return Duration::ZERO;
        }
        let first = self.history.front().map(|s| s.at);
        let last = self.history.back().map(|s| s.at);
        match (first, last) {
            (Some(first), Some(last)) => {
                let gaps = u32::try_from(self.history.len() - 1).unwrap_or(u32::MAX);
                last.saturating_duration_since(first) / gaps
            }
            _ => Duration::ZERO,
        }
    }
}

/// Counts switches that are talking to the surface.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    /// A non-forced switch only proceeds when nothing else is in flight.
    fn acquire(counter: &'a AtomicUsize, force: bool) -> Option<Self> {
        if force {
            counter.fetch_add(1, Ordering::SeqCst);
        } else if counter
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(Self(counter))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── SceneController ──────────────────────────────────────────────────

/// Applies scene switches under the configured switching policy.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct SceneController<S> {
    surface: S,
    state: Mutex<SceneState>,
    in_flight: AtomicUsize,
}

impl<S: SceneSurface> SceneController<S> {
    pub fn new(surface: S, config: SceneControllerConfig) -> Self {
        let overlays = config
            .scene_overlays
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        Self {
            surface,
            state: Mutex::new(SceneState {
                scenes: IndexMap::new(),
                overlays,
                current: None,
                previous: None,
                last_switch: None,
                pending_target: None,
                history: VecDeque::new(),
                history_size: config.history_size.max(1),
                counters: Counters::default(),
                auto_switch: config.auto_switch,
                transition: config.transition,
                switch_cooldown: config.switch_cooldown,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    // ── Surface sync ─────────────────────────────────────────────────

    /// Sync the scene registry and read the program scene.
    pub async fn initialize(&self) -> Result<String, CoreError> {
        let count = self.refresh_scene_list().await?;
        let current = self.surface.current_scene().await?;

        self.lock().current = Some(current.clone());
        info!(scenes = count, current = %current, "scene controller initialized");
        Ok(current)
    }

    /// Merge the surface's scene list into the registry.
    ///
    /// New scenes pick up a matching local overlay; scenes the surface no
    /// longer reports are marked stale, never removed. Returns the number of
    /// live scenes.
    pub async fn refresh_scene_list(&self) -> Result<usize, CoreError> {
        let list = self.surface.list_scenes().await?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let reported: HashSet<&str> = list.scenes.iter().map(|s| s.scene_name.as_str()).collect();

        for scene in state.scenes.values_mut() {
            let stale = !reported.contains(scene.name.as_str());
            if stale && !scene.stale {
                debug!(scene = %scene.name, "scene no longer reported by surface");
            }
            scene.stale = stale;
        }

        for info in &list.scenes {
            if state.scenes.contains_key(&info.scene_name) {
                continue;
            }
            let descriptor = match state.overlays.get(&info.scene_name) {
                Some(overlay) => SceneDescriptor {
                    stale: false,
                    ..overlay.clone()
                },
                None => SceneDescriptor::discovered(info.scene_name.as_str()),
            };
            debug!(scene = %info.scene_name, "registered scene");
            state.scenes.insert(info.scene_name.clone(), descriptor);
        }

        if let Some(current) = &list.current_program_scene_name {
            state.current = Some(current.clone());
        }

        let live = state.scenes.values().filter(|s| !s.stale).count();
        info!(scenes = live, "refreshed scene list");
        Ok(live)
    }

    /// Apply a surface-originated scene event.
    ///
    /// Returns the change when the program scene moved without this
    /// controller asking for it.
    pub async fn handle_surface_event(
        &self,
        event: &SurfaceEvent,
    ) -> Result<Option<ExternalSceneChange>, CoreError> {
        match event {
            SurfaceEvent::SceneChanged { scene_name } => {
                let mut state = self.lock();
                if state.current.as_deref() == Some(scene_name.as_str())
                    || state.pending_target.as_deref() == Some(scene_name.as_str())
                {
                    return Ok(None);
                }
                let from = state.current.replace(scene_name.clone());
                state.previous.clone_from(&from);
                info!(scene = %scene_name, "program scene changed on surface");
                Ok(Some(ExternalSceneChange {
                    from,
                    to: scene_name.clone(),
                }))
            }
            SurfaceEvent::SceneListChanged { .. } => {
                self.refresh_scene_list().await?;
                Ok(None)
            }
        }
    }

    // ── Switching ────────────────────────────────────────────────────

    /// Switch the program scene.
    ///
    /// `force` bypasses the cooldown, the minimum dwell time and the
    /// in-flight check, and counts as a manual switch. Policy refusals are
    /// `Ok` outcomes; only an unknown scene or a surface failure is `Err`.
    pub async fn switch_to_scene(
        &self,
        scene_name: &str,
        transition: Option<&TransitionConfig>,
        force: bool,
    ) -> Result<SwitchOutcome, CoreError> {
        self.switch(scene_name, transition, force, None).await
    }

    /// Switch to the best scene whose triggers include `emotion`.
    pub async fn switch_by_emotion(
        &self,
        emotion: &str,
        confidence: f64,
    ) -> Result<SwitchOutcome, CoreError> {
        let target = {
            let state = self.lock();
            if !state.auto_switch {
                debug!(emotion, "auto switching disabled");
                return Ok(SwitchOutcome::AutoSwitchDisabled);
            }
            state.best_scene_for(emotion)
        };

        let Some(target) = target else {
            debug!(emotion, "no scene triggered by emotion");
            return Ok(SwitchOutcome::NoMatchingScene);
        };

        info!(emotion, confidence, scene = %target, "emotion triggered scene switch");
        self.switch(&target, None, false, Some(emotion)).await
    }

    /// Automatic switch to a scene chosen elsewhere, attributed to `emotion`.
    pub async fn switch_for_emotion(
        &self,
        scene_name: &str,
        emotion: &str,
    ) -> Result<SwitchOutcome, CoreError> {
        let auto_switch = self.lock().auto_switch;
        if !auto_switch {
            debug!(emotion, scene = scene_name, "auto switching disabled");
            return Ok(SwitchOutcome::AutoSwitchDisabled);
        }
        self.switch(scene_name, None, false, Some(emotion)).await
    }

    async fn switch(
        &self,
        scene_name: &str,
        transition: Option<&TransitionConfig>,
        force: bool,
        emotion: Option<&str>,
    ) -> Result<SwitchOutcome, CoreError> {
        let (transition, _in_flight) = {
            let mut state = self.lock();
            let Some(target) = state.scenes.get(scene_name).filter(|s| !s.stale) else {
                warn!(scene = scene_name, "switch to unknown scene");
                return Err(CoreError::SceneNotFound {
                    name: scene_name.to_owned(),
                });
            };

            if state.current.as_deref() == Some(scene_name) {
                debug!(scene = scene_name, "already on scene");
                return Ok(SwitchOutcome::AlreadyCurrent);
            }

            let Some(in_flight) = InFlight::acquire(&self.in_flight, force) else {
                debug!(scene = scene_name, "another switch is in flight");
                return Ok(SwitchOutcome::InFlight);
            };

            if !force {
                if let Some(outcome) = state.hold_off(target, Instant::now()) {
                    debug!(scene = scene_name, ?outcome, "switch held off");
                    return Ok(outcome);
                }
            }

            let transition = transition.unwrap_or(&state.transition).clone();
            state.pending_target = Some(scene_name.to_owned());
            (transition, in_flight)
        };

        if let Err(e) = self.surface.set_transition(&transition).await {
            warn!(error = %e, transition = %transition.kind, "failed to apply transition");
        }

        let result = self.surface.set_scene(scene_name).await;

        let mut state = self.lock();
        state.pending_target = None;
        match result {
            Ok(()) => {
                let switch_type = if force {
                    SwitchType::Manual
                } else {
                    SwitchType::Auto
                };
                let from = state.record(scene_name, emotion, switch_type, Instant::now());
                info!(
                    scene = scene_name,
                    from = from.as_deref().unwrap_or("-"),
                    emotion = emotion.unwrap_or("-"),
                    %switch_type,
                    "switched scene"
                );
                Ok(SwitchOutcome::Switched { from })
            }
            Err(e) => {
                state.counters.failed += 1;
                warn!(scene = scene_name, error = %e, "scene switch failed");
                Err(e)
            }
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Register or replace a scene descriptor.
    pub fn configure_scene(&self, descriptor: SceneDescriptor) {
        let mut state = self.lock();
        info!(scene = %descriptor.name, "configured scene");
        state
            .overlays
            .insert(descriptor.name.clone(), descriptor.clone());
        state.scenes.insert(descriptor.name.clone(), descriptor);
    }

    /// Returns `false` when the scene is unknown.
    pub fn add_emotion_trigger(&self, scene_name: &str, emotion: &str) -> bool {
        let mut state = self.lock();
        let Some(scene) = state.scenes.get_mut(scene_name) else {
            warn!(scene = scene_name, "cannot add trigger to unknown scene");
            return false;
        };
        if !scene.is_triggered_by(emotion) {
            scene.emotion_triggers.push(emotion.to_owned());
            info!(scene = scene_name, emotion, "added emotion trigger");
        }
        true
    }

    /// Returns `true` when a trigger was removed.
    pub fn remove_emotion_trigger(&self, scene_name: &str, emotion: &str) -> bool {
        let mut state = self.lock();
        let Some(scene) = state.scenes.get_mut(scene_name) else {
            return false;
        };
        let before = scene.emotion_triggers.len();
        scene.emotion_triggers.retain(|e| e != emotion);
        let removed = scene.emotion_triggers.len() != before;
        if removed {
            info!(scene = scene_name, emotion, "removed emotion trigger");
        }
        removed
    }

    pub fn set_auto_switch(&self, enabled: bool) {
        self.lock().auto_switch = enabled;
        info!(enabled, "auto switching");
    }

    pub fn auto_switch_enabled(&self) -> bool {
        self.lock().auto_switch
    }

    pub fn set_transition_config(&self, transition: TransitionConfig) {
        info!(transition = %transition.kind, "default transition set");
        self.lock().transition = transition;
    }

    pub fn transition_config(&self) -> TransitionConfig {
        self.lock().transition.clone()
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn current_scene(&self) -> Option<String> {
        self.lock().current.clone()
    }

    pub fn previous_scene(&self) -> Option<String> {
        self.lock().previous.clone()
    }

    /// Every registered scene in registration order, stale ones included.
    pub fn scene_configs(&self) -> Vec<SceneDescriptor> {
        self.lock().scenes.values().cloned().collect()
    }

    /// Retained switch records, oldest first.
    pub fn switch_history(&self) -> Vec<SwitchRecord> {
        self.lock()
            .history
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }

    pub fn get_scene_stats(&self) -> SceneStats {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(RECENT_SWITCHES);
        SceneStats {
            total_switches: state.counters.total,
            auto_switches: state.counters.auto,
            manual_switches: state.counters.manual,
            failed_switches: state.counters.failed,
            current_scene: state.current.clone(),
            previous_scene: state.previous.clone(),
            total_scenes: state.scenes.values().filter(|s| !s.stale).count(),
            auto_switch_enabled: state.auto_switch,
            recent_switches: state
                .history
                .iter()
                .skip(skip)
                .map(|s| s.record.clone())
                .collect(),
            average_scene_duration_secs: state.average_scene_duration().as_secs_f64(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SceneState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── Built-in scene overlays ──────────────────────────────────────────

/// Local descriptors for the stock scene set.
pub fn default_scene_overlays() -> Vec<SceneDescriptor> {
    let overlay = |name: &str, display: &str, description: &str| SceneDescriptor {
        display_name: display.into(),
        description: description.into(),
        ..SceneDescriptor::discovered(name)
    };

    vec![
        overlay(
            "Happy Scene",
            "Joyful Moments",
            "Shown while the presenter looks happy",
        )
        .with_triggers(["happy", "joy"])
        .with_priority(3)
        .with_min_duration(Duration::from_secs(3)),
        overlay(
            "Default Scene",
            "Focus Mode",
            "Neutral or focused presenter",
        )
        .with_triggers(["neutral", "focused"])
        .with_priority(1)
        .with_min_duration(Duration::from_secs(5)),
        overlay(
            "Dynamic Scene",
            "Interactive Time",
            "Surprised or excited presenter",
        )
        .with_triggers(["surprise", "excited"])
        .with_priority(2)
        .with_min_duration(Duration::from_secs(2)),
        overlay(
            "Calm Scene",
            "Calm Time",
            "Sad presenter or a moment that needs calm",
        )
        .with_triggers(["sad", "calm"])
        .with_priority(2)
        .with_min_duration(Duration::from_secs(4)),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state_with(scenes: Vec<SceneDescriptor>) -> SceneState {
        SceneState {
            scenes: scenes.into_iter().map(|s| (s.name.clone(), s)).collect(),
            overlays: IndexMap::new(),
            current: None,
            previous: None,
            last_switch: None,
            pending_target: None,
            history: VecDeque::new(),
            history_size: 3,
            counters: Counters::default(),
            auto_switch: true,
            transition: TransitionConfig::default(),
            switch_cooldown: Duration::from_secs(1),
        }
    }

    #[test]
    fn priority_tie_goes_to_first_registered() {
        let state = state_with(vec![
            SceneDescriptor::discovered("A").with_triggers(["happy"]).with_priority(2),
            SceneDescriptor::discovered("B").with_triggers(["happy"]).with_priority(2),
            SceneDescriptor::discovered("C").with_triggers(["happy"]).with_priority(1),
        ]);
        assert_eq!(state.best_scene_for("happy").as_deref(), Some("A"));
        assert_eq!(state.best_scene_for("sad"), None);
    }

    #[test]
    fn stale_and_manual_only_scenes_are_not_candidates() {
        let mut manual = SceneDescriptor::discovered("Manual")
            .with_triggers(["happy"])
            .with_priority(9);
        manual.auto_switch = false;
        let mut stale = SceneDescriptor::discovered("Gone")
            .with_triggers(["happy"])
            .with_priority(8);
        stale.stale = true;
        let live = SceneDescriptor::discovered("Live").with_triggers(["happy"]);

        let state = state_with(vec![manual, stale, live]);
        assert_eq!(state.best_scene_for("happy").as_deref(), Some("Live"));
    }

    #[test]
    fn hold_off_checks_cooldown_before_dwell() {
        let target = SceneDescriptor::discovered("B").with_min_duration(Duration::from_secs(3));
        let mut state = state_with(vec![target.clone()]);
        let start = Instant::now();

        assert_eq!(state.hold_off(&target, start), None);

        state.record("A", None, SwitchType::Manual, start);
        assert_eq!(
            state.hold_off(&target, start + Duration::from_millis(400)),
            Some(SwitchOutcome::CoolingDown {
                remaining: Duration::from_millis(600)
            })
        );
        assert_eq!(
            state.hold_off(&target, start + Duration::from_secs(2)),
            Some(SwitchOutcome::MinDurationPending {
                remaining: Duration::from_secs(1)
            })
        );
        assert_eq!(state.hold_off(&target, start + Duration::from_secs(3)), None);
    }

    #[test]
    fn history_is_bounded_and_counts_by_type() {
        let mut state = state_with(Vec::new());
        let start = Instant::now();
        for (i, name) in ["A", "B", "C", "D"].into_iter().enumerate() {
            let kind = if i % 2 == 0 {
                SwitchType::Auto
            } else {
                SwitchType::Manual
            };
            state.record(name, Some("happy"), kind, start + Duration::from_secs(i as u64 * 2));
        }

        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[0].record.to_scene, "B");
        assert_eq!(state.counters.total, 4);
        assert_eq!(state.counters.auto, 2);
        assert_eq!(state.counters.manual, 2);
        assert_eq!(state.previous.as_deref(), Some("C"));
        assert_eq!(state.average_scene_duration(), Duration::from_secs(2));
    }

    #[test]
    fn default_overlays_cover_stock_scenes() {
        let overlays = default_scene_overlays();
        let names: Vec<&str> = overlays.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Happy Scene", "Default Scene", "Dynamic Scene", "Calm Scene"]
        );
        assert!(overlays[0].is_triggered_by("joy"));
        assert_eq!(overlays[1].min_duration, Duration::from_secs(5));
    }
}
