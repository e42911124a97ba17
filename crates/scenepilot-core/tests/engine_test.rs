// Scenario tests for the decision engine and its mapping file.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use scenepilot_core::{
    CoreError, DecisionEngine, EmotionContext, EmotionMapping, EngineConfig, MappingStrategy,
    TriggerCondition,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn sustained_happy_engine() -> DecisionEngine {
    let mut engine = DecisionEngine::default();
    engine
        .add_mapping(
            EmotionMapping::new("happy", "Happy Scene")
                .with_priority(8)
                .with_threshold(0.75)
                .with_timing(1.5, 3.0)
                .with_trigger(TriggerCondition::Sustained),
        )
        .unwrap();
    engine
}

fn frame(emotion: &str, confidence: f64, t: f64) -> EmotionContext {
    EmotionContext::new(emotion, confidence, t)
}

// ── Trigger scenarios ───────────────────────────────────────────────

#[test]
fn sustained_trigger_waits_for_continuous_run() {
    let mut engine = sustained_happy_engine();

    let first = engine.observe(frame("happy", 0.85, 0.0)).unwrap();
    assert!(!first.should_switch);
    assert_eq!(first.recommended_scene.as_deref(), Some("Happy Scene"));
    assert_eq!(
        first.reasoning,
        "Emotion 'happy' detected with 0.85 confidence, need 1.5s sustained (current: 0.0s)"
    );

    for t in [0.4, 0.8, 1.2] {
        assert!(!engine.observe(frame("happy", 0.85, t)).unwrap().should_switch);
    }

    let ready = engine.observe(frame("happy", 0.85, 1.6)).unwrap();
    assert!(ready.should_switch, "{}", ready.reasoning);
    assert_eq!(ready.priority, 8);
    assert_eq!(
        ready.reasoning,
        "Emotion 'happy' detected with 0.85 confidence, recommending 'Happy Scene' (priority 8)"
    );
}

#[test]
fn interrupted_run_restarts_sustain_clock() {
    let mut engine = sustained_happy_engine();

    engine.observe(frame("happy", 0.85, 0.0)).unwrap();
    engine.observe(frame("neutral", 0.9, 0.8)).unwrap();
    engine.observe(frame("happy", 0.85, 1.0)).unwrap();

    let result = engine.observe(frame("happy", 0.85, 1.6)).unwrap();
    assert!(!result.should_switch);
    assert!(result.reasoning.contains("(current: 0.6s)"), "{}", result.reasoning);
}

#[test]
fn combined_trigger_needs_confidence_and_duration() {
    let mut engine = DecisionEngine::default();
    let angry = engine.mapping("angry").unwrap().clone();
    assert_eq!(angry.trigger_condition, TriggerCondition::Combined);

    engine.observe(frame("angry", 0.9, 0.0)).unwrap();
    let low = engine.observe(frame("angry", 0.5, 2.0)).unwrap();
    assert!(!low.should_switch);
    assert!(low.reasoning.contains("below threshold 0.75"));

    let ready = engine.observe(frame("angry", 0.9, 2.1)).unwrap();
    assert!(ready.should_switch);
}

// ── Cooldowns ───────────────────────────────────────────────────────

#[test]
fn per_emotion_cooldown_after_switch() {
    let mut engine = sustained_happy_engine();
    for t in [0.0, 0.5, 1.0, 1.6] {
        engine.observe(frame("happy", 0.85, t)).unwrap();
    }

    engine.record_switch(None, "Happy Scene", Some("happy"));
    assert_eq!(engine.current_scene(), Some("Happy Scene"));

    let result = engine.observe(frame("happy", 0.9, 2.0)).unwrap();
    assert!(!result.should_switch);
    assert_eq!(result.recommended_scene.as_deref(), Some("Happy Scene"));
    assert!(
        result.reasoning.contains("cooldown for 'happy' is active"),
        "{}",
        result.reasoning
    );
    let remaining = result.metadata["emotion_cooldown_remaining"].as_f64().unwrap();
    assert!((remaining - 2.6).abs() < 1e-9, "{remaining}");
}

#[test]
fn cooldowns_hold_across_a_noisy_stream() {
    let mut engine = DecisionEngine::new(EngineConfig {
        global_cooldown_secs: 1.0,
        ..EngineConfig::default()
    });
    let emotions = ["surprise", "happy", "surprise", "fear", "happy", "surprise"];

    let mut switches: Vec<(String, f64)> = Vec::new();
    for step in 0..400_u32 {
        let t = f64::from(step) * 0.1;
        let emotion = emotions[usize::try_from(step / 3).unwrap() % emotions.len()];
        let result = engine.observe(frame(emotion, 0.95, t)).unwrap();
        if result.should_switch {
            let scene = result.recommended_scene.unwrap();
            let from = engine.current_scene().map(str::to_owned);
            engine.record_switch(from.as_deref(), &scene, Some(emotion));
            switches.push((emotion.to_owned(), t));
        }
    }

    assert!(switches.len() > 2);
    for pair in switches.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= 1.0 - 1e-9, "global gap {pair:?}");
    }
    for (i, (emotion, t)) in switches.iter().enumerate() {
        let cooldown = engine.mapping(emotion).unwrap().cooldown_period;
        if let Some((_, prev)) = switches[..i].iter().rev().find(|(e, _)| e == emotion) {
            assert!(t - prev >= cooldown - 1e-9, "{emotion} gap {} < {cooldown}", t - prev);
        }
    }
}

// ── Persistence ─────────────────────────────────────────────────────

#[test]
fn mapping_file_round_trip_reproduces_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("emotion_mappings.json");

    let mut engine = DecisionEngine::default();
    engine
        .add_mapping(
            EmotionMapping::new("excited", "Party Scene")
                .with_priority(10)
                .with_threshold(0.9)
                .with_timing(0.5, 8.0)
                .with_trigger(TriggerCondition::Combined)
                .with_strategy(MappingStrategy::ContextAware, 1.3),
        )
        .unwrap();
    engine.learn_from_feedback("excited", "Party Scene", 0.8).unwrap();
    engine.save_configuration(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["metadata"]["version"], "1.0");
    assert_eq!(raw["mappings"]["excited"]["strategy"], "context");
    assert_eq!(raw["mappings"]["excited"]["trigger_condition"], "combined");

    let mut reloaded = DecisionEngine::new(EngineConfig::default());
    assert!(reloaded.load_configuration(&path).unwrap());

    let original: Vec<EmotionMapping> = engine.mappings().cloned().collect();
    let restored: Vec<EmotionMapping> = reloaded.mappings().cloned().collect();
    assert_eq!(restored, original);
    assert_eq!(reloaded.user_preference("excited"), Some(0.8));
    assert_eq!(
        reloaded.scene_performance("Party Scene").unwrap().feedback_count,
        1
    );
}

#[test]
fn file_mappings_overlay_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emotion_mappings.json");
    std::fs::write(
        &path,
        r#"{
            "mappings": {
                "happy": { "scene_name": "Party Scene", "priority": 10, "trigger_condition": "immediate" },
                "bored": { "strategy": "weighted", "weight": 0.5 }
            },
            "user_preferences": { "happy": 0.9 }
        }"#,
    )
    .unwrap();

    let engine = DecisionEngine::with_mapping_file(EngineConfig::default(), &path);

    assert_eq!(engine.mapping("happy").unwrap().scene_name, "Party Scene");
    assert_eq!(engine.mapping("bored").unwrap().scene_name, "Bored Scene");
    assert_eq!(engine.mapping("sad").unwrap().scene_name, "Calm Scene");
    assert_eq!(engine.get_mapping_statistics().total_mappings, 8);
    assert_eq!(engine.user_preference("happy"), Some(0.9));
}

#[test]
fn broken_mapping_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emotion_mappings.json");
    std::fs::write(&path, r#"{"mappings":{"happy":{"priority":0}}}"#).unwrap();

    let mut engine = DecisionEngine::default();
    let err = engine.load_configuration(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoad { .. }), "got {err:?}");
    assert_eq!(engine.mapping("happy").unwrap().priority, 8);

    let fallback = DecisionEngine::with_mapping_file(EngineConfig::default(), &path);
    assert_eq!(fallback.mapping("happy").unwrap().scene_name, "Happy Scene");
}

#[test]
fn removed_mapping_is_no_longer_evaluated() {
    let mut engine = DecisionEngine::default();
    assert!(engine.remove_mapping("fear").is_some());
    assert!(engine.remove_mapping("fear").is_none());

    let result = engine.observe(frame("fear", 0.99, 0.0)).unwrap();
    assert_eq!(result.recommended_scene, None);
}
