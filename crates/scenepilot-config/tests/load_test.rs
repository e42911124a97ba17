// Layered loading: defaults, TOML file, environment.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use scenepilot_config::{Config, ConfigError, load_config_from, save_config_to};
use scenepilot_core::TransitionKind;

// ── Helpers ─────────────────────────────────────────────────────────

fn load(path: &str) -> Result<Config, figment::Error> {
    load_config_from(Path::new(path)).map_err(|e| figment::Error::from(e.to_string()))
}

const PROFILE: &str = r#"
[surface]
host = "studio.local"
port = 4460
auth_token_env = "STUDIO_TOKEN"
heartbeat_interval_secs = 0

[switching]
switch_cooldown_secs = 2.5
transition = "Luma Wipe"
transition_duration_ms = 800

[engine]
global_cooldown_secs = 3.0
mappings_file = "mappings.json"

[scenes."Intro"]
display_name = "Opening"
priority = 4
emotion_triggers = ["excited"]
"#;

// ── Loading ─────────────────────────────────────────────────────────

#[test]
fn missing_file_yields_defaults() {
    Jail::expect_with(|_jail| {
        let cfg = load("absent.toml")?;
        assert_eq!(cfg, Config::default());
        Ok(())
    });
}

#[test]
fn file_values_override_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", PROFILE)?;
        jail.set_env("STUDIO_TOKEN", "s3cret");

        let cfg = load("config.toml")?;
        assert_eq!(cfg.surface.host, "studio.local");
        assert_eq!(cfg.surface.response_timeout_secs, 5);

        let conn = cfg.connection_config().unwrap();
        assert_eq!(conn.port, 4460);
        assert_eq!(conn.heartbeat_interval, Duration::ZERO);
        assert_eq!(conn.auth_token.unwrap().expose_secret(), "s3cret");

        let controller = cfg.controller_config().unwrap();
        assert_eq!(controller.switch_cooldown, Duration::from_millis(2500));
        assert_eq!(controller.transition.kind, TransitionKind::LumaWipe);
        assert_eq!(controller.transition.duration, Duration::from_millis(800));
        let intro = controller
            .scene_overlays
            .iter()
            .find(|d| d.name == "Intro")
            .unwrap();
        assert_eq!(intro.display_name, "Opening");
        assert!(intro.is_triggered_by("excited"));

        assert!((cfg.engine_config().unwrap().global_cooldown_secs - 3.0).abs() < f64::EPSILON);
        assert_eq!(cfg.mappings_path(), Path::new("mappings.json"));
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", PROFILE)?;
        jail.set_env("SCENEPILOT_SURFACE__PORT", "4471");
        jail.set_env("SCENEPILOT_SWITCHING__AUTO_SWITCH", "false");

        let cfg = load("config.toml")?;
        assert_eq!(cfg.surface.port, 4471);
        assert_eq!(cfg.surface.host, "studio.local");
        assert!(!cfg.switching.auto_switch);
        Ok(())
    });
}

#[test]
fn invalid_values_fail_validation() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[switching]\ntransition = \"Dissolve\"\n")?;
        let err = load_config_from(Path::new("config.toml")).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "switching.transition"),
            "got {err:?}"
        );
        Ok(())
    });
}

#[test]
fn malformed_toml_is_a_figment_error() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[surface\nport = 1")?;
        let err = load_config_from(Path::new("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "got {err:?}");
        Ok(())
    });
}

// ── Saving ──────────────────────────────────────────────────────────

#[test]
fn saved_config_loads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.surface.host = "10.0.0.5".into();
    cfg.switching.transition = "Cut".into();
    cfg.engine.learning_rate = 0.25;
    save_config_to(&cfg, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[surface]"));
    assert!(text.contains("host = \"10.0.0.5\""));

    let reloaded: Config = toml::from_str(&text).unwrap();
    assert_eq!(reloaded, cfg);
}
