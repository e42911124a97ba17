//! Integration tests for the `scenepilot` binary.
//!
//! Everything here runs offline: argument parsing, config handling, the
//! mapping commands and the engine dry run. Commands that need a control
//! surface are only exercised for their failure path.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

// ── Helpers ─────────────────────────────────────────────────────────

/// Scratch directory holding a config file whose mapping file lives beside it.
struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sandbox = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        sandbox.write_config("");
        sandbox
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn mappings_path(&self) -> PathBuf {
        self.dir.path().join("emotion_mappings.json")
    }

    /// Write `extra` after an `[engine]` section pointing at the sandbox.
    fn write_config(&self, extra: &str) {
        let text = format!(
            "[engine]\nmappings_file = {:?}\n\n{extra}",
            self.mappings_path().display().to_string()
        );
        std::fs::write(self.config_path(), text).unwrap();
    }

    fn mappings(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.mappings_path()).unwrap()).unwrap()
    }

    /// Build a [`Command`] for the binary with env isolation.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("scenepilot");
        isolate(&mut cmd, self.dir.path());
        cmd.env("SCENEPILOT_CONFIG", self.config_path());
        cmd
    }
}

/// Clear `SCENEPILOT_*` variables and point platform directories at `home`.
fn isolate(cmd: &mut assert_cmd::Command, home: &Path) {
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("SCENEPILOT_HOST")
        .env_remove("SCENEPILOT_PORT")
        .env_remove("SCENEPILOT_AUTH_TOKEN")
        .env_remove("SCENEPILOT_CONFIG")
        .env_remove("SCENEPILOT_OUTPUT");
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

const FEED: &str = r#"# surprise spikes, then a weak smile
{"emotion":"surprise","confidence":0.9,"timestamp":0.0}
{"emotion":"surprise","confidence":0.9,"timestamp":1.0}
{"emotion":"surprise","confidence":0.9,"timestamp":2.5}
{"emotion":"happy","confidence":0.5,"timestamp":3.0}
"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "{stderr}");
}

#[test]
fn help_lists_commands() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("scenes")
                .and(predicate::str::contains("evaluate"))
                .and(predicate::str::contains("mappings")),
        );
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_path_follows_override() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let sandbox = Sandbox::new();
    let path = sandbox.dir.path().join("fresh").join("config.toml");

    sandbox
        .cmd()
        .env("SCENEPILOT_CONFIG", &path)
        .args(["config", "init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[surface]"));
    assert!(written.contains("port = 4455"));

    sandbox
        .cmd()
        .env("SCENEPILOT_CONFIG", &path)
        .args(["config", "init"])
        .assert()
        .code(6);

    sandbox
        .cmd()
        .env("SCENEPILOT_CONFIG", &path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_show_redacts_token() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[surface]\nhost = \"studio.local\"\nauth_token = \"hunter2\"\n");

    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("studio.local")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn invalid_config_is_a_usage_error() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[switching]\ntransition = \"Dissolve\"\n");

    sandbox
        .cmd()
        .args(["mappings", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("switching.transition"));
}

// ── Mappings ────────────────────────────────────────────────────────

#[test]
fn mappings_show_lists_builtin_table() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["mappings", "show", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("happy Happy Scene")
                .and(predicate::str::contains("disgust Neutral Scene")),
        );

    let output = sandbox
        .cmd()
        .args(["mappings", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 7);
}

#[test]
fn mappings_export_writes_versioned_file() {
    let sandbox = Sandbox::new();
    let target = sandbox.dir.path().join("export.json");

    sandbox
        .cmd()
        .args(["mappings", "export"])
        .arg(&target)
        .assert()
        .success();

    let exported: Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(exported["metadata"]["version"], "1.0");
    assert_eq!(exported["mappings"]["surprise"]["trigger_condition"], "immediate");
}

#[test]
fn feedback_is_persisted_and_reset_clears_it() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["feedback", "happy", "Happy Scene", "0.8", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.800"));
    assert_eq!(sandbox.mappings()["user_preferences"]["happy"], 0.8);
    assert_eq!(
        sandbox.mappings()["scene_performance"]["Happy Scene"]["feedback_count"],
        1
    );

    sandbox
        .cmd()
        .args(["feedback", "happy", "Happy Scene", "1.5"])
        .assert()
        .code(2);

    sandbox.cmd().args(["mappings", "reset"]).assert().success();
    let reset = sandbox.mappings();
    assert!(reset["user_preferences"].as_object().unwrap().is_empty());
    assert_eq!(reset["mappings"]["happy"]["scene_name"], "Happy Scene");
}

#[test]
fn broken_mapping_file_blocks_writes_but_not_reads() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.mappings_path(), "{ not json").unwrap();

    sandbox
        .cmd()
        .args(["feedback", "happy", "Happy Scene", "0.8"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mapping file"));
    assert_eq!(
        std::fs::read_to_string(sandbox.mappings_path()).unwrap(),
        "{ not json"
    );

    sandbox
        .cmd()
        .args(["mappings", "show", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("happy Happy Scene"));
}

// ── Evaluate ────────────────────────────────────────────────────────

#[test]
fn evaluate_replays_feed_with_cooldowns() {
    let sandbox = Sandbox::new();
    let feed = sandbox.dir.path().join("feed.jsonl");
    std::fs::write(&feed, FEED).unwrap();

    let output = sandbox
        .cmd()
        .args(["evaluate", "-o", "json"])
        .arg(&feed)
        .output()
        .unwrap();
    assert!(output.status.success());
    let results = stdout_json(&output);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 4);

    let switched: Vec<bool> = results
        .iter()
        .map(|r| r["should_switch"].as_bool().unwrap())
        .collect();
    assert_eq!(switched, vec![true, false, true, false]);
    assert!(
        results[1]["reasoning"]
            .as_str()
            .unwrap()
            .contains("cooldown for 'surprise'")
    );
    assert!(!sandbox.mappings_path().exists());
}

#[test]
fn evaluate_reads_stdin_and_filters_switches() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["evaluate", "--switches-only", "-o", "plain"])
        .write_stdin(FEED)
        .assert()
        .success()
        .stdout(predicate::eq("0.00 surprise Dynamic Scene\n2.50 surprise Dynamic Scene\n"));
}

#[test]
fn evaluate_reports_bad_line() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("evaluate")
        .write_stdin("{\"emotion\":\"happy\",\"confidence\":0.9,\"timestamp\":0}\n{oops}\n")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 2"));
}

// ── Surface commands ────────────────────────────────────────────────

#[test]
fn unreachable_surface_is_a_connection_error() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[surface]\nconnect_timeout_secs = 2\n");

    sandbox
        .cmd()
        .args(["--host", "127.0.0.1", "--port", "1", "scenes", "list"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("control surface"));
}
