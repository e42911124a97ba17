//! Scene command handlers.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;

use scenepilot_config::Config;
use scenepilot_core::{SceneDescriptor, SwitchOutcome, TransitionConfig};

use crate::cli::{GlobalOpts, ScenesArgs, ScenesCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Surface};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SceneRow {
    #[tabled(rename = "Scene")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "Triggers")]
    triggers: String,
    #[tabled(rename = "Min Dwell")]
    min_duration: String,
    #[tabled(rename = "Auto")]
    auto_switch: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Serialize)]
struct SceneView {
    #[serde(flatten)]
    descriptor: SceneDescriptor,
    program: bool,
}

impl From<&SceneView> for SceneRow {
    fn from(v: &SceneView) -> Self {
        let d = &v.descriptor;
        let state = if v.program {
            "program"
        } else if d.stale {
            "stale"
        } else {
            ""
        };
        Self {
            name: d.name.clone(),
            display_name: d.display_name.clone(),
            priority: d.priority,
            triggers: d.emotion_triggers.join(", "),
            min_duration: format!("{:.1}s", d.min_duration.as_secs_f64()),
            auto_switch: if d.auto_switch { "yes" } else { "no" }.into(),
            state: state.into(),
        }
    }
}

#[derive(Serialize)]
struct SwitchReport {
    scene: String,
    transition: Option<TransitionConfig>,
    #[serde(flatten)]
    outcome: SwitchOutcome,
}

fn describe(report: &SwitchReport) -> String {
    match &report.outcome {
        SwitchOutcome::Switched { from } => format!(
            "Switched {} -> {}",
            from.as_deref().unwrap_or("(none)"),
            report.scene
        ),
        SwitchOutcome::AlreadyCurrent => format!("'{}' is already the program scene", report.scene),
        other => format!("Not switched: {other:?}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ScenesArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let surface = Surface::connect(cfg).await?;
    let result = run(args, cfg, global, &surface).await;
    surface.close().await;
    result
}

async fn run(
    args: ScenesArgs,
    cfg: &Config,
    global: &GlobalOpts,
    surface: &Surface,
) -> Result<(), CliError> {
    match args.command {
        ScenesCommand::List => {
            let controller = surface.controller(cfg).await?;
            let current = controller.current_scene();
            let views: Vec<SceneView> = controller
                .scene_configs()
                .into_iter()
                .map(|descriptor| SceneView {
                    program: current.as_deref() == Some(descriptor.name.as_str()),
                    descriptor,
                })
                .collect();
            let out = output::render_list(
                global.output,
                &views,
                |v| SceneRow::from(v),
                |v| v.descriptor.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ScenesCommand::Current => {
            let scene = surface.channel.get_current_scene().await?;
            let out = output::render_single(global.output, &scene, String::clone, String::clone)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ScenesCommand::Switch {
            name,
            transition,
            duration_ms,
        } => {
            let controller = surface.controller(cfg).await?;
            let transition = match transition {
                Some(kind) => {
                    let duration = duration_ms
                        .map_or(controller.transition_config().duration, Duration::from_millis);
                    Some(TransitionConfig::new(util::parse_transition(&kind)?, duration))
                }
                None => None,
            };

            let outcome = controller
                .switch_to_scene(&name, transition.as_ref(), true)
                .await?;
            let report = SwitchReport {
                scene: name,
                transition,
                outcome,
            };
            let out = output::render_single(global.output, &report, describe, |r| {
                r.scene.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
