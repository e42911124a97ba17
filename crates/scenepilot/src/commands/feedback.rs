//! Feedback handler: folds one satisfaction score into the mapping file.

use serde::Serialize;

use scenepilot_config::Config;
use scenepilot_core::ScenePerformance;

use crate::cli::{FeedbackArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct FeedbackSummary<'a> {
    emotion: &'a str,
    scene: &'a str,
    preference: Option<f64>,
    scene_performance: Option<ScenePerformance>,
}

fn format_summary(s: &FeedbackSummary<'_>) -> String {
    let perf = s.scene_performance.map_or_else(
        || "-".into(),
        |p| {
            format!(
                "{:.2} over {} ratings",
                p.user_satisfaction, p.feedback_count
            )
        },
    );
    output::detail(&[
        ("Emotion", s.emotion.to_owned()),
        ("Scene", s.scene.to_owned()),
        (
            "Preference",
            s.preference.map(|p| format!("{p:.3}")).unwrap_or_default(),
        ),
        ("Satisfaction", perf),
    ])
}

pub fn handle(args: &FeedbackArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let path = cfg.mappings_path();
    let mut engine = util::open_engine_strict(cfg)?;
    engine.learn_from_feedback(&args.emotion, &args.scene, args.satisfaction)?;
    engine.save_configuration(&path)?;

    let summary = FeedbackSummary {
        emotion: &args.emotion,
        scene: &args.scene,
        preference: engine.user_preference(&args.emotion),
        scene_performance: engine.scene_performance(&args.scene),
    };
    let out = output::render_single(global.output, &summary, format_summary, |s| {
        s.preference.map(|p| format!("{p:.3}")).unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
