//! Status report handler.

use scenepilot_config::Config;
use scenepilot_core::StatusReport;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::{self, Surface};

fn format_report(report: &StatusReport) -> String {
    let scenes = &report.scenes;
    let mappings = &report.mappings;
    let mut rows = vec![("Generated", report.generated_at.to_rfc3339())];

    if let Some(ref t) = report.transport {
        rows.push(("Surface", t.url.clone()));
        rows.push(("Connection", t.state.to_string()));
        rows.push((
            "Uptime",
            t.uptime_secs.map(|s| format!("{s}s")).unwrap_or_default(),
        ));
        rows.push((
            "Messages",
            format!("{} sent / {} received", t.messages_sent, t.messages_received),
        ));
        rows.push(("Reconnects", t.reconnect_attempts.to_string()));
    }

    rows.push((
        "Program Scene",
        scenes.current_scene.clone().unwrap_or_else(|| "-".into()),
    ));
    rows.push((
        "Previous Scene",
        scenes.previous_scene.clone().unwrap_or_else(|| "-".into()),
    ));
    rows.push(("Scenes", scenes.total_scenes.to_string()));
    rows.push((
        "Auto Switch",
        if scenes.auto_switch_enabled { "on" } else { "off" }.into(),
    ));
    rows.push((
        "Switches",
        format!(
            "{} ({} auto, {} manual, {} failed)",
            scenes.total_switches,
            scenes.auto_switches,
            scenes.manual_switches,
            scenes.failed_switches
        ),
    ));
    rows.push((
        "Mappings",
        format!(
            "{} enabled of {}",
            mappings.enabled_mappings, mappings.total_mappings
        ),
    ));
    rows.push(("Preferences", mappings.user_preferences.len().to_string()));

    output::detail(&rows)
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = util::open_engine(cfg)?;
    let surface = Surface::connect(cfg).await?;

    let report = surface.controller(cfg).await.map(|controller| {
        StatusReport::collect(&controller, &engine, Some(surface.transport.statistics()))
    });
    surface.close().await;
    let report = report?;

    let out = output::render_single(global.output, &report, format_report, |r| {
        r.scenes.current_scene.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
