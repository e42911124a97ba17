//! Live switching: classifier frames on stdin, scene switches on the surface.
//!
//! Each stdin line is one JSON `EmotionContext`. Frames go through the
//! director; the resulting observation is echoed to stdout (one JSON object
//! per line with `-o json`, a short text line otherwise). EOF or Ctrl-C ends
//! the run, after which the learned mapping state is written back.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use scenepilot_config::Config;
use scenepilot_core::{Director, Observation, SwitchOutcome};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Surface};

#[derive(Debug, Default)]
struct RunTally {
    frames: u64,
    rejected: u64,
    switches: u64,
}

pub async fn handle(args: RunArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = util::open_engine(cfg)?;
    let mappings_path = cfg.mappings_path();

    let surface = Surface::connect(cfg).await?;
    let controller = match surface.controller(cfg).await {
        Ok(controller) => controller,
        Err(e) => {
            surface.close().await;
            return Err(e);
        }
    };
    if args.no_auto_switch {
        controller.set_auto_switch(false);
    }

    let director = Director::spawn(engine, controller, Some(surface.channel.subscribe()));
    info!(mappings = %mappings_path.display(), "reading observations from stdin");

    let tally = feed(&director, global).await;

    let engine = director.shutdown().await;
    surface.close().await;
    let engine = engine?;

    if !args.no_save {
        engine.save_configuration(&mappings_path)?;
    }
    if !global.quiet {
        eprintln!(
            "Processed {} frames ({} rejected), {} switches",
            tally.frames, tally.rejected, tally.switches
        );
    }
    Ok(())
}

async fn feed(director: &Director, global: &GlobalOpts) -> RunTally {
    let color = output::should_color(global.color);
    let mut tally = RunTally::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut line_no = 0_usize;
    loop {
        let line = tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        line_no += 1;

        let context = match util::parse_observation(&line, line_no) {
            Ok(Some(context)) => context,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "skipping observation");
                tally.rejected += 1;
                continue;
            }
        };

        let label = format!("{:>8.2}  {:<10}", context.timestamp, context.emotion);
        match director.observe(context).await {
            Ok(observation) => {
                tally.frames += 1;
                if observation.outcome.as_ref().is_some_and(SwitchOutcome::performed) {
                    tally.switches += 1;
                }
                print_observation(&label, &observation, global, color);
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "observation rejected");
                tally.rejected += 1;
            }
        }
    }
    tally
}

fn print_observation(label: &str, observation: &Observation, global: &GlobalOpts, color: bool) {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            match output::render_json(observation, true) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "cannot serialize observation");
                    return;
                }
            }
        }
        OutputFormat::Table | OutputFormat::Plain => {
            format!("{label}  {}", describe(observation, color))
        }
    };
    output::print_output(&line, global.quiet);
}

fn describe(observation: &Observation, color: bool) -> String {
    let result = &observation.result;
    let scene = result.recommended_scene.as_deref().unwrap_or("-");

    let decision = if let Some(ref error) = observation.switch_error {
        format!("switch to '{scene}' failed: {error}")
    } else {
        match &observation.outcome {
            Some(SwitchOutcome::Switched { .. }) => {
                output::highlight(&format!("switched to '{scene}'"), color)
            }
            Some(SwitchOutcome::AlreadyCurrent) => format!("already on '{scene}'"),
            Some(SwitchOutcome::CoolingDown { remaining }) => format!(
                "held by switch cooldown ({:.1}s)",
                remaining.as_secs_f64()
            ),
            Some(SwitchOutcome::MinDurationPending { remaining }) => format!(
                "held by minimum dwell ({:.1}s)",
                remaining.as_secs_f64()
            ),
            Some(SwitchOutcome::AutoSwitchDisabled) => "auto-switch disabled".into(),
            Some(SwitchOutcome::NoMatchingScene) => format!("no scene named '{scene}'"),
            Some(SwitchOutcome::InFlight) => "previous switch still in flight".into(),
            None => output::muted(&result.reasoning, color),
        }
    };
    format!("{:.2}  {decision}", result.confidence)
}
