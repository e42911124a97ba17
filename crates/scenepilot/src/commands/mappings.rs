//! Mapping command handlers.

use tabled::Tabled;

use scenepilot_config::Config;
use scenepilot_core::{DecisionEngine, EmotionMapping};

use crate::cli::{GlobalOpts, MappingsArgs, MappingsCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "Emotion")]
    emotion: String,
    #[tabled(rename = "Scene")]
    scene: String,
    #[tabled(rename = "Prio")]
    priority: u8,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Sustain")]
    sustained: String,
    #[tabled(rename = "Cooldown")]
    cooldown: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

impl From<&EmotionMapping> for MappingRow {
    fn from(m: &EmotionMapping) -> Self {
        Self {
            emotion: m.emotion.clone(),
            scene: m.scene_name.clone(),
            priority: m.priority,
            threshold: format!("{:.2}", m.confidence_threshold),
            sustained: format!("{:.1}s", m.sustained_duration),
            cooldown: format!("{:.1}s", m.cooldown_period),
            trigger: m.trigger_condition.to_string(),
            strategy: format!("{} x{:.1}", m.strategy, m.weight),
            enabled: if m.enabled { "yes" } else { "no" }.into(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: MappingsArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        MappingsCommand::Show => {
            let engine = util::open_engine(cfg)?;
            let mappings: Vec<EmotionMapping> = engine.mappings().cloned().collect();
            let out = output::render_list(
                global.output,
                &mappings,
                |m| MappingRow::from(m),
                |m| format!("{} {}", m.emotion, m.scene_name),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MappingsCommand::Export { path } => {
            let engine = util::open_engine(cfg)?;
            match path {
                Some(path) => {
                    engine.save_configuration(&path)?;
                    if !global.quiet {
                        eprintln!("Mappings written to {}", path.display());
                    }
                }
                None => {
                    let out = output::render_json(
                        &engine.to_mapping_file(),
                        global.output == OutputFormat::JsonCompact,
                    )?;
                    output::print_output(&out, global.quiet);
                }
            }
            Ok(())
        }

        MappingsCommand::Reset { all } => {
            let path = cfg.mappings_path();
            let engine = if all {
                DecisionEngine::new(cfg.engine_config()?)
            } else {
                let mut engine = util::open_engine_strict(cfg)?;
                engine.reset_learning_data();
                engine
            };
            engine.save_configuration(&path)?;
            if !global.quiet {
                let what = if all { "Mappings and learned data" } else { "Learned data" };
                eprintln!("{what} reset in {}", path.display());
            }
            Ok(())
        }
    }
}
