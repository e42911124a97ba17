//! Offline dry run of the decision engine.
//!
//! Replays a JSON-lines feed through a fresh engine, treating every
//! recommended switch as performed. Nothing is written back.

use std::fs::File;
use std::io::{self, BufReader};

use serde::Serialize;
use tabled::Tabled;

use scenepilot_config::Config;
use scenepilot_core::MappingResult;

use crate::cli::{EvaluateArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct Evaluation {
    timestamp: f64,
    emotion: String,
    #[serde(flatten)]
    result: MappingResult,
}

#[derive(Tabled)]
struct EvaluationRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Emotion")]
    emotion: String,
    #[tabled(rename = "Conf")]
    confidence: String,
    #[tabled(rename = "Switch")]
    switch: String,
    #[tabled(rename = "Scene")]
    scene: String,
    #[tabled(rename = "Reasoning")]
    reasoning: String,
}

impl From<&Evaluation> for EvaluationRow {
    fn from(e: &Evaluation) -> Self {
        Self {
            timestamp: format!("{:.2}", e.timestamp),
            emotion: e.emotion.clone(),
            confidence: format!("{:.2}", e.result.confidence),
            switch: if e.result.should_switch { "yes" } else { "" }.into(),
            scene: e.result.recommended_scene.clone().unwrap_or_default(),
            reasoning: e.result.reasoning.clone(),
        }
    }
}

pub fn handle(args: &EvaluateArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let frames = match args.input {
        Some(ref path) => util::read_observations(BufReader::new(File::open(path)?))?,
        None => util::read_observations(io::stdin().lock())?,
    };
    let mut engine = util::open_engine(cfg)?;

    let mut evaluations = Vec::with_capacity(frames.len());
    for frame in frames {
        let (timestamp, emotion) = (frame.timestamp, frame.emotion.clone());
        let result = engine.observe(frame)?;
        if result.should_switch {
            if let Some(ref scene) = result.recommended_scene {
                let from = engine.current_scene().map(str::to_owned);
                engine.record_switch(from.as_deref(), scene, Some(&emotion));
            }
        }
        if result.should_switch || !args.switches_only {
            evaluations.push(Evaluation {
                timestamp,
                emotion,
                result,
            });
        }
    }

    let out = output::render_list(
        global.output,
        &evaluations,
        |e| EvaluationRow::from(e),
        |e| {
            format!(
                "{:.2} {} {}",
                e.timestamp,
                e.emotion,
                if e.result.should_switch {
                    e.result.recommended_scene.as_deref().unwrap_or("-")
                } else {
                    "-"
                }
            )
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
