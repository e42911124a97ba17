//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod evaluate;
pub mod feedback;
pub mod mappings;
pub mod run;
pub mod scenes;
pub mod status;
pub mod util;

use scenepilot_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the loaded config.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Scenes(args) => scenes::handle(args, cfg, global).await,
        Command::Status => status::handle(cfg, global).await,
        Command::Run(args) => run::handle(args, cfg, global).await,
        Command::Evaluate(args) => evaluate::handle(&args, cfg, global),
        Command::Mappings(args) => mappings::handle(args, cfg, global),
        Command::Feedback(args) => feedback::handle(&args, cfg, global),
        Command::Config(args) => config_cmd::handle(args, global),
    }
}
