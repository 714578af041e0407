//! The `toggle` subcommand: flip the current theme once.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::theme::{self, CommandApplicator, ThemeApplicator};

pub fn handle_toggle_command() -> Result<()> {
    let config = Config::load()?;
    let current = theme::detect_current_theme()
        .context("could not determine the current theme to toggle from")?;
    let target = !current;

    let applicator = CommandApplicator::from_config(&config);
    applicator.apply(target)?;

    log_block_start!("Switched to {target} theme");
    log_end!();
    Ok(())
}
