//! The `light`/`dark` subcommands: apply a specific theme once.

use anyhow::Result;

use crate::config::Config;
use crate::theme::{CommandApplicator, Theme, ThemeApplicator};

pub fn handle_set_command(theme: Theme) -> Result<()> {
    let config = Config::load()?;
    let applicator = CommandApplicator::from_config(&config);
    applicator.apply(theme)?;

    log_block_start!("Applied {theme} theme");
    log_end!();
    Ok(())
}
