//! CLI subcommands.
//!
//! Each subcommand is a one-shot operation sharing the daemon's config and
//! theme plumbing: `toggle`/`light`/`dark` apply a theme immediately,
//! `status` shows the configured location and the next computed transition.

pub mod set;
pub mod status;
pub mod toggle;
