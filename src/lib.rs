//! # Nightfall Library
//!
//! Internal library for the nightfall binary.
//!
//! Nightfall switches the desktop between light and dark appearance, either
//! on demand (CLI subcommands) or automatically at sunrise and sunset for a
//! configured location.
//!
//! ## Architecture
//!
//! - **Core**: [`scheduler`] owns the transition state machine. It computes
//!   the next sunrise/sunset transition, arms one deferred wake-up for it,
//!   applies the theme when it fires, and re-arms itself
//! - **Collaborators**: [`location`] (coalesced location state with
//!   replay-on-subscribe), [`solar`] (sunrise/sunset ephemeris), [`theme`]
//!   (idempotent theme application), [`timer`] (cancelable deferred
//!   wake-ups), [`time_source`] (injectable clock)
//! - **Configuration**: [`config`] for TOML settings with hot reload
//! - **Infrastructure**: [`signals`] and [`dbus`] feed the daemon loop with
//!   shutdown/reload/resume/clock-change events; [`logger`] provides the
//!   structured output macros
//! - **CLI**: [`args`] parsing and the one-shot [`commands`]

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod commands;
pub mod config;
pub mod constants;
pub mod dbus;
pub mod location;
pub mod scheduler;
pub mod signals;
pub mod solar;
pub mod theme;
pub mod time_source;
pub mod timer;

// Re-exports for the binary and integration tests
pub use scheduler::{ActivationState, SchedulerSettings, Transition, TransitionScheduler};
pub use theme::Theme;
