//! Appearance theme model and the command-backed applicator.
//!
//! The desktop is switched between light and dark by running a shell command
//! per theme. The defaults target the freedesktop `color-scheme` preference
//! through gsettings; both commands can be overridden in the config so the
//! same binary works on compositors that use a different mechanism.

use anyhow::{Context, Result, anyhow, bail};
use std::ops::Not;
use std::process::Command;
use std::sync::Mutex;

use crate::constants::{DEFAULT_DARK_COMMAND, DEFAULT_LIGHT_COMMAND};

/// System appearance theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Not for Theme {
    type Output = Theme;

    fn not(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("unknown theme '{other}' (expected 'light' or 'dark')")),
        }
    }
}

/// Applies a theme to the system. Side-effect only; implementations must be
/// idempotent so the scheduler can re-apply without visible churn.
pub trait ThemeApplicator: Send + Sync {
    fn apply(&self, theme: Theme) -> Result<()>;
}

struct ThemeCommands {
    light: String,
    dark: String,
}

/// Theme applicator that shells out to a configurable command per theme.
///
/// Remembers the last theme it applied successfully and skips re-running the
/// command for it, which keeps repeated scheduler firings and manual
/// `nightfall light`/`dark` invocations quiet. Commands can be swapped at
/// runtime on config reload.
pub struct CommandApplicator {
    commands: Mutex<ThemeCommands>,
    last_applied: Mutex<Option<Theme>>,
}

impl CommandApplicator {
    pub fn new(light_command: String, dark_command: String) -> Self {
        Self {
            commands: Mutex::new(ThemeCommands {
                light: light_command,
                dark: dark_command,
            }),
            last_applied: Mutex::new(None),
        }
    }

    /// Build from config, falling back to the gsettings defaults.
    pub fn from_config(config: &crate::config::Config) -> Self {
        let (light, dark) = Self::commands_from(config);
        Self::new(light, dark)
    }

    /// Replace the commands after a config reload.
    pub fn update_from_config(&self, config: &crate::config::Config) {
        let (light, dark) = Self::commands_from(config);
        *self.commands.lock().unwrap() = ThemeCommands { light, dark };
    }

    fn commands_from(config: &crate::config::Config) -> (String, String) {
        (
            config
                .light_command
                .clone()
                .unwrap_or_else(|| DEFAULT_LIGHT_COMMAND.to_string()),
            config
                .dark_command
                .clone()
                .unwrap_or_else(|| DEFAULT_DARK_COMMAND.to_string()),
        )
    }

    fn command_for(&self, theme: Theme) -> String {
        let commands = self.commands.lock().unwrap();
        match theme {
            Theme::Light => commands.light.clone(),
            Theme::Dark => commands.dark.clone(),
        }
    }
}

impl ThemeApplicator for CommandApplicator {
    fn apply(&self, theme: Theme) -> Result<()> {
        let mut last = self.last_applied.lock().unwrap();
        if *last == Some(theme) {
            return Ok(());
        }

        let command = self.command_for(theme);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .with_context(|| format!("failed to run {theme} theme command"))?;

        if !status.success() {
            bail!("{theme} theme command exited with {status}");
        }

        *last = Some(theme);
        Ok(())
    }
}

/// Read the current system theme from the gsettings color-scheme key.
pub fn detect_current_theme() -> Result<Theme> {
    let output = Command::new("gsettings")
        .args(["get", "org.gnome.desktop.interface", "color-scheme"])
        .output()
        .context("failed to query gsettings for the current color scheme")?;

    if !output.status.success() {
        bail!("gsettings query exited with {}", output.status);
    }

    let value = String::from_utf8_lossy(&output.stdout);
    if value.contains("prefer-dark") {
        Ok(Theme::Dark)
    } else {
        Ok(Theme::Light)
    }
}
