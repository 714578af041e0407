//! Configuration system for nightfall with validation and hot reload.
//!
//! Configuration lives in `$XDG_CONFIG_HOME/nightfall/nightfall.toml`. A
//! commented default file is generated on first run. All keys are optional:
//!
//! ```toml
//! #[Automatic transitions]
//! auto = true              # Switch themes automatically at sunrise/sunset
//!
//! #[Location]
//! latitude = 37.7749       # Geographic latitude (-90 to 90)
//! longitude = -122.4194    # Geographic longitude (-180 to 180)
//!
//! #[Theme commands]
//! light_command = "gsettings set org.gnome.desktop.interface color-scheme prefer-light"
//! dark_command = "gsettings set org.gnome.desktop.interface color-scheme prefer-dark"
//! ```
//!
//! Validation rejects out-of-range coordinates and a latitude without a
//! longitude (or vice versa) with messages that point at the fix. The
//! [`watcher`] submodule feeds reload signals to the daemon when the file
//! changes on disk.

pub mod watcher;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_DARK_COMMAND, DEFAULT_LIGHT_COMMAND};

pub use watcher::start_config_watcher;

/// Application configuration. Every field is optional; defaults apply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Whether automatic sunrise/sunset transitions are enabled.
    pub auto: Option<bool>,
    /// Geographic latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Geographic longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Command run to switch to the light theme.
    pub light_command: Option<String>,
    /// Command run to switch to the dark theme.
    pub dark_command: Option<String>,
}

const DEFAULT_CONFIG: &str = r#"#[Automatic transitions]
auto = false             # Switch themes automatically at sunrise/sunset

#[Location]
# Required for automatic transitions.
# latitude = 37.7749     # Geographic latitude (-90 to 90)
# longitude = -122.4194  # Geographic longitude (-180 to 180)

#[Theme commands]
# Override how themes are applied. The defaults set the freedesktop
# color-scheme preference via gsettings.
# light_command = "gsettings set org.gnome.desktop.interface color-scheme prefer-light"
# dark_command = "gsettings set org.gnome.desktop.interface color-scheme prefer-dark"
"#;

impl Config {
    /// Whether automatic transitions are switched on.
    pub fn auto_enabled(&self) -> bool {
        self.auto.unwrap_or(false)
    }

    /// Path of the configuration file.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine the config directory")?;
        Ok(config_dir.join("nightfall").join("nightfall.toml"))
    }

    /// Load the configuration, creating a commented default file first if
    /// none exists yet.
    pub fn load() -> Result<Config> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            create_default_config(&config_path)
                .context("failed to create the default configuration")?;
            log_block_start!("Created default configuration");
            log_indented!("{}", config_path.display());
        }
        Self::load_from_path(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))
    }

    /// Load and validate a configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents).context("invalid TOML")?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Log the effective configuration in the structured block style.
    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        log_indented!(
            "Automatic transitions: {}",
            if self.auto_enabled() { "enabled" } else { "disabled" }
        );
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                log_indented!("Location: {latitude:.4}°, {longitude:.4}°");
            }
            _ => {
                log_indented!("Location: not configured");
            }
        }
        log_indented!(
            "Light command: {}",
            self.light_command.as_deref().unwrap_or(DEFAULT_LIGHT_COMMAND)
        );
        log_indented!(
            "Dark command: {}",
            self.dark_command.as_deref().unwrap_or(DEFAULT_DARK_COMMAND)
        );
    }
}

/// Write the commented default configuration file.
fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG).with_context(|| format!("failed to write {}", path.display()))
}

fn validate_config(config: &Config) -> Result<()> {
    match (config.latitude, config.longitude) {
        (Some(latitude), _) if !(-90.0..=90.0).contains(&latitude) => {
            bail!("latitude {latitude} is out of range (-90 to 90)")
        }
        (_, Some(longitude)) if !(-180.0..=180.0).contains(&longitude) => {
            bail!("longitude {longitude} is out of range (-180 to 180)")
        }
        (Some(_), None) => {
            bail!("latitude is set but longitude is missing; configure both or neither")
        }
        (None, Some(_)) => {
            bail!("longitude is set but latitude is missing; configure both or neither")
        }
        _ => {}
    }

    if config.auto_enabled() && config.latitude.is_none() {
        log_pipe!();
        log_warning!("auto = true but no coordinates are configured");
        log_indented!("Automatic transitions stay idle until latitude/longitude are set");
    }

    Ok(())
}
