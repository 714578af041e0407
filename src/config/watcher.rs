//! File watching for hot config reloading.
//!
//! Watches the directory containing `nightfall.toml` and sends a reload
//! signal to the daemon loop whenever the file changes. Watching the parent
//! directory rather than the file itself survives the rename-into-place
//! dance most editors do on save.

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use super::Config;
use crate::constants::CONFIG_DEBOUNCE_MS;
use crate::signals::SignalMessage;

/// Start watching the configuration file for changes.
///
/// Spawns a background thread that debounces change events and sends
/// [`SignalMessage::Reload`] to the daemon loop.
pub fn start_config_watcher(signal_sender: Sender<SignalMessage>, debug_enabled: bool) -> Result<()> {
    let config_path = Config::get_config_path()?;
    let watch_dir = config_path
        .parent()
        .context("config path has no parent directory")?
        .to_path_buf();
    let file_name = config_path
        .file_name()
        .context("config path has no file name")?
        .to_os_string();

    if debug_enabled {
        log_pipe!();
        log_debug!("Watching {} for config changes", config_path.display());
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                        let _ = tx.send(event);
                    }
                    _ => {}
                }
            }
        },
        NotifyConfig::default(),
    )
    .context("failed to create file watcher")?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_dir.display()))?;

    thread::spawn(move || {
        // The watcher stops when dropped; keep it alive in the thread.
        let _watcher = watcher;
        let mut last_reload: Option<Instant> = None;

        for event in rx {
            let affects_config = event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(file_name.as_os_str()));
            if !affects_config {
                continue;
            }

            // Collapse the burst of events an editor save produces.
            if let Some(last) = last_reload {
                if last.elapsed() < Duration::from_millis(CONFIG_DEBOUNCE_MS) {
                    continue;
                }
            }

            if signal_sender.send(SignalMessage::Reload).is_err() {
                // Daemon loop is gone; nothing left to notify.
                break;
            }
            last_reload = Some(Instant::now());
        }
    });

    Ok(())
}
