//! Main application entry point and daemon flow.
//!
//! The interesting logic lives in the library; this binary parses the CLI,
//! dispatches one-shot subcommands, and for `run` wires the scheduler to its
//! collaborators and then blocks on the signal channel:
//!
//! 1. Argument parsing and early exit for help/version
//! 2. Instance lock (one daemon per session)
//! 3. Configuration loading and collaborator construction
//! 4. Scheduler activation (when `auto` is enabled)
//! 5. Event loop: shutdown, config reload, resume and clock-change events
//! 6. Graceful cleanup on shutdown
//!
//! The daemon loop never polls: the scheduler runs entirely on its own
//! wake-up callbacks, so the loop just blocks on the channel the signal
//! handler, config watcher and system monitors feed.

use anyhow::{Context, Result, bail};
use chrono::Local;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use nightfall::args::{self, CliAction, ParsedArgs};
use nightfall::commands;
use nightfall::config::{Config, start_config_watcher};
use nightfall::constants::{COALESCE_THRESHOLD_KM, EXIT_FAILURE};
use nightfall::dbus::start_system_monitors;
use nightfall::location::LocationService;
use nightfall::scheduler::{SchedulerSettings, TransitionScheduler};
use nightfall::signals::{SignalMessage, setup_signal_handler};
use nightfall::solar::EphemerisCalculator;
use nightfall::theme::CommandApplicator;
use nightfall::time_source::{SystemClock, TimeSource};
use nightfall::timer::ThreadWakeup;
use nightfall::{
    log_block_start, log_debug, log_end, log_error, log_indented, log_pipe, log_version,
    log_warning,
};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run { debug_enabled } => run_daemon(debug_enabled),
        CliAction::Toggle => commands::toggle::handle_toggle_command(),
        CliAction::SetTheme { theme } => commands::set::handle_set_command(theme),
        CliAction::Status => commands::status::handle_status_command(),
    }
}

/// Run the daemon until a shutdown signal arrives.
fn run_daemon(debug_enabled: bool) -> Result<()> {
    log_version!();
    if debug_enabled {
        log_pipe!();
        log_debug!("Debug logging enabled");
    }

    // Held (and cleaned up) for the daemon's whole lifetime.
    let _lock = acquire_instance_lock()?;

    let signal_state = setup_signal_handler()?;

    let mut config = Config::load()?;
    config.log_config();

    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let location = Arc::new(LocationService::new(COALESCE_THRESHOLD_KM));
    let applicator = Arc::new(CommandApplicator::from_config(&config));
    let scheduler = TransitionScheduler::new(
        location.clone(),
        Arc::new(EphemerisCalculator),
        applicator.clone(),
        Arc::new(ThreadWakeup),
        clock.clone(),
        SchedulerSettings::default(),
    );

    // The scheduler announces each planned transition in UTC; add the local
    // wall time for the humans reading the log.
    scheduler.set_transition_listener(|next| {
        if let Some(transition) = next {
            log_indented!(
                "Local time: {}",
                transition.at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
    });

    location.apply_config(&config, clock.as_ref());
    if config.auto_enabled() {
        scheduler.activate();
    } else {
        log_block_start!("Automatic transitions are disabled (auto = false)");
        log_indented!("The daemon stays up and reacts to config changes");
    }

    if let Err(e) = start_config_watcher(signal_state.sender.clone(), debug_enabled) {
        log_pipe!();
        log_warning!("Config hot reload unavailable: {e:#}");
        log_indented!("Send SIGUSR2 to reload manually");
    }
    start_system_monitors(signal_state.sender.clone(), debug_enabled);

    loop {
        match signal_state.receiver.recv() {
            Ok(SignalMessage::Shutdown) => break,
            Ok(SignalMessage::Reload) => match Config::load() {
                Ok(new_config) => {
                    log_block_start!("Configuration reloaded");
                    config = new_config;
                    if debug_enabled {
                        config.log_config();
                    }
                    applicator.update_from_config(&config);
                    location.apply_config(&config, clock.as_ref());
                    if config.auto_enabled() {
                        scheduler.activate();
                    } else {
                        scheduler.deactivate();
                    }
                }
                Err(e) => {
                    log_pipe!();
                    log_warning!("Failed to reload configuration: {e:#}");
                    log_indented!("Keeping the previous configuration");
                }
            },
            Ok(SignalMessage::Wake) => {
                log_block_start!("Revalidating schedule after resume");
                scheduler.refresh();
            }
            Ok(SignalMessage::ClockChanged) => {
                log_block_start!("Revalidating schedule after clock change");
                scheduler.refresh();
            }
            // Every sender hung up; nothing can reach us anymore.
            Err(_) => break,
        }
        if !signal_state.running.load(Ordering::SeqCst) {
            break;
        }
    }

    scheduler.deactivate();
    log_block_start!("Shutting down nightfall...");
    log_end!();
    Ok(())
}

/// Guard for the single-instance lock file. Unlocks and removes it on drop.
struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the per-session instance lock, cleaning up a stale one if its
/// owner is gone.
fn acquire_instance_lock() -> Result<InstanceLock> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    let path = PathBuf::from(format!("{runtime_dir}/nightfall.lock"));

    // Open without truncating so losing the race cannot wipe the winner's
    // PID before we inspect it.
    let mut lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;

    if lock_file.try_lock_exclusive().is_ok() {
        write_lock_info(&mut lock_file)?;
        return Ok(InstanceLock {
            file: lock_file,
            path,
        });
    }

    if let Some(pid) = read_lock_pid(&path) {
        if is_process_running(pid) {
            log_pipe!();
            log_error!("nightfall is already running (PID: {pid})");
            log_end!();
            bail!("another nightfall instance is running");
        }
        log_pipe!();
        log_warning!("Removing stale lock file (process {pid} no longer running)");
    }

    let _ = std::fs::remove_file(&path);
    let mut retry = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    retry
        .try_lock_exclusive()
        .context("could not acquire the instance lock")?;
    write_lock_info(&mut retry)?;
    Ok(InstanceLock { file: retry, path })
}

fn write_lock_info(file: &mut File) -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(())
}

fn read_lock_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

fn is_process_running(pid: u32) -> bool {
    // Signal 0 probes for existence without sending anything.
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
