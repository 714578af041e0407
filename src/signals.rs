//! Signal handling for the daemon.
//!
//! All asynchronous inputs to the daemon loop arrive as [`SignalMessage`]
//! values on one channel: POSIX signals, config file changes, and the system
//! event monitors. The loop blocks on the channel; the scheduler itself runs
//! on its own wake-up callbacks and needs nothing from here.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR2},
    iterator::Signals,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, Sender},
};
use std::thread;

/// Unified message type for everything the daemon loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// Reload the configuration (SIGUSR2 or a config file change).
    Reload,
    /// Shut down (SIGINT, SIGTERM, SIGHUP).
    Shutdown,
    /// The system resumed from sleep; the schedule needs revalidation.
    Wake,
    /// The wall clock jumped; the schedule needs revalidation.
    ClockChanged,
}

/// Shared signal handling state.
pub struct SignalState {
    /// False once a shutdown signal arrived.
    pub running: Arc<AtomicBool>,
    /// Receiving end for the daemon loop.
    pub receiver: Receiver<SignalMessage>,
    /// Cloneable sender for the watcher and monitor threads.
    pub sender: Sender<SignalMessage>,
}

/// Install the signal handler thread and build the message channel.
pub fn setup_signal_handler() -> Result<SignalState> {
    let (sender, receiver) = std::sync::mpsc::channel();
    let running = Arc::new(AtomicBool::new(true));

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR2])
        .context("failed to register signal handlers")?;

    let tx = sender.clone();
    let running_flag = running.clone();
    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGUSR2 => {
                    if tx.send(SignalMessage::Reload).is_err() {
                        break;
                    }
                }
                SIGINT | SIGTERM | SIGHUP => {
                    running_flag.store(false, Ordering::SeqCst);
                    let _ = tx.send(SignalMessage::Shutdown);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(SignalState {
        running,
        receiver,
        sender,
    })
}
