//! System event monitoring: sleep/resume and wall-clock jumps.
//!
//! An armed wake-up is only as good as the clock it was computed against.
//! Two kernel-level mechanisms catch the cases where that clock lies:
//!
//! - systemd-logind's `PrepareForSleep` D-Bus signal tells us when the
//!   machine resumes from suspend, at which point the armed wake-up may be
//!   hours behind reality;
//! - a `timerfd` armed with `TFD_TIMER_CANCEL_ON_SET` returns `ECANCELED`
//!   whenever the realtime clock is set discontinuously (manual change, NTP
//!   step).
//!
//! Both monitors run in their own thread and translate events into
//! [`SignalMessage`]s for the daemon loop, which responds by refreshing the
//! scheduler. Either monitor failing to start is logged and tolerated; the
//! scheduler still self-corrects on its next firing.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::sync::mpsc::Sender;
use std::thread;
use zbus::blocking::Connection;

use crate::signals::SignalMessage;

/// D-Bus proxy for the systemd-logind Manager interface.
#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LogindManager {
    /// `start` is true when going to sleep, false when resuming.
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// Spawn the sleep/resume and clock-change monitor threads.
pub fn start_system_monitors(signal_sender: Sender<SignalMessage>, debug_enabled: bool) {
    let sleep_sender = signal_sender.clone();
    thread::spawn(move || {
        if let Err(e) = monitor_sleep_signals(sleep_sender, debug_enabled) {
            log_pipe!();
            log_warning!("Sleep monitor unavailable: {e:#}");
            log_indented!("Resume events will not trigger an immediate re-check");
        }
    });

    thread::spawn(move || {
        if let Err(e) = monitor_clock_changes(signal_sender, debug_enabled) {
            log_pipe!();
            log_warning!("Clock change monitor unavailable: {e:#}");
            log_indented!("Manual clock adjustments will not trigger an immediate re-check");
        }
    });
}

/// Block on logind's PrepareForSleep signals and forward resume events.
fn monitor_sleep_signals(sender: Sender<SignalMessage>, debug_enabled: bool) -> Result<()> {
    let connection = Connection::system().context("failed to connect to the system D-Bus")?;
    let proxy =
        LogindManagerProxyBlocking::new(&connection).context("failed to create logind proxy")?;
    let mut sleep_signals = proxy
        .receive_prepare_for_sleep()
        .context("failed to subscribe to PrepareForSleep")?;

    if debug_enabled {
        log_debug!("Subscribed to systemd-logind PrepareForSleep signals");
    }

    loop {
        let Some(signal) = sleep_signals.next() else {
            anyhow::bail!("D-Bus connection lost");
        };
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                log_warning!("Unreadable PrepareForSleep signal: {e}");
                continue;
            }
        };

        if args.start {
            log_pipe!();
            log_info!("System entering sleep");
        } else {
            log_pipe!();
            log_info!("System resumed from sleep");
            if sender.send(SignalMessage::Wake).is_err() {
                // Daemon loop gone; normal exit.
                return Ok(());
            }
        }
    }
}

/// Detector for discontinuous realtime clock changes.
struct ClockChangeDetector {
    timer: TimerFd,
}

impl ClockChangeDetector {
    fn new() -> nix::Result<Self> {
        let timer = TimerFd::new(ClockId::CLOCK_REALTIME, TimerFlags::empty())?;
        let mut detector = ClockChangeDetector { timer };
        detector.arm()?;
        Ok(detector)
    }

    fn arm(&mut self) -> nix::Result<()> {
        let flags =
            TimerSetTimeFlags::TFD_TIMER_ABSTIME | TimerSetTimeFlags::TFD_TIMER_CANCEL_ON_SET;
        // Armed far in the future; the only expected outcome is ECANCELED
        // when the clock is set.
        let far_future = TimeSpec::new(i64::MAX / 1000, 0);
        self.timer.set(Expiration::OneShot(far_future), flags)?;
        Ok(())
    }

    /// Block until the clock changes. Returns after re-arming.
    fn wait(&mut self) -> Result<()> {
        match self.timer.wait() {
            // ECANCELED is the signal we are here for.
            Err(Errno::ECANCELED) => {
                self.arm().context("failed to re-arm after clock change")?;
                Ok(())
            }
            // A normal expiry should not happen with a far-future target;
            // it can occur when the clock is stepped far forward. Treat it
            // the same way.
            Ok(_) => {
                self.arm().context("failed to re-arm after expiry")?;
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("timerfd wait failed: {e}")),
        }
    }
}

fn monitor_clock_changes(sender: Sender<SignalMessage>, debug_enabled: bool) -> Result<()> {
    let mut detector = ClockChangeDetector::new().context("failed to create timerfd detector")?;

    if debug_enabled {
        log_debug!("Watching for realtime clock changes via timerfd");
    }

    loop {
        detector.wait()?;
        log_pipe!();
        log_info!("System clock changed");
        if sender.send(SignalMessage::ClockChanged).is_err() {
            return Ok(());
        }
    }
}
