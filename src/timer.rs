//! Deferred wake-up scheduling primitive.
//!
//! The scheduler does not own threads or sleeps; it asks a [`WakeupScheduler`]
//! for "run this callback after this delay, within this tolerance" and holds
//! on to the returned handle. The contract is deliberately small: the
//! callback runs at-or-after the requested delay (within tolerance), and a
//! canceled or dropped handle means the callback does not run.
//!
//! Because wake-ups may be coalesced by the underlying mechanism, callers
//! must treat a fire that is earlier than its target instant as spurious and
//! re-defer; the scheduler does exactly that.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Cancelation handle for a scheduled wake-up.
///
/// Dropping the handle cancels the wake-up; [`WakeupHandle::cancel`] does the
/// same explicitly. After either, the callback will not start. A callback
/// that is already running is not interrupted; callers needing a hard
/// barrier serialize through their own state (the scheduler checks its
/// activation state inside the callback).
pub struct WakeupHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WakeupHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the wake-up.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WakeupHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Deferred execution capability.
pub trait WakeupScheduler: Send + Sync {
    /// Schedule `callback` to run once, `after` from now, give or take
    /// `tolerance`.
    fn schedule(
        &self,
        after: Duration,
        tolerance: Duration,
        callback: Box<dyn FnOnce() + Send>,
    ) -> WakeupHandle;
}

/// Thread-backed wake-up scheduler.
///
/// Each scheduled wake-up parks a thread on a channel; cancelation is a
/// message on that channel, so a canceled wake-up unblocks immediately
/// instead of sleeping out its delay. Tolerance is accepted for the trait
/// contract but not exploited; this implementation fires at the delay.
pub struct ThreadWakeup;

impl WakeupScheduler for ThreadWakeup {
    fn schedule(
        &self,
        after: Duration,
        _tolerance: Duration,
        callback: Box<dyn FnOnce() + Send>,
    ) -> WakeupHandle {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        thread::spawn(move || match cancel_rx.recv_timeout(after) {
            Err(RecvTimeoutError::Timeout) => callback(),
            // Explicit cancel, or the handle was dropped.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        });

        WakeupHandle::new(move || {
            let _ = cancel_tx.send(());
        })
    }
}

/// Test wake-up scheduler whose entries are fired by hand.
///
/// Entries never fire on their own; tests call [`ManualWakeup::fire_next`]
/// whenever they want, including "early" relative to the requested delay.
#[cfg(any(test, feature = "testing-support"))]
pub struct ManualWakeup {
    entries: std::sync::Arc<std::sync::Mutex<Vec<ManualEntry>>>,
}

#[cfg(any(test, feature = "testing-support"))]
struct ManualEntry {
    after: Duration,
    canceled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl ManualWakeup {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Number of scheduled entries that are neither fired nor canceled.
    pub fn pending(&self) -> usize {
        use std::sync::atomic::Ordering;
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.callback.is_some() && !entry.canceled.load(Ordering::SeqCst))
            .count()
    }

    /// Delay of the most recently scheduled entry.
    pub fn last_delay(&self) -> Option<Duration> {
        self.entries.lock().unwrap().last().map(|entry| entry.after)
    }

    /// Fire the oldest pending entry. Returns false if nothing was pending.
    pub fn fire_next(&self) -> bool {
        use std::sync::atomic::Ordering;
        let callback = {
            let mut entries = self.entries.lock().unwrap();
            let mut taken = None;
            for entry in entries.iter_mut() {
                if entry.canceled.load(Ordering::SeqCst) {
                    entry.callback = None;
                    continue;
                }
                if let Some(callback) = entry.callback.take() {
                    taken = Some(callback);
                    break;
                }
            }
            taken
        };
        // Run outside the lock: the callback will typically schedule the
        // next wake-up on this same scheduler.
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl Default for ManualWakeup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl WakeupScheduler for ManualWakeup {
    fn schedule(
        &self,
        after: Duration,
        _tolerance: Duration,
        callback: Box<dyn FnOnce() + Send>,
    ) -> WakeupHandle {
        use std::sync::atomic::{AtomicBool, Ordering};

        let canceled = std::sync::Arc::new(AtomicBool::new(false));
        self.entries.lock().unwrap().push(ManualEntry {
            after,
            canceled: canceled.clone(),
            callback: Some(callback),
        });

        WakeupHandle::new(move || canceled.store(true, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn thread_wakeup_fires_after_delay() {
        let (tx, rx) = channel();
        let _handle = ThreadWakeup.schedule(
            Duration::from_millis(10),
            Duration::ZERO,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        // _handle stays alive until after the fire
        rx.recv_timeout(Duration::from_secs(2))
            .expect("wakeup did not fire");
    }

    #[test]
    fn canceled_wakeup_never_fires() {
        let (tx, rx) = channel();
        let handle = ThreadWakeup.schedule(
            Duration::from_millis(30),
            Duration::ZERO,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        handle.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn dropping_the_handle_cancels() {
        let (tx, rx) = channel();
        {
            let _handle = ThreadWakeup.schedule(
                Duration::from_millis(30),
                Duration::ZERO,
                Box::new(move || {
                    let _ = tx.send(());
                }),
            );
        }
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn manual_wakeup_fires_in_order_and_respects_cancel() {
        let wakeup = ManualWakeup::new();
        let (tx, rx) = channel();

        let tx1 = tx.clone();
        let first = wakeup.schedule(
            Duration::from_secs(1),
            Duration::ZERO,
            Box::new(move || {
                let _ = tx1.send(1);
            }),
        );
        let tx2 = tx.clone();
        let _second = wakeup.schedule(
            Duration::from_secs(2),
            Duration::ZERO,
            Box::new(move || {
                let _ = tx2.send(2);
            }),
        );
        assert_eq!(wakeup.pending(), 2);

        first.cancel();
        assert_eq!(wakeup.pending(), 1);

        assert!(wakeup.fire_next());
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(!wakeup.fire_next());
    }
}
