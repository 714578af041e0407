//! Automatic light/dark transition scheduling.
//!
//! The [`TransitionScheduler`] owns a small state machine: while activated it
//! subscribes to the [`LocationService`], computes the next sunrise/sunset
//! transition for the current coordinate, and keeps at most one deferred
//! wake-up armed for it. When the wake-up legitimately fires it applies the
//! theme exactly once and immediately re-arms for the following transition.
//!
//! All failure modes are absorbed locally:
//! - a solar calculation error or an exhausted search window arms a periodic
//!   fallback refresh instead of a transition,
//! - a wake-up that fires before its target instant (scheduler tolerance)
//!   re-defers silently without side effects,
//! - a freshly computed target that already slipped into the past is treated
//!   as stale and recomputed with a fresh clock reading, never armed as a
//!   non-positive delay.
//!
//! The scheduler never runs on a thread of its own; it executes inside the
//! location and wake-up callbacks, serialized by its internal mutex. That
//! mutex is also what makes `deactivate()` total: the theme applicator is
//! only ever invoked under the lock after re-checking the activation state
//! and wake-up generation, so once `deactivate()` returns no further theme
//! application can happen.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::constants::{FALLBACK_REFRESH, SEARCH_BUDGET_DAYS, STALE_RETRY_LIMIT, WAKEUP_TOLERANCE};
use crate::location::{Coordinate, LocationObserver, LocationService, LocationState};
use crate::solar::{SolarCalculator, SolarOutcome};
use crate::theme::{Theme, ThemeApplicator};
use crate::time_source::TimeSource;
use crate::timer::{WakeupHandle, WakeupScheduler};

const OBSERVER_KEY: &str = "transition-scheduler";

/// A planned future appearance change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub theme: Theme,
    pub at: DateTime<Utc>,
}

/// Result of a bounded transition search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchOutcome {
    /// The next transition within the search window.
    Transition(Transition),
    /// No sunrise or sunset qualifies within the window. Expected near the
    /// poles during continuous day or night; distinct from a calculation
    /// error.
    NoTransitionFound,
}

/// Activation state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Not subscribed, nothing armed.
    Deactivated,
    /// Subscribed, but no usable location or no armed wake-up yet.
    Idle,
    /// Subscribed with a wake-up armed for a transition or a refresh.
    Armed,
}

/// Tunables for the scheduler, defaulting to the crate constants.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// How many days beyond today the search may look ahead.
    pub search_budget_days: u32,
    /// Tolerance handed to the wake-up scheduler.
    pub tolerance: Duration,
    /// Re-check interval when no transition could be computed.
    pub fallback_refresh: Duration,
    /// How many stale results to tolerate before falling back.
    pub stale_retry_limit: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            search_budget_days: SEARCH_BUDGET_DAYS,
            tolerance: WAKEUP_TOLERANCE,
            fallback_refresh: FALLBACK_REFRESH,
            stale_retry_limit: STALE_RETRY_LIMIT,
        }
    }
}

/// Find the next transition at `coordinate`, strictly after `now`.
///
/// Walks candidate dates one day at a time. For each date with both solar
/// events the checks run in order: a future sunrise means the next change is
/// to light, a future sunset means dark. Comparisons are strict, so `now`
/// exactly at sunrise resolves to that day's sunset rather than re-triggering
/// the sunrise that just fired.
///
/// A date's solar events can land on the neighboring UTC date at extreme
/// longitudes, so the scan starts one day back; the strict comparisons
/// discard anything already past. A calculator error aborts the whole search.
pub fn next_transition(
    calculator: &dyn SolarCalculator,
    coordinate: Coordinate,
    now: DateTime<Utc>,
    budget_days: u32,
) -> Result<SearchOutcome> {
    let mut date = (now - ChronoDuration::days(1)).date_naive();

    for _ in 0..(budget_days + 2) {
        match calculator.solar_events(date, coordinate)? {
            SolarOutcome::Events(events) => {
                if now < events.sunrise {
                    return Ok(SearchOutcome::Transition(Transition {
                        theme: Theme::Light,
                        at: events.sunrise,
                    }));
                }
                if now < events.sunset {
                    return Ok(SearchOutcome::Transition(Transition {
                        theme: Theme::Dark,
                        at: events.sunset,
                    }));
                }
                // Both events already past on this date.
            }
            SolarOutcome::NoEvent => {}
        }
        date = date
            .succ_opt()
            .ok_or_else(|| anyhow!("calendar overflow while searching for a transition"))?;
    }

    Ok(SearchOutcome::NoTransitionFound)
}

/// What an armed wake-up is for.
#[derive(Debug, Clone, Copy)]
enum WakeupKind {
    /// Apply this transition, then re-arm.
    Transition(Transition),
    /// Periodic fallback: just re-run the search.
    Refresh { at: DateTime<Utc> },
}

impl WakeupKind {
    fn target(&self) -> DateTime<Utc> {
        match self {
            WakeupKind::Transition(transition) => transition.at,
            WakeupKind::Refresh { at } => *at,
        }
    }
}

type TransitionListener = Arc<dyn Fn(Option<Transition>) + Send + Sync>;

struct Inner {
    state: ActivationState,
    last_location: Option<LocationState>,
    next: Option<Transition>,
    armed: Option<WakeupHandle>,
    /// Bumped on every cancel/re-arm; a wake-up callback carrying an older
    /// generation is stale and must do nothing.
    generation: u64,
}

/// The transition scheduler. See the module docs for the state machine.
///
/// Collaborators are injected so tests can substitute scripted calendars,
/// manual clocks and hand-fired wake-ups.
pub struct TransitionScheduler {
    settings: SchedulerSettings,
    location: Arc<LocationService>,
    calculator: Arc<dyn SolarCalculator>,
    applicator: Arc<dyn ThemeApplicator>,
    wakeup: Arc<dyn WakeupScheduler>,
    clock: Arc<dyn TimeSource>,
    listener: Mutex<Option<TransitionListener>>,
    inner: Mutex<Inner>,
    weak_self: Weak<TransitionScheduler>,
}

impl TransitionScheduler {
    pub fn new(
        location: Arc<LocationService>,
        calculator: Arc<dyn SolarCalculator>,
        applicator: Arc<dyn ThemeApplicator>,
        wakeup: Arc<dyn WakeupScheduler>,
        clock: Arc<dyn TimeSource>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            settings,
            location,
            calculator,
            applicator,
            wakeup,
            clock,
            listener: Mutex::new(None),
            inner: Mutex::new(Inner {
                state: ActivationState::Deactivated,
                last_location: None,
                next: None,
                armed: None,
                generation: 0,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// Subscribe to location updates and start scheduling.
    ///
    /// Idempotent: calling while already activated does nothing, so no
    /// duplicate subscription or second wake-up can appear. Registration
    /// replays the current location state synchronously, which drives the
    /// first schedule before this returns.
    pub fn activate(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != ActivationState::Deactivated {
                return;
            }
            inner.state = ActivationState::Idle;
        }
        log_block_start!("Automatic transitions activated");
        let observer: Arc<dyn LocationObserver> = self.clone();
        self.location.register_observer(OBSERVER_KEY, &observer);
    }

    /// Cancel any armed wake-up and unsubscribe.
    ///
    /// Idempotent. After this returns, no theme application triggered by this
    /// scheduler can occur: a wake-up callback racing with us either finishes
    /// before we take the lock, or sees the deactivated state and bails.
    pub fn deactivate(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ActivationState::Deactivated {
                return;
            }
            inner.state = ActivationState::Deactivated;
            inner.generation += 1;
            inner.next = None;
            inner.last_location = None;
            inner.armed.take()
        };
        self.location.unregister_observer(OBSERVER_KEY);
        if let Some(handle) = handle {
            handle.cancel();
        }
        self.emit(None);
        log_block_start!("Automatic transitions deactivated");
    }

    /// Recompute and re-arm from the last known location.
    ///
    /// Hooked up to system resume and wall-clock jump events, where an armed
    /// wake-up may have drifted arbitrarily far from reality.
    pub fn refresh(&self) {
        let (changed, next) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ActivationState::Deactivated {
                return;
            }
            let before = inner.next;
            self.reschedule_locked(&mut inner);
            (inner.next != before, inner.next)
        };
        if changed {
            self.emit(next);
        }
    }

    /// The currently planned transition, if any. Read-only view for display.
    pub fn current_transition(&self) -> Option<Transition> {
        self.inner.lock().unwrap().next
    }

    pub fn activation_state(&self) -> ActivationState {
        self.inner.lock().unwrap().state
    }

    /// Install a listener invoked with every change of the planned
    /// transition. For display only; called outside the scheduler lock.
    pub fn set_transition_listener(
        &self,
        listener: impl Fn(Option<Transition>) + Send + Sync + 'static,
    ) {
        *self.listener.lock().unwrap() = Some(Arc::new(listener));
    }

    fn emit(&self, next: Option<Transition>) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(next);
        }
    }

    /// A wake-up fired. `generation` identifies the arming it belongs to.
    fn on_wakeup(&self, generation: u64, kind: WakeupKind) {
        let (changed, next);
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != ActivationState::Armed || inner.generation != generation {
                // Canceled or superseded while the callback was in flight.
                return;
            }

            let now = self.clock.now();
            let target = kind.target();
            if now < target {
                // Early wake from scheduler tolerance: re-defer without side
                // effects, keeping the planned transition as-is.
                let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
                log_decorated!(
                    "Wake-up fired {}s early; deferring",
                    (target - now).num_seconds()
                );
                self.arm_locked(&mut inner, kind, remaining);
                return;
            }

            if let WakeupKind::Transition(transition) = kind {
                log_block_start!("Switching to {} theme", transition.theme);
                if let Err(e) = self.applicator.apply(transition.theme) {
                    log_warning!("Failed to apply {} theme: {e:#}", transition.theme);
                    log_indented!("Continuing; the next transition will try again");
                }
            }

            // Re-arm for whatever comes next before leaving the callback.
            let before = inner.next;
            self.reschedule_locked(&mut inner);
            changed = inner.next != before;
            next = inner.next;
        }
        if changed {
            self.emit(next);
        }
    }

    /// Cancel-then-recompute-then-arm. Must hold the inner lock.
    ///
    /// The cancel always precedes the arm, so at no point can two wake-ups be
    /// armed, including when a location update interleaves with a firing.
    fn reschedule_locked(&self, inner: &mut Inner) {
        inner.generation += 1;
        inner.armed = None;
        inner.next = None;

        let Some(coordinate) = inner
            .last_location
            .as_ref()
            .and_then(LocationState::usable_coordinate)
        else {
            inner.state = ActivationState::Idle;
            return;
        };

        let mut stale_attempts = 0;
        loop {
            let now = self.clock.now();
            let outcome = next_transition(
                self.calculator.as_ref(),
                coordinate,
                now,
                self.settings.search_budget_days,
            );

            match outcome {
                Ok(SearchOutcome::Transition(transition)) => {
                    // Time may have passed during the search; never arm a
                    // wake-up for an instant that is no longer in the future.
                    let armed_now = self.clock.now();
                    match (transition.at - armed_now).to_std() {
                        Ok(delay) if !delay.is_zero() => {
                            inner.next = Some(transition);
                            self.arm_locked(inner, WakeupKind::Transition(transition), delay);
                            log_block_start!(
                                "Next transition: {} at {}",
                                transition.theme,
                                transition.at.format("%Y-%m-%d %H:%M:%S UTC")
                            );
                            return;
                        }
                        _ => {
                            stale_attempts += 1;
                            if stale_attempts >= self.settings.stale_retry_limit {
                                log_warning!(
                                    "Computed transitions kept landing in the past; falling back to periodic refresh"
                                );
                                self.arm_fallback_locked(inner);
                                return;
                            }
                        }
                    }
                }
                Ok(SearchOutcome::NoTransitionFound) => {
                    log_decorated!(
                        "No sunrise or sunset within the next {} days; re-checking in {} hours",
                        self.settings.search_budget_days,
                        self.settings.fallback_refresh.as_secs() / 3600
                    );
                    self.arm_fallback_locked(inner);
                    return;
                }
                Err(e) => {
                    log_warning!("Solar calculation failed: {e:#}");
                    log_indented!(
                        "Re-checking in {} hours",
                        self.settings.fallback_refresh.as_secs() / 3600
                    );
                    self.arm_fallback_locked(inner);
                    return;
                }
            }
        }
    }

    fn arm_fallback_locked(&self, inner: &mut Inner) {
        let at = self.clock.now()
            + ChronoDuration::from_std(self.settings.fallback_refresh)
                .unwrap_or_else(|_| ChronoDuration::hours(24));
        self.arm_locked(inner, WakeupKind::Refresh { at }, self.settings.fallback_refresh);
    }

    /// Arm a wake-up for `kind` after `delay`. Must hold the inner lock.
    fn arm_locked(&self, inner: &mut Inner, kind: WakeupKind, delay: Duration) {
        inner.generation += 1;
        let generation = inner.generation;
        let weak = self.weak_self.clone();
        let handle = self.wakeup.schedule(
            delay,
            self.settings.tolerance,
            Box::new(move || {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.on_wakeup(generation, kind);
                }
            }),
        );
        // Replacing the handle drops (and thereby cancels) any previous one.
        inner.armed = Some(handle);
        inner.state = ActivationState::Armed;
    }
}

impl LocationObserver for TransitionScheduler {
    fn location_state_changed(&self, state: &LocationState) {
        let (changed, next) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ActivationState::Deactivated {
                return;
            }
            inner.last_location = Some(state.clone());
            let before = inner.next;
            self.reschedule_locked(&mut inner);
            (inner.next != before, inner.next)
        };
        if changed {
            self.emit(next);
        }
    }
}
