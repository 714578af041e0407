//! Location state and the coalescing publish/subscribe service.
//!
//! The scheduler's sole external input besides the clock is a stream of
//! [`LocationState`] values. The [`LocationService`] owns the current state
//! and a keyed observer registry with an explicit contract: registering
//! replays the current state once, and subsequent deliveries happen only for
//! authorization changes or position deltas at or above the coalescing
//! threshold. Fixes are fed from the configuration at startup and on hot
//! reload.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::time_source::TimeSource;

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Great-circle distance to another coordinate, in kilometers.
    pub fn distance_km(self, other: Coordinate) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let delta_phi = (other.latitude - self.latitude).to_radians();
        let delta_lambda = (other.longitude - self.longitude).to_radians();

        let a = (delta_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}°, {:.4}°", self.latitude, self.longitude)
    }
}

/// Whether a usable location may be produced at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAuthorization {
    /// A location source is configured and usable.
    Authorized,
    /// Nothing resolved yet.
    Unset,
    /// The user has to configure coordinates before auto mode can work.
    NeedsUserAction,
}

/// A resolved position and when it was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

/// The full location input consumed by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationState {
    pub authorization: LocationAuthorization,
    pub fix: Option<LocationFix>,
}

impl LocationState {
    /// The coordinate, if the state is authorized and has a fix.
    pub fn usable_coordinate(&self) -> Option<Coordinate> {
        if self.authorization != LocationAuthorization::Authorized {
            return None;
        }
        self.fix.map(|fix| fix.coordinate)
    }
}

/// Observer callback for coalesced location state changes.
pub trait LocationObserver: Send + Sync {
    fn location_state_changed(&self, state: &LocationState);
}

struct ServiceInner {
    state: LocationState,
    observers: HashMap<String, Weak<dyn LocationObserver>>,
}

/// Owns the current [`LocationState`] and delivers coalesced updates.
pub struct LocationService {
    threshold_km: f64,
    inner: Mutex<ServiceInner>,
}

impl LocationService {
    pub fn new(threshold_km: f64) -> Self {
        Self {
            threshold_km,
            inner: Mutex::new(ServiceInner {
                state: LocationState {
                    authorization: LocationAuthorization::Unset,
                    fix: None,
                },
                observers: HashMap::new(),
            }),
        }
    }

    /// Register an observer under a key, replaying the current state to it.
    ///
    /// Only a weak reference is kept; a dropped observer is pruned on the
    /// next delivery. Re-registering under the same key replaces the old
    /// observer.
    pub fn register_observer(&self, key: &str, observer: &Arc<dyn LocationObserver>) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .observers
                .insert(key.to_string(), Arc::downgrade(observer));
            inner.state.clone()
        };
        // Replay outside the lock so the observer may immediately call back
        // into the service.
        observer.location_state_changed(&snapshot);
    }

    /// Remove an observer. No further deliveries happen for its key.
    pub fn unregister_observer(&self, key: &str) {
        self.inner.lock().unwrap().observers.remove(key);
    }

    /// Current state snapshot.
    pub fn current_state(&self) -> LocationState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Update the authorization, notifying observers if it changed.
    pub fn set_authorization(&self, authorization: LocationAuthorization) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.authorization == authorization {
                return;
            }
            inner.state.authorization = authorization;
        }
        self.notify_observers();
    }

    /// Update the position fix, coalescing sub-threshold moves.
    pub fn update_fix(&self, coordinate: Coordinate, timestamp: DateTime<Utc>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(previous) = inner.state.fix {
                let delta_km = previous.coordinate.distance_km(coordinate);
                if delta_km < self.threshold_km {
                    return;
                }
            }
            inner.state.fix = Some(LocationFix {
                coordinate,
                timestamp,
            });
        }
        self.notify_observers();
    }

    /// Drop the position fix, notifying observers if one was present.
    pub fn clear_fix(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.fix.is_none() {
                return;
            }
            inner.state.fix = None;
        }
        self.notify_observers();
    }

    /// Feed the service from configuration.
    ///
    /// Configured coordinates authorize the service and become the fix;
    /// a config without coordinates means the user still has to act.
    pub fn apply_config(&self, config: &crate::config::Config, clock: &dyn TimeSource) {
        match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => {
                self.set_authorization(LocationAuthorization::Authorized);
                self.update_fix(
                    Coordinate {
                        latitude,
                        longitude,
                    },
                    clock.now(),
                );
            }
            _ => {
                self.set_authorization(LocationAuthorization::NeedsUserAction);
                self.clear_fix();
            }
        }
    }

    fn notify_observers(&self) {
        // Snapshot the live observers, then call them outside the lock so a
        // callback may register/unregister without deadlocking.
        let (state, observers) = {
            let mut inner = self.inner.lock().unwrap();
            inner.observers.retain(|_, weak| weak.strong_count() > 0);
            let observers: Vec<Arc<dyn LocationObserver>> =
                inner.observers.values().filter_map(Weak::upgrade).collect();
            (inner.state.clone(), observers)
        };
        for observer in observers {
            observer.location_state_changed(&state);
        }
    }
}
