//! Application-wide constants and defaults.

use std::time::Duration;

/// Minimum position change that produces a new location state.
///
/// GPS-grade jitter and small config nudges below this distance do not move
/// sunrise/sunset by a meaningful amount, so they must not trigger a
/// reschedule.
pub const COALESCE_THRESHOLD_KM: f64 = 25.0;

/// Number of days the transition search looks ahead beyond today.
///
/// Inside the polar circles there may be no sunrise or sunset for months;
/// the search gives up after this many days and the scheduler falls back to
/// a periodic refresh instead.
pub const SEARCH_BUDGET_DAYS: u32 = 2;

/// Tolerance granted to the wake-up scheduler around a transition instant.
///
/// Deferred wake-ups may be coalesced with other system activity; anything
/// inside this window still counts as "on time". A fire before the target
/// instant is re-deferred without side effects.
pub const WAKEUP_TOLERANCE: Duration = Duration::from_secs(3 * 60);

/// Refresh interval used when no transition could be computed.
pub const FALLBACK_REFRESH: Duration = Duration::from_secs(24 * 60 * 60);

/// How often a freshly computed transition may turn out to already be in the
/// past (processing delay) before the scheduler gives up and falls back to
/// the periodic refresh.
pub const STALE_RETRY_LIMIT: u32 = 3;

/// Debounce window for config file change events, in milliseconds.
/// Editors often write files in several steps; collapse those into one reload.
pub const CONFIG_DEBOUNCE_MS: u64 = 500;

/// Default commands used to apply a theme when the config does not override
/// them. These target the freedesktop color-scheme preference via GNOME's
/// gsettings, which most portal-aware applications honor.
pub const DEFAULT_LIGHT_COMMAND: &str =
    "gsettings set org.gnome.desktop.interface color-scheme prefer-light";
pub const DEFAULT_DARK_COMMAND: &str =
    "gsettings set org.gnome.desktop.interface color-scheme prefer-dark";

/// Exit code for fatal startup failures.
pub const EXIT_FAILURE: i32 = 1;
