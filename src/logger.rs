//! Structured logging system with visual formatting.
//!
//! This module provides the logging macros used across nightfall. Output is
//! structured with Unicode box drawing characters: a version header opens the
//! run, conceptual blocks are started with `log_block_start!`, related lines
//! continue with `log_decorated!`/`log_indented!`, and `log_end!` closes the
//! run. The semantic macros (`log_info!`, `log_warning!`, `log_error!`,
//! `log_debug!`, `log_critical!`) carry a `[LEVEL]` prefix instead.
//!
//! Logging can be disabled at runtime for quiet operation, e.g. while a
//! one-shot subcommand produces machine-readable output.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Main logging interface providing the runtime enable switch.
pub struct Log;

impl Log {
    /// Enable or disable logging temporarily.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }
}

// Public function that routes output (needed by macros)
pub fn write_output(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

// # Logging Macros

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let version = env!("CARGO_PKG_VERSION");
            let formatted = format!("┏ nightfall v{version} ━━╸\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a block start message, initiating a new conceptual block of information.
#[macro_export]
macro_rules! log_block_start {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃\n┣ {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┃\n┣ {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a decorated message, typically as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣ {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣ {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃   {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┃   {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("┃\n");
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("╹\n");
        }
    }};
}

/// Log an informational message with pipe prefix and green-colored text.
#[macro_export]
macro_rules! log_info {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣[\x1b[32mINFO\x1b[0m] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣[\x1b[32mINFO\x1b[0m] {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a debug/operational message with pipe prefix and green-colored text.
#[macro_export]
macro_rules! log_debug {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣[\x1b[32mDEBUG\x1b[0m] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣[\x1b[32mDEBUG\x1b[0m] {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a warning message with pipe prefix and yellow-colored text.
#[macro_export]
macro_rules! log_warning {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣[\x1b[33mWARNING\x1b[0m] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣[\x1b[33mWARNING\x1b[0m] {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log an error message with pipe prefix and red-colored text.
#[macro_export]
macro_rules! log_error {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣[\x1b[31mERROR\x1b[0m] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣[\x1b[31mERROR\x1b[0m] {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a critical message with pipe prefix and red-colored text.
#[macro_export]
macro_rules! log_critical {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣[\x1b[31mCRITICAL\x1b[0m] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            let formatted = format!("┣[\x1b[31mCRITICAL\x1b[0m] {expr}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}
