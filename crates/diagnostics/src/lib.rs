// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by every cloudbackup crate.
//!
//! Output is controlled by the `CLOUDBACKUP_LOG` environment variable:
//! - `off` (default) - nothing is emitted
//! - `error`, `warn`, `info`, `debug` - minimum level written to stderr
//!
//! Library code never prints directly. It logs through the short macros
//! below, which forward to `emit` with its named-property template syntax:
//!
//! ```ignore
//! use diagnostics::*;
//! info!("Downloaded {blob} ({bytes} bytes)", blob: name.as_str(), bytes: total);
//! ```

use std::sync::Once;

// Re-export emit so the macros resolve from any crate
pub use emit;

/// Name of the environment variable read by [`init_diagnostics`].
pub const LOG_ENV_VAR: &str = "CLOUDBACKUP_LOG";

static INIT: Once = Once::new();

/// Parsed value of `CLOUDBACKUP_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Min(emit::Level),
}

impl LogSetting {
    /// Parse a setting, ignoring case and surrounding whitespace.
    /// Returns `None` for unrecognized values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "off" | "none" => Some(Self::Off),
            "error" => Some(Self::Min(emit::Level::Error)),
            "warn" | "warning" => Some(Self::Min(emit::Level::Warn)),
            "info" => Some(Self::Min(emit::Level::Info)),
            "debug" => Some(Self::Min(emit::Level::Debug)),
            _ => None,
        }
    }

    /// Read the setting from the environment. Unknown values fall back to `info`.
    #[must_use]
    pub fn from_env() -> (Self, Option<String>) {
        match std::env::var(LOG_ENV_VAR) {
            Err(_) => (Self::Off, None),
            Ok(raw) => match Self::parse(&raw) {
                Some(setting) => (setting, None),
                None => (Self::Min(emit::Level::Info), Some(raw)),
            },
        }
    }
}

/// Initialize logging from `CLOUDBACKUP_LOG`.
///
/// Call once at program startup; later calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let (setting, unknown) = LogSetting::from_env();
        let level = match setting {
            LogSetting::Off => return,
            LogSetting::Min(level) => level,
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if let Some(value) = unknown {
            emit::warn!(
                "Unknown {var} value {value}, using info",
                var: LOG_ENV_VAR,
                value: value.as_str()
            );
        }

        // The runtime lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log detailed diagnostics (chunk sizes, retry attempts, resolved names)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log normal operations (transfers started and finished, progress bars)
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log recoverable conditions (fallbacks, retried requests, failed wake calls)
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that abort an operation
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
