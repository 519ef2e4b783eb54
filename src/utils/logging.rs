//! Logging macros that respect a module-level `ENABLE_LOGS` switch.
//!
//! Modules that emit a line per location sample (feeds, the game loop) can
//! silence themselves without touching the global `RUST_LOG` filter:
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("feed started");
//! ```
//!
//! Every module that uses one of these macros must define the constant.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Default level for `env_logger` when `RUST_LOG` is unset.
pub fn default_level(debug: bool) -> log::LevelFilter {
    if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

/// Reads `BEACON_HUNT_DEBUG` (`1` or `true`).
pub fn debug_from_env() -> bool {
    std::env::var("BEACON_HUNT_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Installs the global logger. `RUST_LOG` still wins over `debug`.
pub fn init(debug: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level(debug))
        .parse_default_env()
        .try_init();
}
