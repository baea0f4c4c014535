//! Analytics Configuration Module
//!
//! Model hyperparameters, feature windows, predictor windows and threshold
//! rules, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `MACHINE_HEALTH_CONFIG` environment variable (path to TOML file)
//! 2. `machine_health.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(AnalyticsConfig::load());
//! let window = config::get().features.rolling_window;
//! ```

mod analytics_config;
pub mod defaults;
pub mod validation;

pub use analytics_config::*;

use std::sync::OnceLock;

static ANALYTICS_CONFIG: OnceLock<AnalyticsConfig> = OnceLock::new();

/// Initialize the global configuration. Later calls are ignored with a warning.
pub fn init(config: AnalyticsConfig) {
    if ANALYTICS_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// The global configuration, or the built-in defaults if `init()` was never called.
pub fn get() -> &'static AnalyticsConfig {
    ANALYTICS_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        AnalyticsConfig::default()
    })
}

pub fn is_initialized() -> bool {
    ANALYTICS_CONFIG.get().is_some()
}
