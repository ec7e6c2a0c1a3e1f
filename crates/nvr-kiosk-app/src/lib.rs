#![warn(missing_docs)]
//! # nvr-kiosk-app
//!
//! ## Purpose
//! Orchestrates config, UI state, tracked timeouts, the message bridge, and
//! the login throttle for the `nvr-kiosk` shell.
//!
//! ## Responsibilities
//! - Own all shell state on one thread through [`Controller`].
//! - Answer page invokes, apply page sends, and react to host events.
//! - Arm and fire the page load watchdog, toggle settle, and bounds debounce.
//! - Gate credential auto-submit behind the throttle and a kill switch.
//! - Run the headless stdio harness used by the `nvr-kiosk` binary.
//!
//! ## Data flow
//! Page envelope / host event / due timer -> [`Controller`] -> state update ->
//! [`PageSink`] broadcast or reply + [`HostShell`] side effect.
//!
//! ## Ownership and lifetimes
//! The controller owns every piece of mutable state. The config store is the
//! only shared object, held as `Arc<dyn ConfigStore>` by the controller and
//! the login throttle.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Contract violations and
//! local failures are logged and absorbed; failures touching persisted state
//! reach the page as failed invoke replies.
//!
//! ## Security and privacy notes
//! - Page patches cannot write the login throttle counters.
//! - `NVR_KIOSK_AUTOLOGIN` can switch credential auto-submit off at runtime.
//! - [`redact_sensitive`] strips credential strings from rejected envelopes
//!   before they are logged.

pub mod controller;
pub mod harness;
pub mod host;

use std::borrow::Cow;

use nvr_kiosk_auth::ThrottleError;
use nvr_kiosk_bridge::BridgeError;
use nvr_kiosk_config::ConfigError;
use nvr_kiosk_core::CoreError;
use thiserror::Error;

pub use controller::{
    CONNECTION_TIMEOUT_MS, Controller, ControllerSettings, ControllerSnapshot, HostEvent,
    Shortcut, TOGGLE_SETTLE_MS, TimerTask, UpdateEvent, WINDOW_BOUNDS_DEBOUNCE_MS,
};
pub use host::{DisabledUpdates, HostShell, PageSink, ShellStatus, UpdateService};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("NVR_KIOSK_VERSION");

/// Env var that switches credential auto-submit off.
pub const AUTOLOGIN_ENV: &str = "NVR_KIOSK_AUTOLOGIN";

const SENSITIVE_KEYS: [&str; 4] = ["password", "token", "authorization", "bearer"];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Reads the auto-login kill switch.
///
/// Semantics:
/// - Unset => auto-login enabled.
/// - `0`, `false`, `off` (case-insensitive) => auto-login disabled.
/// - Any other value => auto-login enabled.
pub fn auto_login_enabled_from_env() -> bool {
    std::env::var(AUTOLOGIN_ENV)
        .map(|value| kill_switch_allows(&value))
        .unwrap_or(true)
}

fn kill_switch_allows(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    !matches!(normalized.as_str(), "0" | "false" | "off")
}

/// Redacts everything from the first credential marker onward.
///
/// Input without a marker is returned unchanged and unallocated.
pub fn redact_sensitive(input: &str) -> Cow<'_, str> {
    let lower = input.to_ascii_lowercase();
    let first = SENSITIVE_KEYS
        .iter()
        .filter_map(|key| lower.find(key).map(|position| (position, *key)))
        .min_by_key(|(position, _)| *position);

    match first {
        Some((position, key)) => Cow::Owned(format!("{}{key}=<redacted>", &input[..position])),
        None => Cow::Borrowed(input),
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Config persistence error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Core model or validation error.
    #[error("invalid input: {0}")]
    Core(#[from] CoreError),
    /// Message contract violation.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),
    /// Login throttle error.
    #[error("login throttle error: {0}")]
    Throttle(#[from] ThrottleError),
    /// Harness stdio error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
