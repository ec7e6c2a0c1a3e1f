#![warn(missing_docs)]
//! # nvr-kiosk-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `nvr-kiosk` workspace.
//!
//! ## Responsibilities
//! - Represent the persisted connection record ([`Config`]) and its partial
//!   update form ([`ConfigPatch`]).
//! - Represent the UI projection sent across the trust boundary ([`UiState`]).
//! - Represent camera, update, and diagnostics payloads carried by bridge
//!   channels.
//! - Validate dashboard endpoint URLs.
//!
//! ## Data flow
//! The config store loads a [`Config`], page messages deliver
//! [`ConfigPatch`] values that are merged with [`Config::apply_patch`], and the
//! UI state machine emits [`UiState`] snapshots toward the page.
//!
//! ## Ownership and lifetimes
//! Every record owns its strings so snapshots can cross the controller/page
//! boundary without borrowing from controller state.
//!
//! ## Error model
//! Endpoint validation and JSON codec failures return [`CoreError`].
//!
//! ## Security and privacy notes
//! The password is stored in plaintext at rest. `Debug` output of [`Config`]
//! and [`ConfigPatch`] masks it so it never reaches logs.
//!
//! ## Example
//! ```rust
//! use nvr_kiosk_core::{Config, ConfigPatch};
//!
//! let mut config = Config::default();
//! config.apply_patch(&ConfigPatch {
//!     username: Some("operator".to_string()),
//!     ..ConfigPatch::default()
//! });
//! assert_eq!(config.username, "operator");
//! assert_eq!(config.login_attempts, 0);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default window width in logical pixels.
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;

/// Default window height in logical pixels.
pub const DEFAULT_WINDOW_HEIGHT: u32 = 800;

const REDACTED: &str = "<redacted>";

/// Window placement persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowBounds {
    /// Left edge; `None` lets the window manager choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Top edge; `None` lets the window manager choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

/// Persisted connection and throttle record.
///
/// Missing fields in a stored document fall back to [`Config::default`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Dashboard endpoint URL. Empty until the setup form is completed.
    pub url: String,
    /// Dashboard account name used for auto-login.
    pub username: String,
    /// Dashboard account password (plaintext at rest).
    pub password: String,
    /// Whether the browser surface should bypass certificate errors.
    pub ignore_cert_errors: bool,
    /// Last known window placement.
    pub window_bounds: WindowBounds,
    /// Automated login submissions in the current window.
    pub login_attempts: u32,
    /// Epoch milliseconds at which the attempt window ends.
    pub login_attempts_reset_time: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            ignore_cert_errors: false,
            window_bounds: WindowBounds::default(),
            login_attempts: 0,
            login_attempts_reset_time: 0,
        }
    }
}

impl Config {
    /// Merges every field present in `patch`; absent fields are unchanged.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(username) = &patch.username {
            self.username = username.clone();
        }
        if let Some(password) = &patch.password {
            self.password = password.clone();
        }
        if let Some(ignore_cert_errors) = patch.ignore_cert_errors {
            self.ignore_cert_errors = ignore_cert_errors;
        }
        if let Some(window_bounds) = patch.window_bounds {
            self.window_bounds = window_bounds;
        }
        if let Some(login_attempts) = patch.login_attempts {
            self.login_attempts = login_attempts;
        }
        if let Some(reset_time) = patch.login_attempts_reset_time {
            self.login_attempts_reset_time = reset_time;
        }
    }

    /// Returns `true` when both auto-login credentials are non-blank.
    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }

    /// Returns the parsed endpoint when one is configured.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidEndpoint`] when the stored URL is blank or
    /// fails [`validate_endpoint_url`].
    pub fn endpoint(&self) -> Result<Url, CoreError> {
        validate_endpoint_url(&self.url)
    }

    /// Serializes the record to pretty JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec_pretty(self).map_err(CoreError::Codec)
    }

    /// Deserializes a record from JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when decoding fails.
    pub fn from_json_bytes(raw: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(raw).map_err(CoreError::Codec)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("ignore_cert_errors", &self.ignore_cert_errors)
            .field("window_bounds", &self.window_bounds)
            .field("login_attempts", &self.login_attempts)
            .field("login_attempts_reset_time", &self.login_attempts_reset_time)
            .finish()
    }
}

/// Partial config update. `None` fields are left untouched on merge.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    /// New dashboard endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// New auto-login username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New auto-login password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// New certificate-error policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_cert_errors: Option<bool>,
    /// New window placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_bounds: Option<WindowBounds>,
    /// New login-attempt counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_attempts: Option<u32>,
    /// New login-attempt window end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_attempts_reset_time: Option<u64>,
}

impl ConfigPatch {
    /// Returns `true` when the patch carries no field.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch that writes only the two login-throttle fields.
    pub fn login_counters(attempts: u32, reset_time: u64) -> Self {
        Self {
            login_attempts: Some(attempts),
            login_attempts_reset_time: Some(reset_time),
            ..Self::default()
        }
    }

    /// Patch that writes only the window placement.
    pub fn window_bounds(bounds: WindowBounds) -> Self {
        Self {
            window_bounds: Some(bounds),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPatch")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("ignore_cert_errors", &self.ignore_cert_errors)
            .field("window_bounds", &self.window_bounds)
            .field("login_attempts", &self.login_attempts)
            .field("login_attempts_reset_time", &self.login_attempts_reset_time)
            .finish()
    }
}

/// Public UI projection sent across the trust boundary.
///
/// Recipients hold a copy; it is never a live view of controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// Dashboard navigation bar hidden.
    pub nav_hidden: bool,
    /// Dashboard header hidden.
    pub header_hidden: bool,
    /// Host window is fullscreen.
    pub is_fullscreen: bool,
}

/// One camera tile reported by the dashboard page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraEntry {
    /// Position in the dashboard's camera grid.
    pub index: u32,
    /// Display name of the camera.
    pub name: String,
}

/// Camera inventory reported by the page via `update-camera-list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraList {
    /// Cameras currently rendered by the dashboard.
    pub cameras: Vec<CameraEntry>,
    /// Whether the dashboard layout supports single-camera zoom.
    pub zoom_supported: bool,
}

/// Release metadata carried by `update-available` / `update-downloaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Release version string.
    pub version: String,
    /// Release date as reported by the update feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    /// Release notes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// Download progress carried by `download-progress`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Completion percentage in `[0.0, 100.0]`.
    pub percent: f64,
    /// Current transfer rate.
    pub bytes_per_second: u64,
    /// Bytes received so far.
    pub transferred: u64,
    /// Total bytes expected.
    pub total: u64,
}

/// Result of a manual update check or download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActionResult {
    /// Whether the request was accepted.
    pub success: bool,
    /// Human-readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateActionResult {
    /// Successful result with no message.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Failed result with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Snapshot returned by `getSystemDiagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDiagnostics {
    /// Whether GPU acceleration is active in the browser surface.
    pub hardware_acceleration: bool,
    /// Operating system identifier.
    pub platform: String,
    /// CPU architecture identifier.
    pub arch: String,
    /// Kiosk shell version.
    pub runtime_version: String,
    /// Embedded browser engine version.
    pub browser_engine_version: String,
}

/// Validates a dashboard endpoint URL.
///
/// # Errors
/// Returns [`CoreError::InvalidEndpoint`] for blank input, unparseable URLs,
/// non-HTTP(S) schemes, or URLs without a host.
pub fn validate_endpoint_url(raw: &str) -> Result<Url, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidEndpoint(
            "endpoint url is empty".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|error| CoreError::InvalidEndpoint(format!("invalid endpoint url: {error}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CoreError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(CoreError::InvalidEndpoint(
            "endpoint url has no host".to_string(),
        ));
    }

    Ok(parsed)
}

/// Error type for core validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Endpoint URL failed validation.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// JSON encoding/decoding error.
    #[error("config codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
