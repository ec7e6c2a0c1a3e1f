#![warn(missing_docs)]
//! # nvr-kiosk-auth
//!
//! ## Purpose
//! Throttles automated credential submission to the dashboard login form.
//!
//! ## Responsibilities
//! - Count automated login attempts inside a rolling reset window.
//! - Persist the counters through the shared [`ConfigStore`].
//! - Decide whether the controller may auto-submit stored credentials.
//!
//! ## Data flow
//! Host detects a login form -> [`evaluate_auto_login`] ->
//! [`LoginThrottle::record_attempt`] reads and writes the two counter fields
//! -> [`AutoLoginDecision`] tells the host to submit or to ask the operator.
//!
//! ## Ownership and lifetimes
//! The throttle shares the config store (`Arc<dyn ConfigStore>`) with the
//! controller; both go through the same accessor.
//!
//! ## Error model
//! The policy fails closed. Store failures and implausible counters return
//! [`ThrottleError`], and callers treat every error as "blocked".
//!
//! ## Security and privacy notes
//! This crate never logs credential values. [`Credentials`] masks the
//! password in `Debug` output.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use nvr_kiosk_auth::{LoginThrottle, ThrottlePolicy};
//! use nvr_kiosk_config::MemoryConfigStore;
//!
//! let throttle = LoginThrottle::new(ThrottlePolicy::default(), Arc::new(MemoryConfigStore::new()));
//! let decision = throttle.record_attempt(1_000).unwrap();
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 4);
//! ```

use std::fmt;
use std::sync::Arc;

use nvr_kiosk_config::{ConfigError, ConfigStore};
use nvr_kiosk_core::{Config, ConfigPatch};
use thiserror::Error;

/// Automated submissions allowed per window.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Length of the attempt window (15 minutes).
pub const LOGIN_WINDOW_MS: u64 = 15 * 60 * 1_000;

/// Stored dashboard credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Extracts credentials from `config` when both values are non-blank.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.has_credentials() {
            return None;
        }
        Some(Self {
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Throttle limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    max_attempts: u32,
    window_ms: u64,
}

impl ThrottlePolicy {
    /// Creates a validated policy.
    ///
    /// # Errors
    /// Returns [`ThrottleError::InvalidPolicy`] when either limit is zero.
    pub fn new(max_attempts: u32, window_ms: u64) -> Result<Self, ThrottleError> {
        if max_attempts == 0 || window_ms == 0 {
            return Err(ThrottleError::InvalidPolicy);
        }
        Ok(Self {
            max_attempts,
            window_ms,
        })
    }

    /// Attempts allowed per window.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_LOGIN_ATTEMPTS,
            window_ms: LOGIN_WINDOW_MS,
        }
    }
}

/// Outcome of one recorded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    /// Whether automated submission may proceed.
    pub allowed: bool,
    /// Attempts left in the current window.
    pub remaining: u32,
    /// Attempts counted in the current window, including this one.
    pub attempts: u32,
    /// Epoch milliseconds at which the window resets.
    pub resets_at_ms: u64,
}

impl ThrottleDecision {
    /// Fail-closed decision used when the counters cannot be trusted.
    pub fn blocked() -> Self {
        Self {
            allowed: false,
            remaining: 0,
            attempts: 0,
            resets_at_ms: 0,
        }
    }
}

/// Attempt counter persisted in the config record.
#[derive(Clone)]
pub struct LoginThrottle {
    policy: ThrottlePolicy,
    store: Arc<dyn ConfigStore>,
}

impl LoginThrottle {
    /// Creates a throttle over `store`.
    pub fn new(policy: ThrottlePolicy, store: Arc<dyn ConfigStore>) -> Self {
        Self { policy, store }
    }

    /// Active limits.
    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Counts one automated submission at `now_ms`.
    ///
    /// Starts a fresh window when `now_ms` is past the stored reset time,
    /// increments the counter, and persists both fields in one save.
    ///
    /// # Errors
    /// Returns [`ThrottleError::Store`] when the counters cannot be read or
    /// written, and [`ThrottleError::CorruptCounters`] when the stored window
    /// ends further in the future than one full window. Callers must treat
    /// any error as a blocked attempt.
    pub fn record_attempt(&self, now_ms: u64) -> Result<ThrottleDecision, ThrottleError> {
        let config = self.store.load()?;
        let (mut attempts, mut resets_at_ms) = self.current_window(&config, now_ms)?;

        attempts = attempts.saturating_add(1);
        if resets_at_ms == 0 {
            resets_at_ms = now_ms.saturating_add(self.policy.window_ms);
        }

        self.store
            .save(&ConfigPatch::login_counters(attempts, resets_at_ms))?;

        let decision = self.decide(attempts, resets_at_ms);
        if decision.allowed {
            tracing::info!(
                stage = "auth",
                action = "attempt_recorded",
                attempts,
                remaining = decision.remaining,
                "automated login attempt allowed"
            );
        } else {
            tracing::warn!(
                stage = "auth",
                action = "throttled",
                attempts,
                resets_at_ms,
                "automated login blocked until window resets"
            );
        }
        Ok(decision)
    }

    /// Reports the current window without counting an attempt.
    ///
    /// # Errors
    /// Same conditions as [`LoginThrottle::record_attempt`].
    pub fn status(&self, now_ms: u64) -> Result<ThrottleDecision, ThrottleError> {
        let config = self.store.load()?;
        let (attempts, resets_at_ms) = self.current_window(&config, now_ms)?;
        let mut decision = self.decide(attempts, resets_at_ms);
        // The next attempt is allowed only if it still fits in the window.
        decision.allowed = attempts < self.policy.max_attempts;
        Ok(decision)
    }

    /// Clears the counters after the dashboard was reached.
    ///
    /// # Errors
    /// Returns [`ThrottleError::Store`] when the reset cannot be persisted.
    pub fn record_success(&self) -> Result<(), ThrottleError> {
        self.store.save(&ConfigPatch::login_counters(0, 0))?;
        tracing::debug!(stage = "auth", action = "counters_reset", "dashboard reached");
        Ok(())
    }

    // Returns (attempts, resets_at_ms) for the window containing `now_ms`.
    // A zero reset time means a fresh window starts with the next attempt.
    fn current_window(&self, config: &Config, now_ms: u64) -> Result<(u32, u64), ThrottleError> {
        let stored_reset = config.login_attempts_reset_time;
        if stored_reset > now_ms.saturating_add(self.policy.window_ms) {
            tracing::warn!(
                stage = "auth",
                action = "corrupt_counters",
                stored_reset,
                now_ms,
                "login window ends implausibly far in the future"
            );
            return Err(ThrottleError::CorruptCounters {
                resets_at_ms: stored_reset,
            });
        }

        if now_ms > stored_reset {
            return Ok((0, now_ms.saturating_add(self.policy.window_ms)));
        }
        Ok((config.login_attempts, stored_reset))
    }

    fn decide(&self, attempts: u32, resets_at_ms: u64) -> ThrottleDecision {
        let allowed = attempts <= self.policy.max_attempts;
        ThrottleDecision {
            allowed,
            remaining: self.policy.max_attempts.saturating_sub(attempts),
            attempts,
            resets_at_ms,
        }
    }
}

/// What the controller should do with a detected login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoLoginDecision {
    /// Fill and submit the form.
    Submit {
        /// Credentials to submit.
        credentials: Credentials,
        /// Throttle state after counting this attempt.
        throttle: ThrottleDecision,
    },
    /// Auto-login is switched off; leave the form to the operator.
    Disabled,
    /// No stored credentials; leave the form to the operator.
    MissingCredentials,
    /// Too many attempts or untrustworthy counters; manual login required.
    Blocked(ThrottleDecision),
}

/// Decides whether to auto-submit credentials for a detected login form.
///
/// Only a submission that will actually happen is counted against the
/// throttle. Any throttle error yields [`AutoLoginDecision::Blocked`].
pub fn evaluate_auto_login(
    config: &Config,
    throttle: &LoginThrottle,
    enabled: bool,
    now_ms: u64,
) -> AutoLoginDecision {
    if !enabled {
        return AutoLoginDecision::Disabled;
    }
    let Some(credentials) = Credentials::from_config(config) else {
        return AutoLoginDecision::MissingCredentials;
    };

    match throttle.record_attempt(now_ms) {
        Ok(decision) if decision.allowed => AutoLoginDecision::Submit {
            credentials,
            throttle: decision,
        },
        Ok(decision) => AutoLoginDecision::Blocked(decision),
        Err(error) => {
            tracing::warn!(
                stage = "auth",
                action = "fail_closed",
                %error,
                "throttle unavailable; blocking automated login"
            );
            AutoLoginDecision::Blocked(ThrottleDecision::blocked())
        }
    }
}

/// Login throttle errors.
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// Policy limits must be positive.
    #[error("throttle limits must be greater than zero")]
    InvalidPolicy,
    /// Counter persistence failed.
    #[error("login counters unavailable: {0}")]
    Store(#[from] ConfigError),
    /// Stored counters are not plausible.
    #[error("login counters look corrupted (window ends at {resets_at_ms})")]
    CorruptCounters {
        /// Stored reset time.
        resets_at_ms: u64,
    },
}
