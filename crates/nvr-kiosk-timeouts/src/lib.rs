#![warn(missing_docs)]
//! # nvr-kiosk-timeouts
//!
//! ## Purpose
//! Purpose-keyed registry of cancellable delayed actions.
//!
//! ## Responsibilities
//! - Keep at most one pending timeout per [`Purpose`].
//! - Cancel by purpose or cancel everything on navigation/restart.
//! - Hand due entries back to the owning event loop one at a time.
//!
//! ## Data flow
//! The controller arms a timeout with [`TimeoutRegistry::set_tracked_timeout`],
//! its event loop sleeps until [`TimeoutRegistry::next_deadline`], then drains
//! due entries with [`TimeoutRegistry::pop_due`] and runs each task.
//!
//! ## Ownership and lifetimes
//! The registry owns the scheduled task values (`T`). A due entry is removed
//! before it is returned, so running the task may re-arm the same purpose.
//!
//! ## Error model
//! Scheduling is infallible. The only fallible step is building a
//! [`Purpose`], which rejects empty keys with [`TimeoutError::EmptyPurpose`].
//! Clearing a purpose that is not pending is a no-op.
//!
//! ## Example
//! ```rust
//! use nvr_kiosk_timeouts::{Purpose, TimeoutRegistry};
//!
//! let mut registry = TimeoutRegistry::new();
//! let purpose = Purpose::new("connection-timeout").unwrap();
//! registry.set_tracked_timeout(purpose.clone(), "first", 1_000, 0);
//! registry.set_tracked_timeout(purpose, "second", 1_000, 10);
//!
//! let fence = registry.fence();
//! let fired = registry.pop_due(1_010, fence).unwrap();
//! assert_eq!(fired.task, "second");
//! assert!(registry.pop_due(1_010, fence).is_none());
//! ```

use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Non-empty key naming the logical reason for a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Purpose(Cow<'static, str>);

impl Purpose {
    /// Page load watchdog.
    pub const CONNECTION_TIMEOUT: Purpose = Purpose::from_static("connection-timeout");
    /// Releases the toggle guard when the page never acknowledges.
    pub const TOGGLE_SETTLE: Purpose = Purpose::from_static("toggle-settle");
    /// Debounced window bounds persistence.
    pub const WINDOW_BOUNDS_SAVE: Purpose = Purpose::from_static("window-bounds-save");

    /// Builds a purpose from an owned or borrowed key.
    ///
    /// # Errors
    /// Returns [`TimeoutError::EmptyPurpose`] when `key` is blank.
    pub fn new(key: impl Into<String>) -> Result<Self, TimeoutError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TimeoutError::EmptyPurpose);
        }
        Ok(Self(Cow::Owned(key)))
    }

    /// Builds a purpose from a literal key.
    ///
    /// # Panics
    /// Panics (at compile time when used in a `const`) if `key` is empty.
    pub const fn from_static(key: &'static str) -> Self {
        assert!(!key.is_empty(), "purpose key must be non-empty");
        Self(Cow::Borrowed(key))
    }

    /// Returns the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Purpose {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of one armed timeout. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutHandle(u64);

impl TimeoutHandle {
    /// Raw handle value, useful for logging.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Public view of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimeout {
    /// Handle returned when the entry was armed.
    pub handle: TimeoutHandle,
    /// Absolute epoch milliseconds at which the entry becomes due.
    pub expires_at_ms: u64,
}

/// Entry handed back by [`TimeoutRegistry::pop_due`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimeout<T> {
    /// Purpose the entry was armed under.
    pub purpose: Purpose,
    /// Handle returned when the entry was armed.
    pub handle: TimeoutHandle,
    /// Scheduled fire time.
    pub expires_at_ms: u64,
    /// Task to run.
    pub task: T,
}

#[derive(Debug)]
struct Entry<T> {
    handle: TimeoutHandle,
    expires_at_ms: u64,
    task: T,
}

/// Registry mapping each purpose to at most one pending task.
#[derive(Debug)]
pub struct TimeoutRegistry<T> {
    entries: HashMap<Purpose, Entry<T>>,
    next_handle: u64,
}

impl<T> TimeoutRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Arms `task` to become due `duration_ms` after `now_ms`.
    ///
    /// Any entry already pending under `purpose` is cancelled first; the
    /// latest call always wins.
    pub fn set_tracked_timeout(
        &mut self,
        purpose: Purpose,
        task: T,
        duration_ms: u64,
        now_ms: u64,
    ) -> TimeoutHandle {
        if let Some(previous) = self.entries.remove(purpose.as_str()) {
            tracing::debug!(
                stage = "timeouts",
                action = "replaced",
                purpose = %purpose,
                handle = previous.handle.0,
                "pending timeout cancelled by re-arm"
            );
        }

        let handle = TimeoutHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        let expires_at_ms = now_ms.saturating_add(duration_ms);

        tracing::trace!(
            stage = "timeouts",
            action = "armed",
            purpose = %purpose,
            handle = handle.0,
            expires_at_ms,
            "timeout armed"
        );
        self.entries.insert(
            purpose,
            Entry {
                handle,
                expires_at_ms,
                task,
            },
        );
        handle
    }

    /// Cancels the entry under `purpose`.
    ///
    /// Returns `true` when something was pending. Clearing an unknown or
    /// already-fired purpose is a no-op.
    pub fn clear_timeout(&mut self, purpose: &str) -> bool {
        self.entries.remove(purpose).is_some()
    }

    /// Cancels every pending entry and returns how many were dropped.
    pub fn clear_all_timeouts(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            tracing::debug!(
                stage = "timeouts",
                action = "cleared_all",
                dropped,
                "all pending timeouts cancelled"
            );
        }
        dropped
    }

    /// Returns the pending entry for `purpose`, if any.
    pub fn pending(&self, purpose: &str) -> Option<PendingTimeout> {
        self.entries.get(purpose).map(|entry| PendingTimeout {
            handle: entry.handle,
            expires_at_ms: entry.expires_at_ms,
        })
    }

    /// Returns `true` when `purpose` has a pending entry.
    pub fn is_pending(&self, purpose: &str) -> bool {
        self.entries.contains_key(purpose)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|entry| entry.expires_at_ms).min()
    }

    /// Marks the boundary between entries armed so far and entries armed
    /// while due tasks run.
    ///
    /// Pass the same fence to every [`TimeoutRegistry::pop_due`] call in one
    /// drain pass so a task that re-arms with zero delay waits for the next
    /// pass instead of looping forever.
    pub fn fence(&self) -> TimeoutHandle {
        TimeoutHandle(self.next_handle)
    }

    /// Removes and returns the earliest entry due at `now_ms` that was armed
    /// before `fence`.
    ///
    /// Ties on fire time resolve in arming order.
    pub fn pop_due(&mut self, now_ms: u64, fence: TimeoutHandle) -> Option<FiredTimeout<T>> {
        let purpose = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms <= now_ms && entry.handle < fence)
            .min_by_key(|(_, entry)| (entry.expires_at_ms, entry.handle))
            .map(|(purpose, _)| purpose.clone())?;

        let (purpose, entry) = self.entries.remove_entry(purpose.as_str())?;
        Some(FiredTimeout {
            purpose,
            handle: entry.handle,
            expires_at_ms: entry.expires_at_ms,
            task: entry.task,
        })
    }
}

impl<T> Default for TimeoutRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Timeout registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    /// Purpose keys must contain a non-whitespace character.
    #[error("timeout purpose must be non-empty")]
    EmptyPurpose,
}
