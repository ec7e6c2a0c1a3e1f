#![warn(missing_docs)]
//! # nvr-kiosk-ui
//!
//! ## Purpose
//! Owns the authoritative UI state of the kiosk shell and arbitrates changes
//! to it.
//!
//! ## Responsibilities
//! - Hold [`UiInternalState`] (navigation/header visibility, fullscreen,
//!   toggle guard, initialization flag).
//! - Admit at most one toggle at a time and drop requests that arrive while
//!   one is in flight.
//! - Mirror the host window's fullscreen state unconditionally.
//! - Track the dashboard's camera inventory for zoom shortcuts.
//!
//! ## Data flow
//! Host shortcuts and page reports -> [`UiStateMachine`] -> [`UiCommand`] +
//! [`UiState`] snapshot -> [`UiBroadcaster`] (the message bridge) -> page.
//!
//! ## Ownership and lifetimes
//! The machine is the single writer of its state. Broadcasters receive copies
//! of the projection, never references into the machine.
//!
//! ## Error model
//! A toggle that arrives while another is in flight is dropped, not an
//! error. A failed broadcast rolls page-directed changes back and returns
//! [`BroadcastError`]. Invalid zoom requests return [`ZoomError`].
//!
//! ## Security and privacy notes
//! UI state carries no secrets; it is safe to log and to send to the page.

use nvr_kiosk_core::{CameraList, UiState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of visibility toggle requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToggleKind {
    /// Flip navigation and header together.
    All,
    /// Flip navigation only.
    NavOnly,
    /// Flip header only.
    HeaderOnly,
    /// Page-local widget panel; leaves navigation and header untouched.
    WidgetPanel,
}

impl ToggleKind {
    /// Returns `state` with this toggle applied.
    pub fn apply(self, state: UiState) -> UiState {
        match self {
            Self::All => UiState {
                nav_hidden: !state.nav_hidden,
                header_hidden: !state.header_hidden,
                ..state
            },
            Self::NavOnly => UiState {
                nav_hidden: !state.nav_hidden,
                ..state
            },
            Self::HeaderOnly => UiState {
                header_hidden: !state.header_hidden,
                ..state
            },
            Self::WidgetPanel => state,
        }
    }
}

/// Page-directed command emitted alongside a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Apply a visibility toggle.
    Toggle(ToggleKind),
    /// Restore the dashboard's default visible layout.
    ReturnToDashboard,
    /// Host window fullscreen changed.
    FullscreenChanged(bool),
}

/// Delivers commands to the page side.
pub trait UiBroadcaster {
    /// Sends `command` together with the resulting projection.
    fn broadcast(&mut self, command: UiCommand, state: UiState) -> Result<(), BroadcastError>;
}

/// Controller-side UI record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiInternalState {
    /// Navigation bar hidden.
    pub nav_hidden: bool,
    /// Header hidden.
    pub header_hidden: bool,
    /// Host window fullscreen.
    pub is_fullscreen: bool,
    /// A toggle is in flight.
    pub toggle_in_progress: bool,
    /// At least one broadcast reached the page.
    pub initialized: bool,
}

impl UiInternalState {
    /// Public projection of this record.
    pub fn projection(&self) -> UiState {
        UiState {
            nav_hidden: self.nav_hidden,
            header_hidden: self.header_hidden,
            is_fullscreen: self.is_fullscreen,
        }
    }

    fn set_projection(&mut self, state: UiState) {
        self.nav_hidden = state.nav_hidden;
        self.header_hidden = state.header_hidden;
        self.is_fullscreen = state.is_fullscreen;
    }
}

/// Result of [`UiStateMachine::request_toggle`].
#[derive(Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Toggle applied and broadcast; the guard stays held until
    /// [`UiStateMachine::complete_toggle`] or a matching page report.
    Applied(UiState),
    /// Another toggle was in flight; nothing changed.
    Dropped,
    /// Broadcast failed; flags were rolled back and the guard released.
    Failed(BroadcastError),
}

/// Result of [`UiStateMachine::apply_page_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageReport {
    /// The report acknowledged the in-flight toggle.
    Acknowledged,
    /// A report outside any toggle; page-reported visibility was adopted.
    Adopted,
    /// The report predates the in-flight toggle and was ignored.
    Stale,
}

/// UI state machine with an enforced single-toggle guard.
#[derive(Debug, Default)]
pub struct UiStateMachine {
    internal: UiInternalState,
    active_toggle: Option<(ToggleKind, UiState)>,
    applied_toggles: u64,
    dropped_toggles: u64,
}

impl UiStateMachine {
    /// Creates the machine with every flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current internal record.
    pub fn internal(&self) -> &UiInternalState {
        &self.internal
    }

    /// Current public projection.
    pub fn projection(&self) -> UiState {
        self.internal.projection()
    }

    /// Returns `true` while a toggle holds the guard.
    pub fn is_toggling(&self) -> bool {
        self.internal.toggle_in_progress
    }

    /// Toggle currently holding the guard.
    pub fn active_toggle(&self) -> Option<ToggleKind> {
        self.active_toggle.map(|(kind, _)| kind)
    }

    /// Number of toggles that were applied.
    pub fn applied_toggles(&self) -> u64 {
        self.applied_toggles
    }

    /// Number of toggles dropped by the guard.
    pub fn dropped_toggles(&self) -> u64 {
        self.dropped_toggles
    }

    /// Requests a visibility toggle.
    ///
    /// Dropped without effect while another toggle is in flight. Otherwise the
    /// guard is taken, the new flags are applied and broadcast, and the guard
    /// is held until the page acknowledges or the caller completes it.
    pub fn request_toggle(
        &mut self,
        kind: ToggleKind,
        broadcaster: &mut dyn UiBroadcaster,
    ) -> ToggleOutcome {
        if self.internal.toggle_in_progress {
            self.dropped_toggles = self.dropped_toggles.saturating_add(1);
            tracing::debug!(
                stage = "ui",
                action = "toggle_dropped",
                ?kind,
                active = ?self.active_toggle(),
                "toggle already in progress"
            );
            return ToggleOutcome::Dropped;
        }

        self.internal.toggle_in_progress = true;
        let previous = self.projection();
        let next = kind.apply(previous);
        self.internal.set_projection(next);

        match broadcaster.broadcast(UiCommand::Toggle(kind), next) {
            Ok(()) => {
                self.internal.initialized = true;
                self.active_toggle = Some((kind, next));
                self.applied_toggles = self.applied_toggles.saturating_add(1);
                tracing::info!(
                    stage = "ui",
                    action = "toggle_applied",
                    ?kind,
                    nav_hidden = next.nav_hidden,
                    header_hidden = next.header_hidden,
                    "toggle broadcast"
                );
                ToggleOutcome::Applied(next)
            }
            Err(error) => {
                self.internal.set_projection(previous);
                self.internal.toggle_in_progress = false;
                tracing::warn!(
                    stage = "ui",
                    action = "toggle_failed",
                    ?kind,
                    %error,
                    "toggle rolled back"
                );
                ToggleOutcome::Failed(error)
            }
        }
    }

    /// Releases the toggle guard. Returns the toggle that held it, if any.
    pub fn complete_toggle(&mut self) -> Option<ToggleKind> {
        self.internal.toggle_in_progress = false;
        self.active_toggle.take().map(|(kind, _)| kind)
    }

    /// Releases the guard because the page went away mid-toggle.
    ///
    /// Flags keep their applied values; the next page load re-syncs them.
    pub fn abort_toggle(&mut self) -> Option<ToggleKind> {
        let aborted = self.complete_toggle();
        if let Some(kind) = aborted {
            tracing::debug!(stage = "ui", action = "toggle_aborted", ?kind, "page torn down");
        }
        aborted
    }

    /// Overwrites the fullscreen flag with the host window's actual state.
    ///
    /// Never blocked by the toggle guard and never rolled back: the window is
    /// the ground truth. A failed broadcast is returned after the overwrite.
    pub fn sync_fullscreen(
        &mut self,
        is_fullscreen: bool,
        broadcaster: &mut dyn UiBroadcaster,
    ) -> Result<UiState, BroadcastError> {
        self.internal.is_fullscreen = is_fullscreen;
        if let Some((_, expected)) = self.active_toggle.as_mut() {
            expected.is_fullscreen = is_fullscreen;
        }
        let state = self.projection();
        broadcaster.broadcast(UiCommand::FullscreenChanged(is_fullscreen), state)?;
        self.internal.initialized = true;
        Ok(state)
    }

    /// Shows navigation and header again. Fullscreen is untouched.
    pub fn return_to_dashboard(
        &mut self,
        broadcaster: &mut dyn UiBroadcaster,
    ) -> Result<UiState, BroadcastError> {
        let previous = self.projection();
        self.internal.nav_hidden = false;
        self.internal.header_hidden = false;
        let state = self.projection();

        if let Err(error) = broadcaster.broadcast(UiCommand::ReturnToDashboard, state) {
            self.internal.set_projection(previous);
            return Err(error);
        }
        self.internal.initialized = true;
        Ok(state)
    }

    /// Applies a `update-ui-state` report from the page.
    ///
    /// While a toggle is in flight, a report matching the expected
    /// visibility releases the guard and anything else is ignored as stale.
    /// Outside a toggle the page's visibility flags are adopted, since the
    /// DOM is their ground truth. The reported fullscreen flag is never
    /// adopted.
    pub fn apply_page_report(&mut self, reported: UiState) -> PageReport {
        if let Some((kind, expected)) = self.active_toggle {
            if same_visibility(reported, expected) {
                self.complete_toggle();
                tracing::debug!(stage = "ui", action = "toggle_acknowledged", ?kind, "page converged");
                return PageReport::Acknowledged;
            }
            return PageReport::Stale;
        }

        self.internal.nav_hidden = reported.nav_hidden;
        self.internal.header_hidden = reported.header_hidden;
        PageReport::Adopted
    }
}

fn same_visibility(left: UiState, right: UiState) -> bool {
    left.nav_hidden == right.nav_hidden && left.header_hidden == right.header_hidden
}

/// Camera inventory and zoom bookkeeping for the dashboard page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraZoom {
    cameras: CameraList,
    zoomed: Option<u32>,
}

impl CameraZoom {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the inventory with the page's latest report.
    ///
    /// A recorded zoom that no longer exists in the new list is cleared.
    pub fn update_list(&mut self, cameras: CameraList) {
        if let Some(index) = self.zoomed
            && !cameras.cameras.iter().any(|camera| camera.index == index)
        {
            self.zoomed = None;
        }
        self.cameras = cameras;
    }

    /// Records the zoom the page reports as active.
    pub fn record_zoom(&mut self, index: u32) {
        self.zoomed = Some(index);
    }

    /// Currently zoomed camera, if any.
    pub fn zoomed(&self) -> Option<u32> {
        self.zoomed
    }

    /// Current inventory.
    pub fn cameras(&self) -> &CameraList {
        &self.cameras
    }

    /// Validates a host zoom request.
    ///
    /// # Errors
    /// Returns [`ZoomError::Unsupported`] when the layout cannot zoom and
    /// [`ZoomError::UnknownCamera`] when no camera has `index`.
    pub fn zoom_request(&self, index: u32) -> Result<u32, ZoomError> {
        if !self.cameras.zoom_supported {
            return Err(ZoomError::Unsupported);
        }
        if !self.cameras.cameras.iter().any(|camera| camera.index == index) {
            return Err(ZoomError::UnknownCamera(index));
        }
        Ok(index)
    }
}

/// Page delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("broadcast failed: {0}")]
pub struct BroadcastError(pub String);

/// Rejected camera zoom request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZoomError {
    /// Dashboard layout does not support zoom.
    #[error("camera zoom is not supported by the current layout")]
    Unsupported,
    /// No camera with the requested index.
    #[error("no camera at index {0}")]
    UnknownCamera(u32),
}

#[cfg(test)]
mod tests {
    //! Unit tests for toggle arbitration.

    use super::*;

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Vec<(UiCommand, UiState)>,
        fail: bool,
    }

    impl UiBroadcaster for RecordingBroadcaster {
        fn broadcast(&mut self, command: UiCommand, state: UiState) -> Result<(), BroadcastError> {
            if self.fail {
                return Err(BroadcastError("page gone".to_string()));
            }
            self.sent.push((command, state));
            Ok(())
        }
    }

    #[test]
    fn toggle_kinds_flip_expected_flags() {
        let start = UiState {
            nav_hidden: false,
            header_hidden: true,
            is_fullscreen: true,
        };
        assert_eq!(
            ToggleKind::All.apply(start),
            UiState {
                nav_hidden: true,
                header_hidden: false,
                is_fullscreen: true
            }
        );
        assert!(ToggleKind::NavOnly.apply(start).nav_hidden);
        assert!(!ToggleKind::HeaderOnly.apply(start).header_hidden);
        assert_eq!(ToggleKind::WidgetPanel.apply(start), start);
    }

    #[test]
    fn failed_broadcast_rolls_back_and_releases_guard() {
        let mut machine = UiStateMachine::new();
        let mut broadcaster = RecordingBroadcaster {
            fail: true,
            ..RecordingBroadcaster::default()
        };

        let outcome = machine.request_toggle(ToggleKind::All, &mut broadcaster);
        assert!(matches!(outcome, ToggleOutcome::Failed(_)));
        assert!(!machine.is_toggling());
        assert_eq!(machine.projection(), UiState::default());
        assert!(!machine.internal().initialized);
    }

    #[test]
    fn first_successful_broadcast_initializes() {
        let mut machine = UiStateMachine::new();
        let mut broadcaster = RecordingBroadcaster::default();
        machine
            .sync_fullscreen(false, &mut broadcaster)
            .expect("broadcast should work");
        assert!(machine.internal().initialized);
    }

    #[test]
    fn stale_report_does_not_release_guard() {
        let mut machine = UiStateMachine::new();
        let mut broadcaster = RecordingBroadcaster::default();
        machine.request_toggle(ToggleKind::NavOnly, &mut broadcaster);

        assert_eq!(
            machine.apply_page_report(UiState::default()),
            PageReport::Stale
        );
        assert!(machine.is_toggling());

        let expected = UiState {
            nav_hidden: true,
            ..UiState::default()
        };
        assert_eq!(machine.apply_page_report(expected), PageReport::Acknowledged);
        assert!(!machine.is_toggling());
    }

    #[test]
    fn zoom_requires_support_and_known_camera() {
        let mut zoom = CameraZoom::new();
        assert_eq!(zoom.zoom_request(0), Err(ZoomError::Unsupported));

        zoom.update_list(CameraList {
            cameras: vec![nvr_kiosk_core::CameraEntry {
                index: 2,
                name: "Gate".to_string(),
            }],
            zoom_supported: true,
        });
        assert_eq!(zoom.zoom_request(2), Ok(2));
        assert_eq!(zoom.zoom_request(7), Err(ZoomError::UnknownCamera(7)));
    }
}
