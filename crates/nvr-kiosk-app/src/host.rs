//! Seams between the controller and the world around it.
//!
//! [`HostShell`] is the native window and browser surface, [`PageSink`] is
//! the outbound half of the message bridge, and [`UpdateService`] is the
//! optional self-update backend.

use nvr_kiosk_auth::Credentials;
use nvr_kiosk_bridge::{InvokeResponse, ReceiveMessage};
use nvr_kiosk_core::{UiState, UpdateActionResult};
use nvr_kiosk_ui::{BroadcastError, UiBroadcaster, UiCommand};

/// Blocking status the host shows over (or instead of) the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellStatus {
    /// No usable endpoint is configured; the setup page is shown.
    SetupRequired,
    /// The page did not finish loading within the watchdog window.
    ConnectionTimedOut {
        /// URL that was being loaded, when known.
        url: Option<String>,
    },
    /// The browser surface reported a load failure.
    LoadFailed {
        /// Failure text from the browser surface.
        reason: String,
    },
    /// Automated login is throttled or untrustworthy.
    ManualLoginRequired {
        /// When automated attempts may resume, 0 when unknown.
        resets_at_ms: u64,
    },
    /// Persisted config could not be read; running on defaults.
    ConfigUnavailable {
        /// Underlying error text.
        reason: String,
    },
}

/// Native window and browser surface.
pub trait HostShell {
    /// Actual fullscreen state of the window.
    fn is_fullscreen(&self) -> bool;
    /// Asks the window to enter or leave fullscreen. The resulting change is
    /// reported back as a host event.
    fn set_fullscreen(&mut self, fullscreen: bool);
    /// Navigates the browser surface.
    fn load_url(&mut self, url: &str);
    /// Relaunches the shell process.
    fn relaunch(&mut self);
    /// Asks the operator to confirm a reset.
    fn confirm_reset(&mut self) -> bool;
    /// Fills and submits the detected login form.
    fn submit_credentials(&mut self, credentials: &Credentials);
    /// Shows a blocking status.
    fn show_status(&mut self, status: ShellStatus);
    /// Reflects the authoritative UI state in native chrome (menu checks).
    fn render_ui_state(&mut self, state: UiState);
    /// Whether GPU compositing is active.
    fn hardware_acceleration(&self) -> bool;
    /// Version string of the embedded browser engine.
    fn engine_version(&self) -> String;
}

/// Outbound half of the message bridge.
pub trait PageSink {
    /// Delivers a broadcast to the page.
    fn deliver(&mut self, message: &ReceiveMessage) -> Result<(), BroadcastError>;
    /// Answers an invoke request.
    fn reply(&mut self, id: u64, outcome: Result<&InvokeResponse, &str>)
    -> Result<(), BroadcastError>;
}

/// Self-update backend.
pub trait UpdateService {
    /// Checks for an update on operator request.
    fn check_manual(&mut self) -> UpdateActionResult;
    /// Downloads the available update.
    fn download(&mut self) -> UpdateActionResult;
    /// Installs the downloaded update and restarts.
    fn install(&mut self);
}

/// Update backend for builds without self-update.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledUpdates;

impl UpdateService for DisabledUpdates {
    fn check_manual(&mut self) -> UpdateActionResult {
        UpdateActionResult::failed("updates are disabled in this build")
    }

    fn download(&mut self) -> UpdateActionResult {
        UpdateActionResult::failed("updates are disabled in this build")
    }

    fn install(&mut self) {
        tracing::info!(stage = "updates", action = "install_skipped", "updates disabled");
    }
}

/// Adapts a page sink and host into the UI machine's broadcaster: each
/// command goes to the page, and on success the host chrome follows.
pub(crate) struct ShellBroadcaster<'a, H: ?Sized, P: ?Sized> {
    pub(crate) host: &'a mut H,
    pub(crate) page: &'a mut P,
}

impl<H, P> UiBroadcaster for ShellBroadcaster<'_, H, P>
where
    H: HostShell + ?Sized,
    P: PageSink + ?Sized,
{
    fn broadcast(&mut self, command: UiCommand, state: UiState) -> Result<(), BroadcastError> {
        self.page.deliver(&ReceiveMessage::from(command))?;
        self.host.render_ui_state(state);
        Ok(())
    }
}
