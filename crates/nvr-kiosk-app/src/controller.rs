//! Controller orchestration.
//!
//! The [`Controller`] is the single writer of every piece of shell state: UI
//! flags, tracked timeouts, cached config, camera inventory, and the
//! per-origin send gate. It is driven by three inputs (page messages, host
//! events, and due timers), all delivered on one thread.

use std::sync::Arc;

use nvr_kiosk_auth::{AutoLoginDecision, LoginThrottle, ThrottlePolicy, evaluate_auto_login};
use nvr_kiosk_bridge::{
    BridgeError, InvokeRequest, InvokeResponse, PageMessage, ReceiveMessage, SendGate,
    SendMessage, decode_page_message,
};
use nvr_kiosk_config::ConfigStore;
use nvr_kiosk_core::{
    Config, ConfigPatch, DownloadProgress, SystemDiagnostics, UiState, UpdateInfo, WindowBounds,
    validate_endpoint_url,
};
use nvr_kiosk_timeouts::{Purpose, TimeoutRegistry};
use nvr_kiosk_ui::{CameraZoom, PageReport, ToggleKind, ToggleOutcome, UiStateMachine};

use crate::host::{HostShell, PageSink, ShellBroadcaster, ShellStatus, UpdateService};
use crate::{AppError, DisabledUpdates, app_version, auto_login_enabled_from_env};

/// Page load watchdog.
pub const CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// How long a toggle may wait for the page's acknowledgement.
pub const TOGGLE_SETTLE_MS: u64 = 1_000;

/// Quiet period before window placement is persisted.
pub const WINDOW_BOUNDS_DEBOUNCE_MS: u64 = 500;

/// Tunables for one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Page load watchdog duration.
    pub connection_timeout_ms: u64,
    /// Toggle acknowledgement deadline.
    pub toggle_settle_ms: u64,
    /// Window bounds debounce.
    pub bounds_debounce_ms: u64,
    /// Whether detected login forms may be filled automatically.
    pub auto_login_enabled: bool,
    /// Login throttle limits.
    pub throttle: ThrottlePolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            connection_timeout_ms: CONNECTION_TIMEOUT_MS,
            toggle_settle_ms: TOGGLE_SETTLE_MS,
            bounds_debounce_ms: WINDOW_BOUNDS_DEBOUNCE_MS,
            auto_login_enabled: true,
            throttle: ThrottlePolicy::default(),
        }
    }
}

impl ControllerSettings {
    /// Defaults with the auto-login kill switch read from the environment.
    pub fn from_env() -> Self {
        Self {
            auto_login_enabled: auto_login_enabled_from_env(),
            ..Self::default()
        }
    }
}

/// Work scheduled through the tracked timeout registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// The page did not finish loading in time.
    ConnectionTimeout,
    /// Release a toggle the page never acknowledged.
    ToggleSettle,
    /// Persist the latest window placement.
    SaveWindowBounds,
}

/// Keyboard or menu shortcut handled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Visibility toggle.
    Toggle(ToggleKind),
    /// Restore the default dashboard layout.
    ReturnToDashboard,
    /// Flip window fullscreen.
    ToggleFullscreen,
    /// Zoom a camera by its index.
    ZoomCamera(u32),
}

/// Update backend notification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// An update can be downloaded.
    Available(UpdateInfo),
    /// An update is ready to install.
    Downloaded(UpdateInfo),
    /// The backend failed.
    Error(String),
    /// Download progress.
    Progress(DownloadProgress),
}

/// Event raised by the native window or browser surface.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Navigation started; the previous page is gone.
    PageLoadStarted,
    /// The page finished loading.
    PageLoadFinished,
    /// The page failed to load.
    PageLoadFailed {
        /// Failure text from the browser surface.
        reason: String,
    },
    /// The window entered or left fullscreen.
    FullscreenChanged(bool),
    /// A shortcut was pressed.
    Shortcut(Shortcut),
    /// The loaded page contains a login form.
    LoginFormDetected,
    /// The window moved or resized.
    WindowBoundsChanged(WindowBounds),
    /// Update backend notification.
    Update(UpdateEvent),
}

/// Read-only view of the controller for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    /// Authoritative UI projection.
    pub ui: UiState,
    /// Whether a toggle holds the guard.
    pub toggling: bool,
    /// Whether the page reports the dashboard.
    pub on_dashboard: bool,
    /// Purposes with a pending timeout.
    pub pending_timers: Vec<String>,
    /// Camera the page reports as zoomed.
    pub zoomed_camera: Option<u32>,
}

const KNOWN_PURPOSES: [Purpose; 3] = [
    Purpose::CONNECTION_TIMEOUT,
    Purpose::TOGGLE_SETTLE,
    Purpose::WINDOW_BOUNDS_SAVE,
];

/// Single-threaded owner of the kiosk shell state.
pub struct Controller<H, P> {
    host: H,
    page: P,
    updates: Box<dyn UpdateService>,
    store: Arc<dyn ConfigStore>,
    config: Config,
    settings: ControllerSettings,
    ui: UiStateMachine,
    cameras: CameraZoom,
    timeouts: TimeoutRegistry<TimerTask>,
    throttle: LoginThrottle,
    send_gate: SendGate,
    on_dashboard: bool,
    current_url: Option<String>,
    pending_bounds: Option<WindowBounds>,
    relaunch_requested: bool,
}

impl<H: HostShell, P: PageSink> Controller<H, P> {
    /// Creates a controller with updates disabled. Call [`Controller::start`]
    /// before feeding events.
    pub fn new(
        host: H,
        page: P,
        store: Arc<dyn ConfigStore>,
        settings: ControllerSettings,
    ) -> Self {
        let throttle = LoginThrottle::new(settings.throttle, Arc::clone(&store));
        Self {
            host,
            page,
            updates: Box::new(DisabledUpdates),
            store,
            config: Config::default(),
            settings,
            ui: UiStateMachine::new(),
            cameras: CameraZoom::new(),
            timeouts: TimeoutRegistry::new(),
            throttle,
            send_gate: SendGate::new(),
            on_dashboard: false,
            current_url: None,
            pending_bounds: None,
            relaunch_requested: false,
        }
    }

    /// Replaces the update backend.
    pub fn with_updates(mut self, updates: Box<dyn UpdateService>) -> Self {
        self.updates = updates;
        self
    }

    /// Host shell.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Host shell, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Page sink.
    pub fn page(&self) -> &P {
        &self.page
    }

    /// Page sink, mutably.
    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    /// Cached config. Falls back to defaults when the store is unreadable.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// UI state machine.
    pub fn ui(&self) -> &UiStateMachine {
        &self.ui
    }

    /// Camera inventory.
    pub fn cameras(&self) -> &CameraZoom {
        &self.cameras
    }

    /// Tracked timeouts.
    pub fn timeouts(&self) -> &TimeoutRegistry<TimerTask> {
        &self.timeouts
    }

    /// Whether the page last reported the dashboard.
    pub fn on_dashboard(&self) -> bool {
        self.on_dashboard
    }

    /// Whether a restart or reset asked the shell to relaunch.
    pub fn relaunch_requested(&self) -> bool {
        self.relaunch_requested
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timeouts.next_deadline()
    }

    /// Status snapshot.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            ui: self.ui.projection(),
            toggling: self.ui.is_toggling(),
            on_dashboard: self.on_dashboard,
            pending_timers: KNOWN_PURPOSES
                .iter()
                .filter(|purpose| self.timeouts.is_pending(purpose.as_str()))
                .map(|purpose| purpose.as_str().to_owned())
                .collect(),
            zoomed_camera: self.cameras.zoomed(),
        }
    }

    /// Loads config and opens the configured dashboard, or the setup page
    /// when no valid endpoint is stored.
    pub fn start(&mut self, now_ms: u64) {
        match self.store.load() {
            Ok(config) => self.config = config,
            Err(error) => {
                tracing::warn!(
                    stage = "config",
                    action = "load_failed",
                    %error,
                    "running on default config"
                );
                self.config = Config::default();
                self.host.show_status(ShellStatus::ConfigUnavailable {
                    reason: error.to_string(),
                });
            }
        }

        match self.config.endpoint() {
            Ok(endpoint) => self.navigate(endpoint.to_string(), now_ms),
            Err(error) => {
                tracing::info!(stage = "startup", action = "setup_required", %error, "no endpoint");
                self.host.show_status(ShellStatus::SetupRequired);
            }
        }
    }

    /// Decodes and dispatches one raw page envelope.
    ///
    /// # Errors
    /// Returns [`AppError::Bridge`] when the envelope violates the message
    /// contract. Nothing is dispatched in that case, but an invoke whose id
    /// could be read is still answered with a failed reply.
    pub fn handle_page_line(&mut self, raw: &str, now_ms: u64) -> Result<(), AppError> {
        match decode_page_message(raw) {
            Ok(message) => {
                self.handle_page_message(message, now_ms);
                Ok(())
            }
            Err(error) => {
                if let BridgeError::InvalidInvoke { id, source } = &error {
                    let text = source.to_string();
                    if let Err(lost) = self.page.reply(*id, Err(&text)) {
                        tracing::warn!(stage = "bridge", action = "reply_lost", id, %lost);
                    }
                }
                Err(error.into())
            }
        }
    }

    /// Dispatches one decoded page message.
    pub fn handle_page_message(&mut self, message: PageMessage, now_ms: u64) {
        match message {
            PageMessage::Invoke { id, request } => {
                let channel = request.channel().name();
                let outcome = self.handle_invoke(request);
                let delivered = match &outcome {
                    Ok(response) => self.page.reply(id, Ok(response)),
                    Err(error) => {
                        tracing::warn!(stage = "bridge", action = "invoke_failed", channel, %error);
                        let text = error.to_string();
                        self.page.reply(id, Err(&text))
                    }
                };
                if let Err(error) = delivered {
                    tracing::warn!(stage = "bridge", action = "reply_lost", channel, id, %error);
                }
            }
            PageMessage::Send { seq, message } => {
                if !self.send_gate.admit(seq) {
                    return;
                }
                let channel = message.channel().name();
                if let Err(error) = self.handle_send(message, now_ms) {
                    tracing::warn!(stage = "bridge", action = "send_failed", channel, %error);
                }
            }
        }
    }

    /// Dispatches one host event.
    pub fn handle_host_event(&mut self, event: HostEvent, now_ms: u64) {
        match event {
            HostEvent::PageLoadStarted => self.begin_page_lifecycle(now_ms),
            HostEvent::PageLoadFinished => {
                self.timeouts.clear_timeout(Purpose::CONNECTION_TIMEOUT.as_str());
                let actual = self.host.is_fullscreen();
                self.sync_fullscreen(actual);
            }
            HostEvent::PageLoadFailed { reason } => {
                self.timeouts.clear_timeout(Purpose::CONNECTION_TIMEOUT.as_str());
                tracing::warn!(stage = "page", action = "load_failed", %reason);
                self.host.show_status(ShellStatus::LoadFailed { reason });
            }
            HostEvent::FullscreenChanged(is_fullscreen) => self.sync_fullscreen(is_fullscreen),
            HostEvent::Shortcut(shortcut) => self.handle_shortcut(shortcut, now_ms),
            HostEvent::LoginFormDetected => self.auto_login(now_ms),
            HostEvent::WindowBoundsChanged(bounds) => {
                self.pending_bounds = Some(bounds);
                self.timeouts.set_tracked_timeout(
                    Purpose::WINDOW_BOUNDS_SAVE,
                    TimerTask::SaveWindowBounds,
                    self.settings.bounds_debounce_ms,
                    now_ms,
                );
            }
            HostEvent::Update(event) => self.forward_update(event),
        }
    }

    /// Runs every timer due at `now_ms`. Timers armed while draining wait
    /// for the next call. Returns the number of timers run.
    pub fn fire_due_timeouts(&mut self, now_ms: u64) -> usize {
        let fence = self.timeouts.fence();
        let mut fired = 0;
        while let Some(timeout) = self.timeouts.pop_due(now_ms, fence) {
            fired += 1;
            if let Err(error) = self.run_timer(timeout.task) {
                tracing::warn!(
                    stage = "timeouts",
                    action = "task_failed",
                    purpose = %timeout.purpose,
                    %error
                );
            }
        }
        fired
    }

    fn handle_invoke(&mut self, request: InvokeRequest) -> Result<InvokeResponse, AppError> {
        let response = match request {
            InvokeRequest::ConfigLoad => {
                let config = self.store.load()?;
                self.config = config.clone();
                InvokeResponse::Config(config)
            }
            InvokeRequest::ConfigSavePartial(patch) => {
                let saved = self.save_page_patch(patch);
                InvokeResponse::Saved(saved.is_ok())
            }
            InvokeRequest::IsFullScreen => {
                let actual = self.host.is_fullscreen();
                if actual != self.ui.internal().is_fullscreen {
                    self.sync_fullscreen(actual);
                }
                InvokeResponse::IsFullScreen(actual)
            }
            InvokeRequest::ShowResetConfirmation => {
                InvokeResponse::ResetConfirmed(self.host.confirm_reset())
            }
            InvokeRequest::GetSystemDiagnostics => InvokeResponse::Diagnostics(SystemDiagnostics {
                hardware_acceleration: self.host.hardware_acceleration(),
                platform: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                runtime_version: app_version().to_string(),
                browser_engine_version: self.host.engine_version(),
            }),
            InvokeRequest::UpdatesCheckManual => {
                InvokeResponse::UpdateAction(self.updates.check_manual())
            }
            InvokeRequest::UpdatesDownload => InvokeResponse::UpdateAction(self.updates.download()),
            InvokeRequest::UpdatesInstall => {
                self.updates.install();
                InvokeResponse::Installed
            }
            InvokeRequest::GetAppVersion => InvokeResponse::AppVersion(app_version().to_string()),
        };
        Ok(response)
    }

    fn handle_send(&mut self, message: SendMessage, now_ms: u64) -> Result<(), AppError> {
        match message {
            SendMessage::ConfigSave(patch) => self.save_page_patch(patch),
            SendMessage::LoadUrl(url) => {
                self.navigate(url, now_ms);
                Ok(())
            }
            SendMessage::Restart => {
                self.restart();
                Ok(())
            }
            SendMessage::Reset => self.reset(),
            SendMessage::ToggleFullscreen => {
                self.toggle_fullscreen();
                Ok(())
            }
            SendMessage::UpdateDashboardState(is_dashboard) => {
                self.update_dashboard_state(is_dashboard)
            }
            SendMessage::UpdateUiState(reported) => {
                self.apply_page_report(reported);
                Ok(())
            }
            SendMessage::UpdateCameraList(cameras) => {
                self.cameras.update_list(cameras);
                Ok(())
            }
            SendMessage::UpdateCameraZoom(index) => {
                self.cameras.record_zoom(index);
                Ok(())
            }
        }
    }

    fn handle_shortcut(&mut self, shortcut: Shortcut, now_ms: u64) {
        match shortcut {
            Shortcut::Toggle(kind) => {
                let mut broadcaster = ShellBroadcaster {
                    host: &mut self.host,
                    page: &mut self.page,
                };
                if let ToggleOutcome::Applied(_) = self.ui.request_toggle(kind, &mut broadcaster) {
                    self.timeouts.set_tracked_timeout(
                        Purpose::TOGGLE_SETTLE,
                        TimerTask::ToggleSettle,
                        self.settings.toggle_settle_ms,
                        now_ms,
                    );
                }
            }
            Shortcut::ReturnToDashboard => {
                let mut broadcaster = ShellBroadcaster {
                    host: &mut self.host,
                    page: &mut self.page,
                };
                if let Err(error) = self.ui.return_to_dashboard(&mut broadcaster) {
                    tracing::warn!(stage = "ui", action = "return_failed", %error, "rolled back");
                }
            }
            Shortcut::ToggleFullscreen => self.toggle_fullscreen(),
            Shortcut::ZoomCamera(index) => match self.cameras.zoom_request(index) {
                Ok(index) => {
                    if let Err(error) = self.page.deliver(&ReceiveMessage::ZoomCamera(index)) {
                        tracing::warn!(stage = "ui", action = "zoom_failed", index, %error);
                    }
                }
                Err(error) => {
                    tracing::debug!(stage = "ui", action = "zoom_ignored", index, %error);
                }
            },
        }
    }

    fn run_timer(&mut self, task: TimerTask) -> Result<(), AppError> {
        match task {
            TimerTask::ConnectionTimeout => {
                tracing::warn!(
                    stage = "page",
                    action = "connection_timeout",
                    url = self.current_url.as_deref().unwrap_or("-"),
                    "page did not finish loading"
                );
                self.host.show_status(ShellStatus::ConnectionTimedOut {
                    url: self.current_url.clone(),
                });
            }
            TimerTask::ToggleSettle => {
                if let Some(kind) = self.ui.complete_toggle() {
                    tracing::debug!(stage = "ui", action = "toggle_settled", ?kind, "no page ack");
                }
            }
            TimerTask::SaveWindowBounds => self.save_window_bounds()?,
        }
        Ok(())
    }

    /// Navigates to `url` and starts a fresh page lifecycle.
    fn navigate(&mut self, url: String, now_ms: u64) {
        self.begin_page_lifecycle(now_ms);
        self.on_dashboard = false;
        tracing::info!(stage = "page", action = "navigate", url = %url);
        self.host.load_url(&url);
        self.current_url = Some(url);
    }

    /// The previous page and everything scheduled for it are gone.
    fn begin_page_lifecycle(&mut self, now_ms: u64) {
        self.flush_window_bounds();
        let cleared = self.timeouts.clear_all_timeouts();
        self.ui.abort_toggle();
        self.send_gate.reset();
        self.timeouts.set_tracked_timeout(
            Purpose::CONNECTION_TIMEOUT,
            TimerTask::ConnectionTimeout,
            self.settings.connection_timeout_ms,
            now_ms,
        );
        tracing::debug!(stage = "page", action = "lifecycle_reset", cleared);
    }

    fn restart(&mut self) {
        self.flush_window_bounds();
        self.timeouts.clear_all_timeouts();
        self.ui.abort_toggle();
        self.relaunch_requested = true;
        tracing::info!(stage = "shell", action = "relaunch", "restart requested");
        self.host.relaunch();
    }

    fn reset(&mut self) -> Result<(), AppError> {
        self.pending_bounds = None;
        self.store.clear()?;
        self.config = Config::default();
        tracing::info!(stage = "config", action = "reset", "persisted config cleared");
        self.restart();
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        let target = !self.host.is_fullscreen();
        self.host.set_fullscreen(target);
    }

    fn sync_fullscreen(&mut self, is_fullscreen: bool) {
        let mut broadcaster = ShellBroadcaster {
            host: &mut self.host,
            page: &mut self.page,
        };
        if let Err(error) = self.ui.sync_fullscreen(is_fullscreen, &mut broadcaster) {
            tracing::warn!(stage = "ui", action = "fullscreen_unsent", is_fullscreen, %error);
            self.host.render_ui_state(self.ui.projection());
        }
    }

    fn apply_page_report(&mut self, reported: UiState) {
        if self.ui.apply_page_report(reported) == PageReport::Acknowledged {
            self.timeouts.clear_timeout(Purpose::TOGGLE_SETTLE.as_str());
        }

        let actual = self.ui.internal().is_fullscreen;
        if reported.is_fullscreen != actual {
            tracing::debug!(stage = "ui", action = "fullscreen_corrected", actual);
            self.sync_fullscreen(actual);
        } else {
            self.host.render_ui_state(self.ui.projection());
        }
    }

    fn update_dashboard_state(&mut self, is_dashboard: bool) -> Result<(), AppError> {
        let reached = is_dashboard && !self.on_dashboard;
        self.on_dashboard = is_dashboard;
        if is_dashboard {
            self.timeouts.clear_timeout(Purpose::CONNECTION_TIMEOUT.as_str());
        }
        if reached {
            tracing::info!(stage = "auth", action = "dashboard_reached");
            self.throttle.record_success()?;
        }
        Ok(())
    }

    fn auto_login(&mut self, now_ms: u64) {
        let enabled = self.settings.auto_login_enabled;
        match evaluate_auto_login(&self.config, &self.throttle, enabled, now_ms) {
            AutoLoginDecision::Submit {
                credentials,
                throttle,
            } => {
                tracing::info!(
                    stage = "auth",
                    action = "auto_login",
                    remaining = throttle.remaining,
                    "submitting stored credentials"
                );
                self.host.submit_credentials(&credentials);
            }
            AutoLoginDecision::Disabled => {
                tracing::info!(stage = "auth", action = "auto_login_disabled", "kill switch set");
            }
            AutoLoginDecision::MissingCredentials => {
                tracing::debug!(stage = "auth", action = "no_credentials");
            }
            AutoLoginDecision::Blocked(decision) => {
                tracing::warn!(
                    stage = "auth",
                    action = "throttled",
                    attempts = decision.attempts,
                    resets_at_ms = decision.resets_at_ms,
                    "manual login required"
                );
                self.host.show_status(ShellStatus::ManualLoginRequired {
                    resets_at_ms: decision.resets_at_ms,
                });
            }
        }
    }

    fn forward_update(&mut self, event: UpdateEvent) {
        let message = match event {
            UpdateEvent::Available(info) => ReceiveMessage::UpdateAvailable(info),
            UpdateEvent::Downloaded(info) => ReceiveMessage::UpdateDownloaded(info),
            UpdateEvent::Error(text) => ReceiveMessage::UpdateError(text),
            UpdateEvent::Progress(progress) => ReceiveMessage::DownloadProgress(progress),
        };
        if let Err(error) = self.page.deliver(&message) {
            let channel = message.channel().name();
            tracing::warn!(stage = "updates", action = "forward_failed", channel, %error);
        }
    }

    /// Persists a page-originated patch. The page may not touch the login
    /// throttle counters.
    fn save_page_patch(&mut self, mut patch: ConfigPatch) -> Result<(), AppError> {
        let counters = (patch.login_attempts.take(), patch.login_attempts_reset_time.take());
        if counters != (None, None) {
            tracing::warn!(
                stage = "config",
                action = "counters_stripped",
                "page patch tried to write login counters"
            );
        }
        if let Some(url) = patch.url.as_deref().filter(|url| !url.trim().is_empty()) {
            if let Err(error) = validate_endpoint_url(url) {
                tracing::warn!(stage = "config", action = "patch_rejected", %error);
                return Err(error.into());
            }
        }
        if patch.is_empty() {
            return Ok(());
        }

        if let Err(error) = self.store.save(&patch) {
            tracing::warn!(stage = "config", action = "save_failed", %error);
            return Err(error.into());
        }
        self.config.apply_patch(&patch);
        Ok(())
    }

    fn save_window_bounds(&mut self) -> Result<(), AppError> {
        let Some(bounds) = self.pending_bounds.take() else {
            return Ok(());
        };
        self.store.save(&ConfigPatch::window_bounds(bounds))?;
        self.config.window_bounds = bounds;
        tracing::debug!(stage = "config", action = "bounds_saved", ?bounds);
        Ok(())
    }

    fn flush_window_bounds(&mut self) {
        if self.pending_bounds.is_none() {
            return;
        }
        self.timeouts.clear_timeout(Purpose::WINDOW_BOUNDS_SAVE.as_str());
        if let Err(error) = self.save_window_bounds() {
            tracing::warn!(stage = "config", action = "bounds_lost", %error);
        }
    }
}
