//! Shared fixtures for app integration tests.

use std::sync::Arc;

use nvr_kiosk_app::{Controller, ControllerSettings, HostShell, PageSink, ShellStatus};
use nvr_kiosk_auth::Credentials;
use nvr_kiosk_bridge::{InvokeResponse, ReceiveMessage};
use nvr_kiosk_config::{ConfigError, ConfigStore, MemoryConfigStore};
use nvr_kiosk_core::{Config, ConfigPatch, UiState};
use nvr_kiosk_ui::BroadcastError;

/// Dashboard URL used by fixtures.
#[allow(dead_code)]
pub const DASHBOARD_URL: &str = "https://nvr.local/";

/// Host that records every side effect.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FakeHost {
    pub fullscreen: bool,
    pub confirm_reset: bool,
    pub fullscreen_requests: Vec<bool>,
    pub loaded: Vec<String>,
    pub statuses: Vec<ShellStatus>,
    pub submitted: Vec<Credentials>,
    pub rendered: Vec<UiState>,
    pub relaunches: u32,
}

impl HostShell for FakeHost {
    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen_requests.push(fullscreen);
    }

    fn load_url(&mut self, url: &str) {
        self.loaded.push(url.to_string());
    }

    fn relaunch(&mut self) {
        self.relaunches += 1;
    }

    fn confirm_reset(&mut self) -> bool {
        self.confirm_reset
    }

    fn submit_credentials(&mut self, credentials: &Credentials) {
        self.submitted.push(credentials.clone());
    }

    fn show_status(&mut self, status: ShellStatus) {
        self.statuses.push(status);
    }

    fn render_ui_state(&mut self, state: UiState) {
        self.rendered.push(state);
    }

    fn hardware_acceleration(&self) -> bool {
        true
    }

    fn engine_version(&self) -> String {
        "test-engine 1.0".to_string()
    }
}

/// Page sink that records broadcasts and replies.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingPage {
    pub delivered: Vec<ReceiveMessage>,
    pub replies: Vec<(u64, Result<InvokeResponse, String>)>,
    pub unreachable: bool,
}

impl RecordingPage {
    /// Last reply recorded for `id`.
    #[allow(dead_code)]
    pub fn reply_for(&self, id: u64) -> Option<&Result<InvokeResponse, String>> {
        self.replies
            .iter()
            .rev()
            .find(|(reply_id, _)| *reply_id == id)
            .map(|(_, outcome)| outcome)
    }
}

impl PageSink for RecordingPage {
    fn deliver(&mut self, message: &ReceiveMessage) -> Result<(), BroadcastError> {
        if self.unreachable {
            return Err(BroadcastError("page gone".to_string()));
        }
        self.delivered.push(message.clone());
        Ok(())
    }

    fn reply(
        &mut self,
        id: u64,
        outcome: Result<&InvokeResponse, &str>,
    ) -> Result<(), BroadcastError> {
        self.replies.push((id, outcome.cloned().map_err(str::to_string)));
        Ok(())
    }
}

/// Store whose every operation fails.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FailingStore;

impl ConfigStore for FailingStore {
    fn load(&self) -> Result<Config, ConfigError> {
        Err(ConfigError::Poisoned)
    }

    fn save(&self, _patch: &ConfigPatch) -> Result<(), ConfigError> {
        Err(ConfigError::Poisoned)
    }

    fn clear(&self) -> Result<(), ConfigError> {
        Err(ConfigError::Poisoned)
    }
}

/// Controller under test.
#[allow(dead_code)]
pub type TestController = Controller<FakeHost, RecordingPage>;

/// Config with an endpoint and credentials.
#[allow(dead_code)]
pub fn configured() -> Config {
    Config {
        url: DASHBOARD_URL.to_string(),
        username: "viewer".to_string(),
        password: "s3cret".to_string(),
        ..Config::default()
    }
}

/// Started controller over an in-memory store seeded with `config`.
#[allow(dead_code)]
pub fn started(config: Config, now_ms: u64) -> (TestController, Arc<MemoryConfigStore>) {
    let store = Arc::new(MemoryConfigStore::with_config(config));
    let controller = started_with_store(store.clone(), ControllerSettings::default(), now_ms);
    (controller, store)
}

/// Started controller over `store`.
#[allow(dead_code)]
pub fn started_with_store(
    store: Arc<dyn ConfigStore>,
    settings: ControllerSettings,
    now_ms: u64,
) -> TestController {
    let mut controller =
        Controller::new(FakeHost::default(), RecordingPage::default(), store, settings);
    controller.start(now_ms);
    controller
}
