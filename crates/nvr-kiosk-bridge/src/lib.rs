#![warn(missing_docs)]
//! # nvr-kiosk-bridge
//!
//! ## Purpose
//! Defines the closed, versioned message contract between the kiosk
//! controller and the dashboard page.
//!
//! ## Responsibilities
//! - Enumerate every invoke, send, and receive channel by its wire name.
//! - Decode page envelopes into typed [`PageMessage`] values, rejecting
//!   unknown channels, wrong arity, and malformed payloads.
//! - Encode controller replies and broadcasts.
//! - Drop re-delivered or out-of-order sends per origin ([`SendGate`]).
//!
//! ## Data flow
//! Raw JSON line -> [`decode_page_message`] -> controller dispatch ->
//! [`InvokeResponse`] / [`ReceiveMessage`] -> [`encode_reply`] /
//! [`encode_receive`] -> page.
//!
//! ## Wire format
//! Every envelope carries the contract version `v`, a `kind`, a `channel`
//! name, and positional `args`:
//!
//! ```json
//! {"v":1,"kind":"invoke","id":7,"channel":"configLoad","args":[]}
//! {"v":1,"kind":"send","seq":3,"channel":"update-camera-zoom","args":[2]}
//! {"v":1,"kind":"reply","id":7,"ok":true,"result":{"url":"..."}}
//! {"v":1,"kind":"receive","channel":"fullscreen-change","args":[true]}
//! ```
//!
//! ## Error model
//! Contract violations return [`BridgeError`]; callers log and discard them.
//! Nothing in this crate panics on hostile input.
//!
//! ## Security and privacy notes
//! The page is semi-trusted. Payloads are decoded into owned, typed values
//! and URLs are validated before they reach the controller.

use nvr_kiosk_core::{
    CameraList, Config, ConfigPatch, DownloadProgress, SystemDiagnostics, UiState,
    UpdateActionResult, UpdateInfo, validate_endpoint_url,
};
use nvr_kiosk_ui::{ToggleKind, UiCommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Contract version carried in every envelope.
pub const CONTRACT_VERSION: u32 = 1;

/// Request/response channels (page -> controller -> page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeChannel {
    /// `configLoad`
    ConfigLoad,
    /// `configSavePartial`
    ConfigSavePartial,
    /// `isFullScreen`
    IsFullScreen,
    /// `showResetConfirmation`
    ShowResetConfirmation,
    /// `getSystemDiagnostics`
    GetSystemDiagnostics,
    /// `updates:check-manual`
    UpdatesCheckManual,
    /// `updates:download`
    UpdatesDownload,
    /// `updates:install`
    UpdatesInstall,
    /// `get-app-version`
    GetAppVersion,
}

impl InvokeChannel {
    /// Every invoke channel.
    pub const ALL: [Self; 9] = [
        Self::ConfigLoad,
        Self::ConfigSavePartial,
        Self::IsFullScreen,
        Self::ShowResetConfirmation,
        Self::GetSystemDiagnostics,
        Self::UpdatesCheckManual,
        Self::UpdatesDownload,
        Self::UpdatesInstall,
        Self::GetAppVersion,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConfigLoad => "configLoad",
            Self::ConfigSavePartial => "configSavePartial",
            Self::IsFullScreen => "isFullScreen",
            Self::ShowResetConfirmation => "showResetConfirmation",
            Self::GetSystemDiagnostics => "getSystemDiagnostics",
            Self::UpdatesCheckManual => "updates:check-manual",
            Self::UpdatesDownload => "updates:download",
            Self::UpdatesInstall => "updates:install",
            Self::GetAppVersion => "get-app-version",
        }
    }

    /// Looks up a channel by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }
}

/// Fire-and-forget channels (page -> controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendChannel {
    /// `configSave`
    ConfigSave,
    /// `loadURL`
    LoadUrl,
    /// `restart`
    Restart,
    /// `reset`
    Reset,
    /// `toggleFullscreen`
    ToggleFullscreen,
    /// `update-dashboard-state`
    UpdateDashboardState,
    /// `update-ui-state`
    UpdateUiState,
    /// `update-camera-list`
    UpdateCameraList,
    /// `update-camera-zoom`
    UpdateCameraZoom,
}

impl SendChannel {
    /// Every send channel.
    pub const ALL: [Self; 9] = [
        Self::ConfigSave,
        Self::LoadUrl,
        Self::Restart,
        Self::Reset,
        Self::ToggleFullscreen,
        Self::UpdateDashboardState,
        Self::UpdateUiState,
        Self::UpdateCameraList,
        Self::UpdateCameraZoom,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConfigSave => "configSave",
            Self::LoadUrl => "loadURL",
            Self::Restart => "restart",
            Self::Reset => "reset",
            Self::ToggleFullscreen => "toggleFullscreen",
            Self::UpdateDashboardState => "update-dashboard-state",
            Self::UpdateUiState => "update-ui-state",
            Self::UpdateCameraList => "update-camera-list",
            Self::UpdateCameraZoom => "update-camera-zoom",
        }
    }

    /// Looks up a channel by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }
}

/// Broadcast channels (controller -> page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveChannel {
    /// `fullscreen-change`
    FullscreenChange,
    /// `toggle-navigation`
    ToggleNavigation,
    /// `toggle-nav-only`
    ToggleNavOnly,
    /// `toggle-header-only`
    ToggleHeaderOnly,
    /// `return-to-dashboard`
    ReturnToDashboard,
    /// `toggle-widget-panel`
    ToggleWidgetPanel,
    /// `zoom-camera`
    ZoomCamera,
    /// `update-available`
    UpdateAvailable,
    /// `update-downloaded`
    UpdateDownloaded,
    /// `update-error`
    UpdateError,
    /// `download-progress`
    DownloadProgress,
}

impl ReceiveChannel {
    /// Every receive channel.
    pub const ALL: [Self; 11] = [
        Self::FullscreenChange,
        Self::ToggleNavigation,
        Self::ToggleNavOnly,
        Self::ToggleHeaderOnly,
        Self::ReturnToDashboard,
        Self::ToggleWidgetPanel,
        Self::ZoomCamera,
        Self::UpdateAvailable,
        Self::UpdateDownloaded,
        Self::UpdateError,
        Self::DownloadProgress,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::FullscreenChange => "fullscreen-change",
            Self::ToggleNavigation => "toggle-navigation",
            Self::ToggleNavOnly => "toggle-nav-only",
            Self::ToggleHeaderOnly => "toggle-header-only",
            Self::ReturnToDashboard => "return-to-dashboard",
            Self::ToggleWidgetPanel => "toggle-widget-panel",
            Self::ZoomCamera => "zoom-camera",
            Self::UpdateAvailable => "update-available",
            Self::UpdateDownloaded => "update-downloaded",
            Self::UpdateError => "update-error",
            Self::DownloadProgress => "download-progress",
        }
    }

    /// Looks up a channel by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }
}

/// Typed invoke request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeRequest {
    /// Read the persisted config.
    ConfigLoad,
    /// Merge a partial config and report success.
    ConfigSavePartial(ConfigPatch),
    /// Query the window's fullscreen state.
    IsFullScreen,
    /// Ask the operator to confirm a config reset.
    ShowResetConfirmation,
    /// Collect runtime diagnostics.
    GetSystemDiagnostics,
    /// Check for updates on demand.
    UpdatesCheckManual,
    /// Download an available update.
    UpdatesDownload,
    /// Install a downloaded update.
    UpdatesInstall,
    /// Read the shell version.
    GetAppVersion,
}

impl InvokeRequest {
    /// Channel this request travels on.
    pub fn channel(&self) -> InvokeChannel {
        match self {
            Self::ConfigLoad => InvokeChannel::ConfigLoad,
            Self::ConfigSavePartial(_) => InvokeChannel::ConfigSavePartial,
            Self::IsFullScreen => InvokeChannel::IsFullScreen,
            Self::ShowResetConfirmation => InvokeChannel::ShowResetConfirmation,
            Self::GetSystemDiagnostics => InvokeChannel::GetSystemDiagnostics,
            Self::UpdatesCheckManual => InvokeChannel::UpdatesCheckManual,
            Self::UpdatesDownload => InvokeChannel::UpdatesDownload,
            Self::UpdatesInstall => InvokeChannel::UpdatesInstall,
            Self::GetAppVersion => InvokeChannel::GetAppVersion,
        }
    }

    fn args(&self) -> Result<Vec<Value>, BridgeError> {
        match self {
            Self::ConfigSavePartial(patch) => Ok(vec![serde_json::to_value(patch)?]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Typed invoke response.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeResponse {
    /// `configLoad` result.
    Config(Config),
    /// `configSavePartial` result.
    Saved(bool),
    /// `isFullScreen` result.
    IsFullScreen(bool),
    /// `showResetConfirmation` result.
    ResetConfirmed(bool),
    /// `getSystemDiagnostics` result.
    Diagnostics(SystemDiagnostics),
    /// `updates:check-manual` / `updates:download` result.
    UpdateAction(UpdateActionResult),
    /// `updates:install` result.
    Installed,
    /// `get-app-version` result.
    AppVersion(String),
}

impl InvokeResponse {
    /// JSON value placed in the reply's `result` field.
    pub fn to_value(&self) -> Result<Value, BridgeError> {
        let value = match self {
            Self::Config(config) => serde_json::to_value(config)?,
            Self::Saved(flag) | Self::IsFullScreen(flag) | Self::ResetConfirmed(flag) => {
                Value::Bool(*flag)
            }
            Self::Diagnostics(diagnostics) => serde_json::to_value(diagnostics)?,
            Self::UpdateAction(result) => serde_json::to_value(result)?,
            Self::Installed => Value::Null,
            Self::AppVersion(version) => Value::String(version.clone()),
        };
        Ok(value)
    }
}

/// Typed fire-and-forget message from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessage {
    /// Merge a partial config.
    ConfigSave(ConfigPatch),
    /// Navigate the browser surface. The URL has been validated.
    LoadUrl(String),
    /// Relaunch the shell.
    Restart,
    /// Clear persisted config and relaunch.
    Reset,
    /// Flip the window's fullscreen state.
    ToggleFullscreen,
    /// Whether the page currently shows the dashboard (vs. login/setup).
    UpdateDashboardState(bool),
    /// Page-reported UI projection.
    UpdateUiState(UiState),
    /// Page-reported camera inventory.
    UpdateCameraList(CameraList),
    /// Page-reported active zoom.
    UpdateCameraZoom(u32),
}

impl SendMessage {
    /// Channel this message travels on.
    pub fn channel(&self) -> SendChannel {
        match self {
            Self::ConfigSave(_) => SendChannel::ConfigSave,
            Self::LoadUrl(_) => SendChannel::LoadUrl,
            Self::Restart => SendChannel::Restart,
            Self::Reset => SendChannel::Reset,
            Self::ToggleFullscreen => SendChannel::ToggleFullscreen,
            Self::UpdateDashboardState(_) => SendChannel::UpdateDashboardState,
            Self::UpdateUiState(_) => SendChannel::UpdateUiState,
            Self::UpdateCameraList(_) => SendChannel::UpdateCameraList,
            Self::UpdateCameraZoom(_) => SendChannel::UpdateCameraZoom,
        }
    }

    fn args(&self) -> Result<Vec<Value>, BridgeError> {
        let args = match self {
            Self::ConfigSave(patch) => vec![serde_json::to_value(patch)?],
            Self::LoadUrl(url) => vec![Value::String(url.clone())],
            Self::Restart | Self::Reset | Self::ToggleFullscreen => Vec::new(),
            Self::UpdateDashboardState(flag) => vec![Value::Bool(*flag)],
            Self::UpdateUiState(state) => vec![serde_json::to_value(state)?],
            Self::UpdateCameraList(cameras) => vec![serde_json::to_value(cameras)?],
            Self::UpdateCameraZoom(index) => vec![Value::from(*index)],
        };
        Ok(args)
    }
}

/// Typed broadcast from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveMessage {
    /// Window fullscreen changed.
    FullscreenChange(bool),
    /// Flip navigation and header.
    ToggleNavigation,
    /// Flip navigation only.
    ToggleNavOnly,
    /// Flip header only.
    ToggleHeaderOnly,
    /// Restore default dashboard layout.
    ReturnToDashboard,
    /// Flip the page-local widget panel.
    ToggleWidgetPanel,
    /// Zoom the camera at this index.
    ZoomCamera(u32),
    /// An update is available.
    UpdateAvailable(UpdateInfo),
    /// An update finished downloading.
    UpdateDownloaded(UpdateInfo),
    /// The update service failed.
    UpdateError(String),
    /// Update download progress.
    DownloadProgress(DownloadProgress),
}

impl ReceiveMessage {
    /// Channel this message travels on.
    pub fn channel(&self) -> ReceiveChannel {
        match self {
            Self::FullscreenChange(_) => ReceiveChannel::FullscreenChange,
            Self::ToggleNavigation => ReceiveChannel::ToggleNavigation,
            Self::ToggleNavOnly => ReceiveChannel::ToggleNavOnly,
            Self::ToggleHeaderOnly => ReceiveChannel::ToggleHeaderOnly,
            Self::ReturnToDashboard => ReceiveChannel::ReturnToDashboard,
            Self::ToggleWidgetPanel => ReceiveChannel::ToggleWidgetPanel,
            Self::ZoomCamera(_) => ReceiveChannel::ZoomCamera,
            Self::UpdateAvailable(_) => ReceiveChannel::UpdateAvailable,
            Self::UpdateDownloaded(_) => ReceiveChannel::UpdateDownloaded,
            Self::UpdateError(_) => ReceiveChannel::UpdateError,
            Self::DownloadProgress(_) => ReceiveChannel::DownloadProgress,
        }
    }

    /// Positional arguments for the envelope.
    pub fn args(&self) -> Result<Vec<Value>, BridgeError> {
        let args = match self {
            Self::FullscreenChange(flag) => vec![Value::Bool(*flag)],
            Self::ToggleNavigation
            | Self::ToggleNavOnly
            | Self::ToggleHeaderOnly
            | Self::ReturnToDashboard
            | Self::ToggleWidgetPanel => Vec::new(),
            Self::ZoomCamera(index) => vec![Value::from(*index)],
            Self::UpdateAvailable(info) | Self::UpdateDownloaded(info) => {
                vec![serde_json::to_value(info)?]
            }
            Self::UpdateError(message) => vec![Value::String(message.clone())],
            Self::DownloadProgress(progress) => vec![serde_json::to_value(progress)?],
        };
        Ok(args)
    }
}

impl From<UiCommand> for ReceiveMessage {
    fn from(command: UiCommand) -> Self {
        match command {
            UiCommand::Toggle(ToggleKind::All) => Self::ToggleNavigation,
            UiCommand::Toggle(ToggleKind::NavOnly) => Self::ToggleNavOnly,
            UiCommand::Toggle(ToggleKind::HeaderOnly) => Self::ToggleHeaderOnly,
            UiCommand::Toggle(ToggleKind::WidgetPanel) => Self::ToggleWidgetPanel,
            UiCommand::ReturnToDashboard => Self::ReturnToDashboard,
            UiCommand::FullscreenChanged(flag) => Self::FullscreenChange(flag),
        }
    }
}

/// Decoded page envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMessage {
    /// Request awaiting exactly one reply with the same `id`.
    Invoke {
        /// Correlation id chosen by the page.
        id: u64,
        /// Typed request.
        request: InvokeRequest,
    },
    /// Fire-and-forget message.
    Send {
        /// Per-origin sequence number, when the page supplies one.
        seq: Option<u64>,
        /// Typed message.
        message: SendMessage,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EnvelopeKind {
    Invoke,
    Send,
    Reply,
    Receive,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Envelope {
    fn new(kind: EnvelopeKind) -> Self {
        Self {
            v: CONTRACT_VERSION,
            kind,
            id: None,
            seq: None,
            channel: None,
            args: None,
            ok: None,
            result: None,
            error: None,
        }
    }

    fn to_line(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(BridgeError::Codec)
    }
}

/// Decodes one page envelope.
///
/// # Errors
/// Returns [`BridgeError`] for invalid JSON, a different contract version,
/// controller-only envelope kinds, unknown channels, missing invoke ids,
/// wrong argument counts, and payloads that fail to decode or validate.
/// Failures on an invoke that carries an id are wrapped in
/// [`BridgeError::InvalidInvoke`] so the caller can still reply.
pub fn decode_page_message(raw: &str) -> Result<PageMessage, BridgeError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.v != CONTRACT_VERSION {
        return Err(BridgeError::UnsupportedVersion(envelope.v));
    }

    let args = envelope.args.unwrap_or_default();
    match envelope.kind {
        EnvelopeKind::Invoke => {
            let Some(id) = envelope.id else {
                let channel = invoke_channel(envelope.channel)?;
                return Err(BridgeError::MissingId(channel.name()));
            };
            invoke_channel(envelope.channel)
                .and_then(|channel| decode_invoke(channel, args))
                .map(|request| PageMessage::Invoke { id, request })
                .map_err(|source| BridgeError::InvalidInvoke {
                    id,
                    source: Box::new(source),
                })
        }
        EnvelopeKind::Send => {
            let channel_name = envelope.channel.ok_or(BridgeError::MissingChannel)?;
            let channel = SendChannel::from_name(&channel_name).ok_or_else(|| {
                BridgeError::UnknownChannel {
                    kind: "send",
                    name: channel_name.clone(),
                }
            })?;
            let message = decode_send(channel, args)?;
            Ok(PageMessage::Send {
                seq: envelope.seq,
                message,
            })
        }
        EnvelopeKind::Reply | EnvelopeKind::Receive => Err(BridgeError::WrongDirection(
            envelope.channel.unwrap_or_default(),
        )),
    }
}

fn invoke_channel(name: Option<String>) -> Result<InvokeChannel, BridgeError> {
    let name = name.ok_or(BridgeError::MissingChannel)?;
    InvokeChannel::from_name(&name).ok_or(BridgeError::UnknownChannel {
        kind: "invoke",
        name,
    })
}

fn decode_invoke(channel: InvokeChannel, args: Vec<Value>) -> Result<InvokeRequest, BridgeError> {
    let name = channel.name();
    let request = match channel {
        InvokeChannel::ConfigSavePartial => {
            let patch = single_arg(name, args)?;
            return Ok(InvokeRequest::ConfigSavePartial(decode_arg(name, patch)?));
        }
        InvokeChannel::ConfigLoad => InvokeRequest::ConfigLoad,
        InvokeChannel::IsFullScreen => InvokeRequest::IsFullScreen,
        InvokeChannel::ShowResetConfirmation => InvokeRequest::ShowResetConfirmation,
        InvokeChannel::GetSystemDiagnostics => InvokeRequest::GetSystemDiagnostics,
        InvokeChannel::UpdatesCheckManual => InvokeRequest::UpdatesCheckManual,
        InvokeChannel::UpdatesDownload => InvokeRequest::UpdatesDownload,
        InvokeChannel::UpdatesInstall => InvokeRequest::UpdatesInstall,
        InvokeChannel::GetAppVersion => InvokeRequest::GetAppVersion,
    };
    no_args(name, args)?;
    Ok(request)
}

fn decode_send(channel: SendChannel, args: Vec<Value>) -> Result<SendMessage, BridgeError> {
    let name = channel.name();
    let message = match channel {
        SendChannel::Restart => {
            no_args(name, args)?;
            SendMessage::Restart
        }
        SendChannel::Reset => {
            no_args(name, args)?;
            SendMessage::Reset
        }
        SendChannel::ToggleFullscreen => {
            no_args(name, args)?;
            SendMessage::ToggleFullscreen
        }
        SendChannel::ConfigSave => {
            SendMessage::ConfigSave(decode_arg(name, single_arg(name, args)?)?)
        }
        SendChannel::LoadUrl => {
            let url: String = decode_arg(name, single_arg(name, args)?)?;
            let parsed = validate_endpoint_url(&url).map_err(|error| BridgeError::Payload {
                channel: name,
                reason: error.to_string(),
            })?;
            SendMessage::LoadUrl(parsed.into())
        }
        SendChannel::UpdateDashboardState => {
            SendMessage::UpdateDashboardState(decode_arg(name, single_arg(name, args)?)?)
        }
        SendChannel::UpdateUiState => {
            SendMessage::UpdateUiState(decode_arg(name, single_arg(name, args)?)?)
        }
        SendChannel::UpdateCameraList => {
            SendMessage::UpdateCameraList(decode_arg(name, single_arg(name, args)?)?)
        }
        SendChannel::UpdateCameraZoom => {
            SendMessage::UpdateCameraZoom(decode_arg(name, single_arg(name, args)?)?)
        }
    };
    Ok(message)
}

fn no_args(channel: &'static str, args: Vec<Value>) -> Result<(), BridgeError> {
    let [] = take_args::<0>(channel, args)?;
    Ok(())
}

fn single_arg(channel: &'static str, args: Vec<Value>) -> Result<Value, BridgeError> {
    let [arg] = take_args::<1>(channel, args)?;
    Ok(arg)
}

fn take_args<const N: usize>(
    channel: &'static str,
    args: Vec<Value>,
) -> Result<[Value; N], BridgeError> {
    let actual = args.len();
    args.try_into().map_err(|_| BridgeError::Arity {
        channel,
        expected: N,
        actual,
    })
}

fn decode_arg<T: DeserializeOwned>(channel: &'static str, value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|error| BridgeError::Payload {
        channel,
        reason: error.to_string(),
    })
}

/// Encodes an invoke request (page side and tests).
pub fn encode_invoke(id: u64, request: &InvokeRequest) -> Result<String, BridgeError> {
    let mut envelope = Envelope::new(EnvelopeKind::Invoke);
    envelope.id = Some(id);
    envelope.channel = Some(request.channel().name().to_string());
    envelope.args = Some(request.args()?);
    envelope.to_line()
}

/// Encodes a send message (page side and tests).
pub fn encode_send(seq: Option<u64>, message: &SendMessage) -> Result<String, BridgeError> {
    let mut envelope = Envelope::new(EnvelopeKind::Send);
    envelope.seq = seq;
    envelope.channel = Some(message.channel().name().to_string());
    envelope.args = Some(message.args()?);
    envelope.to_line()
}

/// Encodes the reply for invoke `id`.
pub fn encode_reply(
    id: u64,
    outcome: Result<&InvokeResponse, &str>,
) -> Result<String, BridgeError> {
    let mut envelope = Envelope::new(EnvelopeKind::Reply);
    envelope.id = Some(id);
    match outcome {
        Ok(response) => {
            envelope.ok = Some(true);
            envelope.result = Some(response.to_value()?);
        }
        Err(message) => {
            envelope.ok = Some(false);
            envelope.error = Some(message.to_string());
        }
    }
    envelope.to_line()
}

/// Encodes a controller broadcast.
pub fn encode_receive(message: &ReceiveMessage) -> Result<String, BridgeError> {
    let mut envelope = Envelope::new(EnvelopeKind::Receive);
    envelope.channel = Some(message.channel().name().to_string());
    envelope.args = Some(message.args()?);
    envelope.to_line()
}

/// Per-origin admission of send messages.
///
/// Sends carrying a sequence number at or below the last admitted one are
/// re-deliveries or reorderings and are dropped, which gives at-most-once,
/// in-order delivery per origin. Sends without a sequence number are always
/// admitted. A new page load is a new origin; call [`SendGate::reset`].
#[derive(Debug, Clone, Default)]
pub struct SendGate {
    last_seq: Option<u64>,
}

impl SendGate {
    /// Creates a gate for a fresh origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a send with `seq` should be processed.
    pub fn admit(&mut self, seq: Option<u64>) -> bool {
        let Some(seq) = seq else {
            return true;
        };
        if self.last_seq.is_some_and(|last| seq <= last) {
            tracing::debug!(
                stage = "bridge",
                action = "send_dropped",
                seq,
                last = ?self.last_seq,
                "duplicate or out-of-order send"
            );
            return false;
        }
        self.last_seq = Some(seq);
        true
    }

    /// Forgets the previous origin's sequence.
    pub fn reset(&mut self) {
        self.last_seq = None;
    }
}

/// Message contract violations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// JSON encode/decode failure.
    #[error("bridge codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    /// Envelope targets another contract version.
    #[error("unsupported contract version {0}")]
    UnsupportedVersion(u32),
    /// Envelope has no channel.
    #[error("envelope is missing a channel")]
    MissingChannel,
    /// Channel name is not part of the contract.
    #[error("unknown {kind} channel '{name}'")]
    UnknownChannel {
        /// Channel class the page claimed.
        kind: &'static str,
        /// Offending name.
        name: String,
    },
    /// Invoke with a readable id that failed to decode; it still gets a
    /// failed reply.
    #[error("invoke {id} rejected: {source}")]
    InvalidInvoke {
        /// Correlation id chosen by the page.
        id: u64,
        /// Underlying decode failure.
        #[source]
        source: Box<BridgeError>,
    },
    /// Invoke envelope without a correlation id.
    #[error("invoke on '{0}' is missing an id")]
    MissingId(&'static str),
    /// Page sent a controller-only envelope kind.
    #[error("page may not send reply/receive envelopes (channel '{0}')")]
    WrongDirection(String),
    /// Wrong positional argument count.
    #[error("channel '{channel}' expects {expected} argument(s), got {actual}")]
    Arity {
        /// Channel name.
        channel: &'static str,
        /// Required count.
        expected: usize,
        /// Received count.
        actual: usize,
    },
    /// Argument failed to decode or validate.
    #[error("invalid payload on '{channel}': {reason}")]
    Payload {
        /// Channel name.
        channel: &'static str,
        /// Decoder or validator message.
        reason: String,
    },
}
