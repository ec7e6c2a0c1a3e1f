//! Headless stdio harness.
//!
//! Stands in for the native window and browser surface: newline-delimited
//! JSON on stdin carries page envelopes and host commands, and broadcasts and
//! invoke replies go to stdout one JSON document per line. Logs go to stderr.
//!
//! A reader thread feeds lines into an `mpsc` queue. The controller thread
//! waits on the queue until the next timer deadline, so timers fire on time
//! even when stdin is quiet.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nvr_kiosk_auth::Credentials;
use nvr_kiosk_bridge::{InvokeResponse, ReceiveMessage, encode_receive, encode_reply};
use nvr_kiosk_core::{DownloadProgress, UiState, UpdateInfo, WindowBounds};
use nvr_kiosk_ui::{BroadcastError, ToggleKind};
use serde::Deserialize;
use serde_json::Value;

use crate::controller::{Controller, HostEvent, Shortcut, UpdateEvent};
use crate::host::{HostShell, PageSink, ShellStatus};
use crate::redact_sensitive;

/// Item on the controller thread's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// One raw stdin line.
    Input(String),
    /// Event raised by the host itself.
    Host(HostEvent),
    /// Stdin reached end of file.
    InputClosed,
}

/// Why [`run_event_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The page asked for a restart or reset.
    Relaunch,
    /// No more input will arrive.
    InputClosed,
}

/// Host command accepted on stdin, tagged by its `host` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "host", rename_all = "kebab-case")]
pub enum HostCommand {
    /// Navigation started.
    PageLoadStarted,
    /// Page finished loading.
    PageLoadFinished,
    /// Page failed to load.
    PageLoadFailed {
        /// Failure text.
        reason: String,
    },
    /// The window manager changed fullscreen.
    Fullscreen {
        /// New fullscreen state.
        value: bool,
    },
    /// Visibility toggle shortcut.
    Toggle {
        /// Which toggle.
        kind: ToggleKind,
    },
    /// Return-to-dashboard shortcut.
    ReturnToDashboard,
    /// Fullscreen shortcut.
    ToggleFullscreen,
    /// Camera zoom shortcut.
    ZoomCamera {
        /// Camera index.
        index: u32,
    },
    /// The page shows a login form.
    LoginForm,
    /// The window moved or resized.
    WindowBounds {
        /// New placement.
        bounds: WindowBounds,
    },
    /// The update backend found an update.
    UpdateAvailable {
        /// Update details.
        info: UpdateInfo,
    },
    /// The update backend finished downloading.
    UpdateDownloaded {
        /// Update details.
        info: UpdateInfo,
    },
    /// The update backend reported download progress.
    DownloadProgress {
        /// Progress snapshot.
        progress: DownloadProgress,
    },
    /// The update backend failed.
    UpdateError {
        /// Failure text.
        message: String,
    },
    /// Log a controller snapshot.
    Status,
}

/// Classified stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    /// Empty line.
    Blank,
    /// Page envelope, passed to the bridge decoder verbatim.
    Page(String),
    /// Host command.
    Host(HostCommand),
}

/// Classifies one stdin line. Objects with a `host` field are host
/// commands; every other JSON document is treated as a page envelope.
///
/// # Errors
/// Returns the JSON error for lines that are not JSON or name an unknown
/// host command.
pub fn parse_input_line(line: &str) -> Result<InputLine, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(InputLine::Blank);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    if value.get("host").is_some() {
        return Ok(InputLine::Host(HostCommand::deserialize(value)?));
    }
    Ok(InputLine::Page(trimmed.to_string()))
}

/// Page sink writing one JSON envelope per line.
#[derive(Debug)]
pub struct LinePage<W> {
    out: W,
}

impl<W: Write> LinePage<W> {
    /// Wraps a writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Borrows the writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn write_line(&mut self, line: &str) -> Result<(), BroadcastError> {
        writeln!(self.out, "{line}")
            .and_then(|()| self.out.flush())
            .map_err(|error| BroadcastError(error.to_string()))
    }
}

impl<W: Write> PageSink for LinePage<W> {
    fn deliver(&mut self, message: &ReceiveMessage) -> Result<(), BroadcastError> {
        let line = encode_receive(message).map_err(|error| BroadcastError(error.to_string()))?;
        self.write_line(&line)
    }

    fn reply(
        &mut self,
        id: u64,
        outcome: Result<&InvokeResponse, &str>,
    ) -> Result<(), BroadcastError> {
        let line = encode_reply(id, outcome).map_err(|error| BroadcastError(error.to_string()))?;
        self.write_line(&line)
    }
}

/// Host shell without a window. Fullscreen requests are echoed back as
/// host events through the loop queue, as a real window manager would.
#[derive(Debug)]
pub struct HeadlessHost {
    fullscreen: bool,
    confirm_resets: bool,
    events: Sender<LoopEvent>,
    loaded_url: Option<String>,
    last_status: Option<ShellStatus>,
}

impl HeadlessHost {
    /// Creates a host that posts its events to `events`.
    pub fn new(events: Sender<LoopEvent>, fullscreen: bool) -> Self {
        Self {
            fullscreen,
            confirm_resets: false,
            events,
            loaded_url: None,
            last_status: None,
        }
    }

    /// Answers reset confirmations with `true`.
    pub fn confirming_resets(mut self) -> Self {
        self.confirm_resets = true;
        self
    }

    /// Last URL handed to the browser surface.
    pub fn loaded_url(&self) -> Option<&str> {
        self.loaded_url.as_deref()
    }

    /// Last blocking status shown.
    pub fn last_status(&self) -> Option<&ShellStatus> {
        self.last_status.as_ref()
    }

    fn post(&self, event: HostEvent) {
        if self.events.send(LoopEvent::Host(event)).is_err() {
            tracing::debug!(stage = "host", action = "event_dropped", "loop queue closed");
        }
    }
}

impl HostShell for HeadlessHost {
    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen != fullscreen {
            self.fullscreen = fullscreen;
            self.post(HostEvent::FullscreenChanged(fullscreen));
        }
    }

    fn load_url(&mut self, url: &str) {
        self.loaded_url = Some(url.to_string());
    }

    fn relaunch(&mut self) {
        tracing::info!(stage = "host", action = "relaunch", "controller will be rebuilt");
    }

    fn confirm_reset(&mut self) -> bool {
        self.confirm_resets
    }

    fn submit_credentials(&mut self, credentials: &Credentials) {
        tracing::info!(
            stage = "host",
            action = "submit_credentials",
            username = %credentials.username
        );
    }

    fn show_status(&mut self, status: ShellStatus) {
        tracing::warn!(stage = "host", action = "status", ?status);
        self.last_status = Some(status);
    }

    fn render_ui_state(&mut self, state: UiState) {
        tracing::debug!(stage = "host", action = "render", ?state);
    }

    fn hardware_acceleration(&self) -> bool {
        false
    }

    fn engine_version(&self) -> String {
        "headless".to_string()
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Spawns the thread that forwards `reader` lines to the loop queue and
/// posts [`LoopEvent::InputClosed`] at end of input.
///
/// # Errors
/// Returns the spawn error when the thread cannot be created.
pub fn spawn_line_reader<R>(reader: R, events: Sender<LoopEvent>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("nvr-kiosk-stdin".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if events.send(LoopEvent::Input(line)).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::error!(stage = "harness", action = "read_failed", %error);
                        break;
                    }
                }
            }
            let _ = events.send(LoopEvent::InputClosed);
        })
}

/// Drives `controller` from the queue until input closes or a relaunch is
/// requested.
pub fn run_event_loop<W: Write>(
    controller: &mut Controller<HeadlessHost, LinePage<W>>,
    events: &Receiver<LoopEvent>,
) -> LoopExit {
    loop {
        controller.fire_due_timeouts(now_ms());
        if controller.relaunch_requested() {
            return LoopExit::Relaunch;
        }

        let received = match controller.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_sub(now_ms());
                events.recv_timeout(Duration::from_millis(wait))
            }
            None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(LoopEvent::Input(line)) => handle_input(controller, &line),
            Ok(LoopEvent::Host(event)) => controller.handle_host_event(event, now_ms()),
            Ok(LoopEvent::InputClosed) | Err(RecvTimeoutError::Disconnected) => {
                return LoopExit::InputClosed;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if controller.relaunch_requested() {
            return LoopExit::Relaunch;
        }
    }
}

fn handle_input<W: Write>(controller: &mut Controller<HeadlessHost, LinePage<W>>, line: &str) {
    let now = now_ms();
    match parse_input_line(line) {
        Ok(InputLine::Blank) => {}
        Ok(InputLine::Page(raw)) => {
            if let Err(error) = controller.handle_page_line(&raw, now) {
                tracing::warn!(
                    stage = "bridge",
                    action = "rejected",
                    %error,
                    line = %redact_sensitive(&raw)
                );
            }
        }
        Ok(InputLine::Host(HostCommand::Status)) => {
            tracing::info!(stage = "harness", action = "status", snapshot = ?controller.snapshot());
        }
        Ok(InputLine::Host(HostCommand::Fullscreen { value })) => {
            controller.host_mut().fullscreen = value;
            controller.handle_host_event(HostEvent::FullscreenChanged(value), now);
        }
        Ok(InputLine::Host(command)) => {
            if let Some(event) = command.into_event() {
                controller.handle_host_event(event, now);
            }
        }
        Err(error) => {
            tracing::warn!(
                stage = "harness",
                action = "malformed_input",
                %error,
                line = %redact_sensitive(line)
            );
        }
    }
}

impl HostCommand {
    /// Host event for this command. `None` for commands the harness handles
    /// itself.
    pub fn into_event(self) -> Option<HostEvent> {
        let event = match self {
            Self::PageLoadStarted => HostEvent::PageLoadStarted,
            Self::PageLoadFinished => HostEvent::PageLoadFinished,
            Self::PageLoadFailed { reason } => HostEvent::PageLoadFailed { reason },
            Self::Fullscreen { value } => HostEvent::FullscreenChanged(value),
            Self::Toggle { kind } => HostEvent::Shortcut(Shortcut::Toggle(kind)),
            Self::ReturnToDashboard => HostEvent::Shortcut(Shortcut::ReturnToDashboard),
            Self::ToggleFullscreen => HostEvent::Shortcut(Shortcut::ToggleFullscreen),
            Self::ZoomCamera { index } => HostEvent::Shortcut(Shortcut::ZoomCamera(index)),
            Self::LoginForm => HostEvent::LoginFormDetected,
            Self::WindowBounds { bounds } => HostEvent::WindowBoundsChanged(bounds),
            Self::UpdateAvailable { info } => HostEvent::Update(UpdateEvent::Available(info)),
            Self::UpdateDownloaded { info } => HostEvent::Update(UpdateEvent::Downloaded(info)),
            Self::DownloadProgress { progress } => {
                HostEvent::Update(UpdateEvent::Progress(progress))
            }
            Self::UpdateError { message } => HostEvent::Update(UpdateEvent::Error(message)),
            Self::Status => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_host_commands_and_envelopes() {
        assert_eq!(parse_input_line("   ").expect("blank"), InputLine::Blank);
        assert_eq!(
            parse_input_line(r#"{"host":"toggle","kind":"nav-only"}"#).expect("host"),
            InputLine::Host(HostCommand::Toggle {
                kind: ToggleKind::NavOnly
            })
        );
        let envelope = r#"{"v":1,"kind":"invoke","id":1,"channel":"configLoad","args":[]}"#;
        assert_eq!(
            parse_input_line(envelope).expect("page"),
            InputLine::Page(envelope.to_string())
        );
        assert!(parse_input_line(r#"{"host":"self-destruct"}"#).is_err());
        assert!(parse_input_line("nope").is_err());
    }

    #[test]
    fn update_commands_map_to_update_events() {
        let downloaded = r#"{"host":"update-downloaded","info":{"version":"1.4.0"}}"#;
        let Ok(InputLine::Host(command)) = parse_input_line(downloaded) else {
            panic!("update-downloaded should parse");
        };
        assert_eq!(
            command.into_event(),
            Some(HostEvent::Update(UpdateEvent::Downloaded(UpdateInfo {
                version: "1.4.0".to_string(),
                release_date: None,
                release_notes: None,
            })))
        );

        let progress = r#"{"host":"download-progress","progress":
            {"percent":42.5,"bytesPerSecond":1024,"transferred":425,"total":1000}}"#;
        let Ok(InputLine::Host(command)) = parse_input_line(progress) else {
            panic!("download-progress should parse");
        };
        assert_eq!(
            command.into_event(),
            Some(HostEvent::Update(UpdateEvent::Progress(DownloadProgress {
                percent: 42.5,
                bytes_per_second: 1024,
                transferred: 425,
                total: 1000,
            })))
        );
    }

    #[test]
    fn line_page_writes_one_document_per_line() {
        let mut page = LinePage::new(Vec::new());
        page.deliver(&ReceiveMessage::ToggleNavOnly).expect("write");
        page.reply(7, Err("config unavailable")).expect("write");

        let output = String::from_utf8(page.into_inner()).expect("utf8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"toggle-nav-only\""));
        assert!(lines[1].contains("\"id\":7"));
    }
}
