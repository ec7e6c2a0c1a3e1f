//! Integration tests for the headless stdio harness.

use std::io::Cursor;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use nvr_kiosk_app::harness::{
    HeadlessHost, LinePage, LoopEvent, LoopExit, now_ms, run_event_loop, spawn_line_reader,
};
use nvr_kiosk_app::{Controller, ControllerSettings, HostEvent, HostShell, ShellStatus};
use nvr_kiosk_config::MemoryConfigStore;
use nvr_kiosk_core::Config;
use serde_json::Value;

type HeadlessController = Controller<HeadlessHost, LinePage<Vec<u8>>>;

fn headless(
    config: Config,
    settings: ControllerSettings,
) -> (HeadlessController, mpsc::Sender<LoopEvent>, mpsc::Receiver<LoopEvent>) {
    let (tx, rx) = mpsc::channel();
    let store = Arc::new(MemoryConfigStore::with_config(config));
    let host = HeadlessHost::new(tx.clone(), false);
    let mut controller = Controller::new(host, LinePage::new(Vec::new()), store, settings);
    controller.start(now_ms());
    (controller, tx, rx)
}

fn output_lines(controller: &HeadlessController) -> Vec<Value> {
    String::from_utf8(controller.page().get_ref().clone())
        .expect("stdout should be utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn harness_loop_tests_dispatches_page_and_host_lines() {
    let (mut controller, tx, rx) = headless(Config::default(), ControllerSettings::default());
    for line in [
        r#"{"v":1,"kind":"invoke","id":1,"channel":"get-app-version","args":[]}"#,
        r#"{"host":"toggle","kind":"all"}"#,
        "definitely not json",
        r#"{"v":1,"kind":"invoke","id":2,"channel":"noSuchChannel","args":[]}"#,
    ] {
        tx.send(LoopEvent::Input(line.to_string())).expect("queue open");
    }
    tx.send(LoopEvent::InputClosed).expect("queue open");

    assert_eq!(run_event_loop(&mut controller, &rx), LoopExit::InputClosed);

    let lines = output_lines(&controller);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["kind"], "reply");
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["result"], nvr_kiosk_app::app_version());
    assert_eq!(lines[1]["channel"], "toggle-navigation");
    assert_eq!(lines[2]["kind"], "reply");
    assert_eq!(lines[2]["id"], 2);
    assert_eq!(lines[2]["ok"], false);
    assert!(controller.ui().is_toggling());
}

#[test]
fn harness_loop_tests_restart_requests_relaunch() {
    let (mut controller, tx, rx) = headless(Config::default(), ControllerSettings::default());
    tx.send(LoopEvent::Input(
        r#"{"v":1,"kind":"send","channel":"restart","args":[]}"#.to_string(),
    ))
    .expect("queue open");

    assert_eq!(run_event_loop(&mut controller, &rx), LoopExit::Relaunch);
}

#[test]
fn harness_loop_tests_fullscreen_request_is_echoed_as_host_event() {
    let (mut controller, tx, rx) = headless(Config::default(), ControllerSettings::default());
    tx.send(LoopEvent::Input(r#"{"host":"toggle-fullscreen"}"#.to_string()))
        .expect("queue open");
    tx.send(LoopEvent::InputClosed).expect("queue open");

    run_event_loop(&mut controller, &rx);

    assert!(controller.host().is_fullscreen());
    assert_eq!(
        rx.try_recv().expect("echo should be queued"),
        LoopEvent::Host(HostEvent::FullscreenChanged(true))
    );
}

#[test]
fn harness_loop_tests_timers_fire_while_input_is_quiet() {
    let config = Config {
        url: "https://nvr.local/".to_string(),
        ..Config::default()
    };
    let settings = ControllerSettings {
        connection_timeout_ms: 1,
        ..ControllerSettings::default()
    };
    let (mut controller, tx, rx) = headless(config, settings);
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        tx.send(LoopEvent::InputClosed).expect("queue open");
    });

    assert_eq!(run_event_loop(&mut controller, &rx), LoopExit::InputClosed);
    closer.join().expect("closer thread");

    assert_eq!(
        controller.host().last_status(),
        Some(&ShellStatus::ConnectionTimedOut {
            url: Some("https://nvr.local/".to_string()),
        })
    );
}

#[test]
fn harness_loop_tests_update_commands_reach_the_page() {
    let (mut controller, tx, rx) = headless(Config::default(), ControllerSettings::default());
    for line in [
        r#"{"host":"download-progress","progress":{"percent":50.0,"bytesPerSecond":10,"transferred":5,"total":10}}"#,
        r#"{"host":"update-downloaded","info":{"version":"2.0.0"}}"#,
    ] {
        tx.send(LoopEvent::Input(line.to_string())).expect("queue open");
    }
    tx.send(LoopEvent::InputClosed).expect("queue open");

    run_event_loop(&mut controller, &rx);

    let lines = output_lines(&controller);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["channel"], "download-progress");
    assert_eq!(lines[0]["args"][0]["transferred"], 5);
    assert_eq!(lines[1]["channel"], "update-downloaded");
    assert_eq!(lines[1]["args"][0]["version"], "2.0.0");
}

#[test]
fn harness_loop_tests_reader_forwards_lines_then_closes() {
    let (tx, rx) = mpsc::channel();
    let reader = spawn_line_reader(Cursor::new("first\nsecond\n"), tx).expect("spawn reader");
    reader.join().expect("reader thread");

    let events: Vec<LoopEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            LoopEvent::Input("first".to_string()),
            LoopEvent::Input("second".to_string()),
            LoopEvent::InputClosed,
        ]
    );
}
