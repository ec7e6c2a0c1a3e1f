//! Integration tests for controller toggle dispatch, acknowledgement, and
//! fullscreen reconciliation.

mod common;

use common::{TestController, configured, started};
use nvr_kiosk_app::{HostEvent, Shortcut, TOGGLE_SETTLE_MS};
use nvr_kiosk_bridge::ReceiveMessage;
use nvr_kiosk_core::UiState;
use nvr_kiosk_ui::ToggleKind;

const T0: u64 = 1_700_000_000_000;

fn ui_report(seq: u64, nav_hidden: bool, header_hidden: bool, is_fullscreen: bool) -> String {
    format!(
        r#"{{"v":1,"kind":"send","seq":{seq},"channel":"update-ui-state","args":[{{"navHidden":{nav_hidden},"headerHidden":{header_hidden},"isFullscreen":{is_fullscreen}}}]}}"#
    )
}

fn toggle(controller: &mut TestController, kind: ToggleKind, now_ms: u64) {
    controller.handle_host_event(HostEvent::Shortcut(Shortcut::Toggle(kind)), now_ms);
}

fn delivered_count(controller: &TestController, message: &ReceiveMessage) -> usize {
    controller
        .page()
        .delivered
        .iter()
        .filter(|delivered| *delivered == message)
        .count()
}

#[test]
fn controller_toggle_tests_page_ack_releases_guard() {
    let (mut controller, _) = started(configured(), T0);
    controller.handle_host_event(HostEvent::PageLoadFinished, T0 + 10);

    toggle(&mut controller, ToggleKind::All, T0 + 20);
    toggle(&mut controller, ToggleKind::All, T0 + 21);
    assert!(controller.ui().is_toggling());
    assert!(controller.timeouts().is_pending("toggle-settle"));
    assert_eq!(delivered_count(&controller, &ReceiveMessage::ToggleNavigation), 1);

    controller
        .handle_page_line(&ui_report(1, true, true, false), T0 + 30)
        .expect("ack should decode");

    assert!(!controller.ui().is_toggling());
    assert!(!controller.timeouts().is_pending("toggle-settle"));
    assert_eq!(
        controller.ui().projection(),
        UiState {
            nav_hidden: true,
            header_hidden: true,
            is_fullscreen: false,
        }
    );
}

#[test]
fn controller_toggle_tests_settle_timer_releases_unacknowledged_toggle() {
    let (mut controller, _) = started(configured(), T0);

    toggle(&mut controller, ToggleKind::NavOnly, T0);
    assert_eq!(controller.fire_due_timeouts(T0 + TOGGLE_SETTLE_MS - 1), 0);
    assert!(controller.ui().is_toggling());

    assert_eq!(controller.fire_due_timeouts(T0 + TOGGLE_SETTLE_MS), 1);
    assert!(!controller.ui().is_toggling());

    toggle(&mut controller, ToggleKind::NavOnly, T0 + TOGGLE_SETTLE_MS + 1);
    assert_eq!(delivered_count(&controller, &ReceiveMessage::ToggleNavOnly), 2);
    assert!(!controller.ui().projection().nav_hidden);
}

#[test]
fn controller_toggle_tests_navigation_aborts_toggle_and_timers() {
    let (mut controller, _) = started(configured(), T0);
    toggle(&mut controller, ToggleKind::HeaderOnly, T0 + 5);
    controller.handle_host_event(HostEvent::WindowBoundsChanged(Default::default()), T0 + 6);

    controller.handle_host_event(HostEvent::PageLoadStarted, T0 + 10);

    assert!(!controller.ui().is_toggling());
    assert!(!controller.timeouts().is_pending("toggle-settle"));
    assert!(!controller.timeouts().is_pending("window-bounds-save"));
    assert!(controller.timeouts().is_pending("connection-timeout"));
    assert_eq!(controller.fire_due_timeouts(T0 + 5 + TOGGLE_SETTLE_MS), 0);
}

#[test]
fn controller_toggle_tests_report_with_wrong_fullscreen_is_corrected() {
    let (mut controller, _) = started(configured(), T0);
    controller.host_mut().fullscreen = true;
    controller.handle_host_event(HostEvent::FullscreenChanged(true), T0 + 1);

    controller
        .handle_page_line(&ui_report(1, true, false, false), T0 + 2)
        .expect("report should decode");

    let internal = controller.ui().internal();
    assert!(internal.is_fullscreen);
    assert!(internal.nav_hidden);
    assert_eq!(
        controller.page().delivered.last(),
        Some(&ReceiveMessage::FullscreenChange(true))
    );
}

#[test]
fn controller_toggle_tests_out_of_order_sends_are_dropped() {
    let (mut controller, _) = started(configured(), T0);

    controller
        .handle_page_line(&ui_report(5, true, false, false), T0 + 1)
        .expect("report should decode");
    controller
        .handle_page_line(&ui_report(4, false, true, false), T0 + 2)
        .expect("report should decode");

    let projection = controller.ui().projection();
    assert!(projection.nav_hidden);
    assert!(!projection.header_hidden);
}

#[test]
fn controller_toggle_tests_unreachable_page_rolls_toggle_back() {
    let (mut controller, _) = started(configured(), T0);
    controller.page_mut().unreachable = true;

    toggle(&mut controller, ToggleKind::All, T0 + 1);

    assert_eq!(controller.ui().projection(), UiState::default());
    assert!(!controller.ui().is_toggling());
    assert!(!controller.timeouts().is_pending("toggle-settle"));
}

#[test]
fn controller_toggle_tests_zoom_shortcut_respects_camera_list() {
    let (mut controller, _) = started(configured(), T0);
    let cameras = r#"{"v":1,"kind":"send","channel":"update-camera-list",
        "args":[{"cameras":[{"index":0,"name":"Gate"},{"index":1,"name":"Yard"}],"zoomSupported":true}]}"#;
    controller
        .handle_page_line(cameras, T0 + 1)
        .expect("camera list should decode");

    controller.handle_host_event(HostEvent::Shortcut(Shortcut::ZoomCamera(1)), T0 + 2);
    controller.handle_host_event(HostEvent::Shortcut(Shortcut::ZoomCamera(5)), T0 + 3);

    assert_eq!(delivered_count(&controller, &ReceiveMessage::ZoomCamera(1)), 1);
    assert_eq!(delivered_count(&controller, &ReceiveMessage::ZoomCamera(5)), 0);
}

#[test]
fn controller_toggle_tests_return_to_dashboard_keeps_fullscreen() {
    let (mut controller, _) = started(configured(), T0);
    controller.host_mut().fullscreen = true;
    controller.handle_host_event(HostEvent::FullscreenChanged(true), T0 + 1);
    toggle(&mut controller, ToggleKind::All, T0 + 2);
    controller.fire_due_timeouts(T0 + 2 + TOGGLE_SETTLE_MS);

    controller.handle_host_event(HostEvent::Shortcut(Shortcut::ReturnToDashboard), T0 + 5_000);

    assert_eq!(
        controller.ui().projection(),
        UiState {
            nav_hidden: false,
            header_hidden: false,
            is_fullscreen: true,
        }
    );
    assert_eq!(
        controller.page().delivered.last(),
        Some(&ReceiveMessage::ReturnToDashboard)
    );
}
