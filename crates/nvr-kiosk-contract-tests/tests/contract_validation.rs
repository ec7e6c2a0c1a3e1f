//! Validates wire fixtures and bridge-encoded messages against the frozen
//! JSON schemas.

use jsonschema::JSONSchema;
use nvr_kiosk_bridge::{
    InvokeRequest, InvokeResponse, ReceiveMessage, SendMessage, encode_invoke, encode_receive,
    encode_reply, encode_send,
};
use nvr_kiosk_core::{
    CameraEntry, CameraList, Config, ConfigPatch, DownloadProgress, SystemDiagnostics, UiState,
    UpdateActionResult, UpdateInfo,
};
use serde_json::Value;

const CONTRACTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts");

fn load_json(relative: &str) -> Value {
    let path = format!("{CONTRACTS}/{relative}");
    let raw = std::fs::read_to_string(&path).expect("json file should be readable");
    serde_json::from_str(&raw).expect("json file should be valid")
}

fn compile_validator(schema: &str) -> JSONSchema {
    let schema = load_json(schema);
    JSONSchema::compile(&schema).expect("schema should compile")
}

fn assert_valid(validator: &JSONSchema, line: &str) {
    let value: Value = serde_json::from_str(line).expect("encoded line should be json");
    assert!(validator.is_valid(&value), "{line} should validate");
}

#[test]
fn envelope_fixtures_match_schema() {
    let validator = compile_validator("envelope.schema.json");
    for fixture in [
        "fixtures/envelope.invoke.valid.json",
        "fixtures/envelope.send.valid.json",
        "fixtures/envelope.reply.valid.json",
    ] {
        assert!(
            validator.is_valid(&load_json(fixture)),
            "{fixture} should validate against schema"
        );
    }
    assert!(
        !validator.is_valid(&load_json("fixtures/envelope.receive.invalid.json")),
        "page-bound envelopes must not carry send channels"
    );
}

#[test]
fn record_fixtures_match_schema() {
    let ui_state = compile_validator("ui-state.schema.json");
    assert!(ui_state.is_valid(&load_json("fixtures/ui-state.valid.json")));

    let config = compile_validator("config.schema.json");
    assert!(config.is_valid(&load_json("fixtures/config.valid.json")));
}

#[test]
fn serialized_records_match_schema() {
    let ui_state = compile_validator("ui-state.schema.json");
    let state = UiState {
        nav_hidden: true,
        header_hidden: true,
        is_fullscreen: false,
    };
    let value = serde_json::to_value(state).expect("ui state should serialize");
    assert!(ui_state.is_valid(&value));

    let config = compile_validator("config.schema.json");
    let value = serde_json::to_value(Config::default()).expect("config should serialize");
    assert!(config.is_valid(&value), "default config should validate");
}

#[test]
fn every_broadcast_matches_schema() {
    let validator = compile_validator("envelope.schema.json");
    let update = UpdateInfo {
        version: "1.1.0".to_string(),
        release_date: Some("2026-10-01".to_string()),
        release_notes: None,
    };
    let broadcasts = [
        ReceiveMessage::FullscreenChange(true),
        ReceiveMessage::ToggleNavigation,
        ReceiveMessage::ToggleNavOnly,
        ReceiveMessage::ToggleHeaderOnly,
        ReceiveMessage::ReturnToDashboard,
        ReceiveMessage::ToggleWidgetPanel,
        ReceiveMessage::ZoomCamera(3),
        ReceiveMessage::UpdateAvailable(update.clone()),
        ReceiveMessage::UpdateDownloaded(update),
        ReceiveMessage::UpdateError("feed unreachable".to_string()),
        ReceiveMessage::DownloadProgress(DownloadProgress {
            percent: 42.5,
            bytes_per_second: 1_024,
            transferred: 425,
            total: 1_000,
        }),
    ];

    for message in &broadcasts {
        let line = encode_receive(message).expect("broadcast should encode");
        assert_valid(&validator, &line);
    }
}

#[test]
fn page_messages_and_replies_match_schema() {
    let validator = compile_validator("envelope.schema.json");

    let patch = ConfigPatch {
        username: Some("viewer".to_string()),
        ..ConfigPatch::default()
    };
    assert_valid(
        &validator,
        &encode_invoke(1, &InvokeRequest::ConfigSavePartial(patch)).expect("invoke"),
    );
    assert_valid(
        &validator,
        &encode_send(
            Some(2),
            &SendMessage::UpdateCameraList(CameraList {
                cameras: vec![CameraEntry {
                    index: 0,
                    name: "Porch".to_string(),
                }],
                zoom_supported: false,
            }),
        )
        .expect("send"),
    );

    let replies = [
        InvokeResponse::Config(Config::default()),
        InvokeResponse::Saved(true),
        InvokeResponse::Diagnostics(SystemDiagnostics {
            hardware_acceleration: true,
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            runtime_version: "1.0.0".to_string(),
            browser_engine_version: "headless".to_string(),
        }),
        InvokeResponse::UpdateAction(UpdateActionResult::failed("disabled")),
        InvokeResponse::Installed,
        InvokeResponse::AppVersion("1.0.0".to_string()),
    ];
    for (id, response) in (10_u64..).zip(replies.iter()) {
        assert_valid(&validator, &encode_reply(id, Ok(response)).expect("reply"));
    }
    assert_valid(
        &validator,
        &encode_reply(99, Err("config unavailable")).expect("reply"),
    );
}
