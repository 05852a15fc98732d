mod support;

use std::sync::Arc;

use lunabridge::abi::ContextAbi;
use lunabridge::services::{self, LifecycleEvent, PanelResolution, ScreenSaverRequests};
use lunabridge::BridgeError;
use serde_json::{Value, json};
use support::{MockBus, Response, bridge_for};

/// Bus answering each URI with a fixed JSON reply; unknown URIs are rejected.
fn routed(routes: &[(&str, Response)]) -> Arc<MockBus> {
    let routes: Vec<(String, Response)> =
        routes.iter().map(|(uri, r)| (uri.to_string(), r.clone())).collect();
    MockBus::new(ContextAbi::LATEST, move |uri, _| {
        routes
            .iter()
            .find(|(route, _)| route == uri)
            .map_or(Response::Reject(-1), |(_, response)| response.clone())
    })
}

fn reply(value: Value) -> Response {
    Response::Inline(Some(value.to_string()))
}

#[test]
fn test_panel_resolution_from_panel_controller() {
    let bus = routed(&[(
        services::GET_PANEL_RESOLUTION,
        reply(json!({"returnValue": true, "width": 1920, "height": 1080})),
    )]);
    let bridge = bridge_for(&bus);

    assert_eq!(services::panel_resolution(&bridge).unwrap(), PanelResolution::FHD);
    assert_eq!(bus.calls().len(), 1);
}

#[test]
fn test_panel_resolution_falls_back_to_system_info() {
    let bus = routed(&[(
        services::GET_SYSTEM_INFO,
        reply(json!({"returnValue": true, "UHD": "true"})),
    )]);
    let bridge = bridge_for(&bus);

    assert_eq!(services::panel_resolution(&bridge).unwrap(), PanelResolution::UHD);
    let calls = bus.calls();
    assert_eq!(calls[0].uri, services::GET_PANEL_RESOLUTION);
    assert_eq!(calls[1].uri, services::GET_SYSTEM_INFO);
    assert_eq!(
        serde_json::from_str::<Value>(&calls[1].payload).unwrap(),
        json!({"keys": ["UHD"]})
    );
}

#[test]
fn test_refresh_rate() {
    let bus = routed(&[(
        services::GET_CONFIGS,
        reply(json!({
            "returnValue": true,
            "configs": {"tv.hw.SoCOutputFrameRate": "0", "tv.hw.supportFrc": true}
        })),
    )]);
    let bridge = bridge_for(&bus);
    assert_eq!(services::refresh_rate(&bridge).unwrap(), 120);
}

#[test]
fn test_service_failure_is_reported() {
    let bus = routed(&[(
        services::GET_SYSTEM_SETTINGS,
        reply(json!({"returnValue": false, "errorText": "Unknown method"})),
    )]);
    let bridge = bridge_for(&bus);

    match services::preferred_locale(&bridge) {
        Err(BridgeError::ServiceFailed { reason, .. }) => assert_eq!(reason, "Unknown method"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_preferred_locale() {
    let bus = routed(&[(
        services::GET_SYSTEM_SETTINGS,
        reply(json!({
            "returnValue": true,
            "settings": {"localeInfo": {"locales": {"UI": "en-GB"}}}
        })),
    )]);
    let bridge = bridge_for(&bus);
    assert_eq!(services::preferred_locale(&bridge).unwrap().as_deref(), Some("en-GB"));
}

#[test]
fn test_open_url() {
    let bus = routed(&[(services::LAUNCH, reply(json!({"returnValue": true})))]);
    let bridge = bridge_for(&bus);

    services::open_url(&bridge, "https://www.libsdl.org").unwrap();
    let payload: Value = serde_json::from_str(&bus.calls()[0].payload).unwrap();
    assert_eq!(payload["id"], "com.webos.app.browser");
    assert_eq!(payload["params"]["target"], "https://www.libsdl.org");
}

#[tokio::test]
async fn test_register_app_v2_lifecycle() {
    let bus = routed(&[
        (
            services::GET_APP_INFO,
            reply(json!({
                "returnValue": true,
                "appInfo": {"id": "com.example.game", "nativeLifeCycleInterfaceVersion": 2}
            })),
        ),
        (
            services::REGISTER_APP,
            Response::Stream(vec![
                json!({"returnValue": true}).to_string(),
                json!({"event": "relaunch"}).to_string(),
                json!({"event": "close"}).to_string(),
            ]),
        ),
    ]);
    let bridge = bridge_for(&bus);

    let mut lifecycle = services::register_app(&bridge, "com.example.game").unwrap();
    assert_eq!(lifecycle.interface_version(), 2);
    assert_eq!(lifecycle.next_event().await, Some(LifecycleEvent::Relaunch));
    assert_eq!(lifecycle.next_event().await, Some(LifecycleEvent::Close));

    drop(lifecycle);
    assert_eq!(bridge.stats().outstanding(), 0);
}

#[test]
fn test_register_app_defaults_to_v1() {
    let bus = routed(&[
        (
            services::GET_APP_INFO,
            reply(json!({"returnValue": true, "appInfo": {"id": "com.example.game"}})),
        ),
        (services::REGISTER_NATIVE_APP, Response::Stream(Vec::new())),
    ]);
    let bridge = bridge_for(&bus);

    let lifecycle = services::register_app(&bridge, "com.example.game").unwrap();
    assert_eq!(lifecycle.interface_version(), 1);
    assert_eq!(bus.calls()[1].uri, services::REGISTER_NATIVE_APP);
}

#[test]
fn test_app_info_without_version_falls_back_to_v1() {
    let bus = routed(&[
        (services::GET_APP_INFO, reply(json!({"returnValue": true}))),
        (services::REGISTER_NATIVE_APP, Response::Stream(Vec::new())),
    ]);
    let bridge = bridge_for(&bus);

    assert_eq!(services::native_lifecycle_version(&bridge, "com.example.game").unwrap(), 1);
    let lifecycle = services::register_app(&bridge, "com.example.game").unwrap();
    assert_eq!(lifecycle.interface_version(), 1);
}

#[test]
fn test_app_info_call_failure_is_an_error() {
    let bus = routed(&[]);
    let bridge = bridge_for(&bus);

    assert!(matches!(
        services::native_lifecycle_version(&bridge, "com.example.game"),
        Err(BridgeError::SubmissionRejected { .. })
    ));
}

#[tokio::test]
async fn test_screen_saver_round_trip() {
    let bus = routed(&[
        (
            services::REGISTER_SCREEN_SAVER_REQUEST,
            Response::Stream(vec![
                json!({"returnValue": true, "subscribed": true}).to_string(),
                json!({"timestamp": 1700000000}).to_string(),
            ]),
        ),
        (services::RESPONSE_SCREEN_SAVER_REQUEST, Response::Inline(None)),
    ]);
    let bridge = bridge_for(&bus);

    let mut requests = ScreenSaverRequests::register(&bridge, "com.example.game").unwrap();
    assert_eq!(requests.client_name(), "com.example.game.wakelock");
    let request = requests.next_request().await.unwrap();
    requests.respond(&bridge, &request, true).unwrap();

    let calls = bus.calls();
    let registration: Value = serde_json::from_str(&calls[0].payload).unwrap();
    assert_eq!(registration["subscribe"], true);
    assert!(calls[0].multiple);

    let response: Value = serde_json::from_str(&calls[1].payload).unwrap();
    assert_eq!(
        response,
        json!({"clientName": "com.example.game.wakelock", "ack": false, "timestamp": 1700000000})
    );
    assert!(!calls[1].multiple);
}
