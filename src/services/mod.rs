//! Typed wrappers over the luna services the runtime talks to.
//!
//! Everything here goes through [`Bridge`], so it works with any attached bus.

mod app;
mod display;
mod screensaver;
mod system;

pub use app::{
    AppInfo, AppLifecycle, LifecycleEvent, app_info, native_lifecycle_version, register_app,
};
pub use display::{PanelResolution, panel_resolution, refresh_rate};
pub use screensaver::{ScreenSaverRequest, ScreenSaverRequests};
pub use system::{open_url, preferred_locale};

use serde_json::Value;

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};

pub const GET_APP_INFO: &str = "luna://com.webos.applicationManager/getAppInfo";
pub const REGISTER_NATIVE_APP: &str = "luna://com.webos.applicationManager/registerNativeApp";
pub const REGISTER_APP: &str = "luna://com.webos.applicationManager/registerApp";
pub const LAUNCH: &str = "luna://com.webos.applicationManager/launch";
pub const GET_PANEL_RESOLUTION: &str =
    "luna://com.webos.service.panelcontroller/getPanelResolution";
pub const GET_SYSTEM_INFO: &str = "luna://com.webos.service.tv.systemproperty/getSystemInfo";
pub const GET_CONFIGS: &str = "luna://com.webos.service.config/getConfigs";
pub const GET_SYSTEM_SETTINGS: &str = "luna://com.webos.settingsservice/getSystemSettings";
pub const REGISTER_SCREEN_SAVER_REQUEST: &str =
    "luna://com.webos.service.tvpower/power/registerScreenSaverRequest";
pub const RESPONSE_SCREEN_SAVER_REQUEST: &str =
    "luna://com.webos.service.tvpower/power/responseScreenSaverRequest";

/// Blocking public call with a JSON payload, returning the parsed reply.
pub(crate) fn call_json(bridge: &Bridge, uri: &str, payload: &Value) -> Result<Value> {
    let reply = bridge
        .call(uri, &payload.to_string(), true)?
        .ok_or_else(|| BridgeError::malformed_reply(uri, "empty reply"))?;
    parse_reply(uri, &reply)
}

/// Parses a reply, turning `"returnValue": false` into [`BridgeError::ServiceFailed`].
pub(crate) fn parse_reply(uri: &str, reply: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(reply)
        .map_err(|e| BridgeError::malformed_reply(uri, e.to_string()))?;
    if value.get("returnValue").and_then(Value::as_bool) == Some(false) {
        let reason = value
            .get("errorText")
            .and_then(Value::as_str)
            .unwrap_or("returnValue is false");
        return Err(BridgeError::service_failed(uri, reason));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let value = parse_reply(GET_CONFIGS, r#"{"returnValue":true,"x":1}"#).unwrap();
        assert_eq!(value["x"], 1);

        match parse_reply(GET_CONFIGS, r#"{"returnValue":false,"errorText":"denied"}"#) {
            Err(BridgeError::ServiceFailed { reason, .. }) => assert_eq!(reason, "denied"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            parse_reply(GET_CONFIGS, "not json"),
            Err(BridgeError::MalformedReply { .. })
        ));
    }
}
