use serde_json::{Value, json};

use super::{GET_SYSTEM_SETTINGS, LAUNCH, call_json};
use crate::bridge::{Bridge, ReplyCapture, ServiceCallRequest};
use crate::error::Result;

const BROWSER_APP_ID: &str = "com.webos.app.browser";

/// UI locale, e.g. `"en-US"`. `Ok(None)` when the settings service has none.
pub fn preferred_locale(bridge: &Bridge) -> Result<Option<String>> {
    let reply = call_json(bridge, GET_SYSTEM_SETTINGS, &json!({ "key": "localeInfo" }))?;
    Ok(ui_locale(&reply))
}

fn ui_locale(reply: &Value) -> Option<String> {
    reply
        .pointer("/settings/localeInfo/locales/UI")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Opens `url` in the system browser and waits for the launch to be acknowledged.
pub fn open_url(bridge: &Bridge, url: &str) -> Result<()> {
    let payload = json!({
        "id": BROWSER_APP_ID,
        "params": { "target": url },
    });
    let request = ServiceCallRequest::new(LAUNCH, payload.to_string());
    bridge.call_sync(&request, ReplyCapture::Discard)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_locale() {
        let reply = json!({
            "returnValue": true,
            "settings": {"localeInfo": {"locales": {"UI": "ko-KR", "TV": "ko-KR"}}}
        });
        assert_eq!(ui_locale(&reply).as_deref(), Some("ko-KR"));
        assert_eq!(ui_locale(&json!({"settings": {}})), None);
    }
}
