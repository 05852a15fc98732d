use serde::Deserialize;
use serde_json::{Value, json};

use super::{GET_APP_INFO, REGISTER_APP, REGISTER_NATIVE_APP, call_json};
use crate::bridge::{Bridge, ServiceCallRequest, Subscription};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub native_life_cycle_interface_version: u32,
}

pub fn app_info(bridge: &Bridge, app_id: &str) -> Result<AppInfo> {
    let reply = call_json(bridge, GET_APP_INFO, &json!({ "id": app_id }))?;
    let info = reply
        .get("appInfo")
        .ok_or_else(|| BridgeError::malformed_reply(GET_APP_INFO, "missing appInfo"))?;
    AppInfo::deserialize(info)
        .map_err(|e| BridgeError::malformed_reply(GET_APP_INFO, e.to_string()))
}

/// Apps that don't declare a version speak version 1. Only a failed call is an
/// error; a reply without a usable version counts as "not declared".
pub fn native_lifecycle_version(bridge: &Bridge, app_id: &str) -> Result<u32> {
    let reply = call_json(bridge, GET_APP_INFO, &json!({ "id": app_id }))?;
    Ok(lifecycle_version(&reply))
}

fn lifecycle_version(reply: &Value) -> u32 {
    reply
        .pointer("/appInfo/nativeLifeCycleInterfaceVersion")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Relaunch,
    Close,
    Other(String),
}

/// Registration with the application manager. Dropping it unregisters.
#[derive(Debug)]
pub struct AppLifecycle {
    interface_version: u32,
    subscription: Subscription,
}

/// Registers the app with the lifecycle interface it declares.
pub fn register_app(bridge: &Bridge, app_id: &str) -> Result<AppLifecycle> {
    let interface_version = native_lifecycle_version(bridge, app_id)?;
    let uri = match interface_version {
        1 => REGISTER_NATIVE_APP,
        2 => REGISTER_APP,
        v => {
            return Err(BridgeError::invalid_argument(format!(
                "unsupported nativeLifeCycleInterfaceVersion {v}"
            )));
        }
    };
    let request = ServiceCallRequest::new(uri, json!({ "id": app_id }).to_string()).subscription();
    let subscription = bridge.subscribe(&request)?;
    tracing::info!(app_id, interface_version, "app registered");
    Ok(AppLifecycle {
        interface_version,
        subscription,
    })
}

impl AppLifecycle {
    pub fn interface_version(&self) -> u32 {
        self.interface_version
    }

    /// Next lifecycle event; replies that are not events are skipped.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        loop {
            let message = self.subscription.recv().await?;
            tracing::info!(version = self.interface_version, %message, "lifecycle event");
            if let Some(event) = parse_lifecycle_event(self.interface_version, &message) {
                return Some(event);
            }
        }
    }

    pub fn into_subscription(self) -> Subscription {
        self.subscription
    }
}

/// v1 puts the event under `message`, v2 under `event`.
pub(crate) fn parse_lifecycle_event(
    interface_version: u32,
    message: &str,
) -> Option<LifecycleEvent> {
    let value: Value = serde_json::from_str(message).ok()?;
    let key = if interface_version >= 2 { "event" } else { "message" };
    let event = value.get(key)?.as_str()?;
    Some(match event {
        "relaunch" => LifecycleEvent::Relaunch,
        "close" => LifecycleEvent::Close,
        other => LifecycleEvent::Other(other.to_owned()),
    })
}
