use serde_json::{Value, json};

use super::{REGISTER_SCREEN_SAVER_REQUEST, RESPONSE_SCREEN_SAVER_REQUEST};
use crate::bridge::{Bridge, ServiceCallRequest, Subscription};
use crate::error::Result;

/// One "may I start the screen saver?" request from the power service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSaverRequest {
    /// echoed back untouched in the response
    pub timestamp: Value,
}

/// Subscription to screen-saver requests. Dropping it unregisters.
#[derive(Debug)]
pub struct ScreenSaverRequests {
    client_name: String,
    subscription: Subscription,
}

impl ScreenSaverRequests {
    pub fn register(bridge: &Bridge, app_id: &str) -> Result<Self> {
        let client_name = format!("{app_id}.wakelock");
        let payload = json!({ "subscribe": true, "clientName": client_name });
        let request = ServiceCallRequest::new(REGISTER_SCREEN_SAVER_REQUEST, payload.to_string())
            .subscription();
        let subscription = bridge.subscribe(&request)?;
        Ok(Self {
            client_name,
            subscription,
        })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Next request; replies without a timestamp (like the subscription ack) are skipped.
    pub async fn next_request(&mut self) -> Option<ScreenSaverRequest> {
        loop {
            let message = self.subscription.recv().await?;
            tracing::info!(%message, "screen saver request");
            match parse_request(&message) {
                Some(request) => return Some(request),
                None => tracing::info!("skip invalid screen saver request (no timestamp)"),
            }
        }
    }

    /// Answers `request`. With `inhibit` set the screen saver stays off.
    pub fn respond(
        &self,
        bridge: &Bridge,
        request: &ScreenSaverRequest,
        inhibit: bool,
    ) -> Result<()> {
        let payload = response_payload(&self.client_name, request, inhibit);
        bridge.just_call(RESPONSE_SCREEN_SAVER_REQUEST, &payload.to_string(), true)
    }
}

fn parse_request(message: &str) -> Option<ScreenSaverRequest> {
    let value: Value = serde_json::from_str(message).ok()?;
    let timestamp = value.get("timestamp")?.clone();
    Some(ScreenSaverRequest { timestamp })
}

fn response_payload(client_name: &str, request: &ScreenSaverRequest, inhibit: bool) -> Value {
    json!({
        "clientName": client_name,
        "ack": !inhibit,
        "timestamp": request.timestamp,
    })
}
