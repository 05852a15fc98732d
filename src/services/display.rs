use serde_json::{Value, json};

use super::{GET_CONFIGS, GET_PANEL_RESOLUTION, GET_SYSTEM_INFO, call_json};
use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};

const SOC_OUTPUT_FRAME_RATE: &str = "tv.hw.SoCOutputFrameRate";
const SUPPORT_FRC: &str = "tv.hw.supportFrc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelResolution {
    pub width: u32,
    pub height: u32,
}

impl PanelResolution {
    pub const UHD: PanelResolution = PanelResolution {
        width: 3840,
        height: 2160,
    };
    pub const FHD: PanelResolution = PanelResolution {
        width: 1920,
        height: 1080,
    };
}

/// Asks the panel controller first; older firmware only answers the `UHD` system property.
pub fn panel_resolution(bridge: &Bridge) -> Result<PanelResolution> {
    match call_json(bridge, GET_PANEL_RESOLUTION, &json!({})) {
        Ok(reply) => {
            if let Some(resolution) = resolution_from_panel(&reply) {
                return Ok(resolution);
            }
            tracing::debug!(%reply, "panel controller gave no usable resolution");
        }
        Err(err) => tracing::debug!(%err, "panel controller unavailable"),
    }

    let reply = call_json(bridge, GET_SYSTEM_INFO, &json!({ "keys": ["UHD"] }))?;
    resolution_from_system_info(&reply)
        .ok_or_else(|| BridgeError::malformed_reply(GET_SYSTEM_INFO, "missing UHD"))
}

fn resolution_from_panel(reply: &Value) -> Option<PanelResolution> {
    let width = u32::try_from(reply.get("width")?.as_u64()?).ok()?;
    let height = u32::try_from(reply.get("height")?.as_u64()?).ok()?;
    (width > 0 && height > 0).then_some(PanelResolution { width, height })
}

/// `UHD` comes back as `"true"`/`"false"` on some firmware and as a bool on others.
fn resolution_from_system_info(reply: &Value) -> Option<PanelResolution> {
    let uhd = match reply.get("UHD")? {
        Value::String(s) => s == "true",
        Value::Bool(b) => *b,
        _ => return None,
    };
    Some(if uhd {
        PanelResolution::UHD
    } else {
        PanelResolution::FHD
    })
}

/// Output refresh rate in Hz.
pub fn refresh_rate(bridge: &Bridge) -> Result<u32> {
    let reply = call_json(
        bridge,
        GET_CONFIGS,
        &json!({ "configNames": [SOC_OUTPUT_FRAME_RATE, SUPPORT_FRC] }),
    )?;
    refresh_rate_from_configs(&reply)
        .ok_or_else(|| BridgeError::malformed_reply(GET_CONFIGS, "no frame rate config"))
}

fn refresh_rate_from_configs(reply: &Value) -> Option<u32> {
    let configs = reply.get("configs")?.as_object()?;
    let soc_rate = configs
        .get(SOC_OUTPUT_FRAME_RATE)
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|rate| *rate > 0);
    if soc_rate.is_some() {
        return soc_rate;
    }
    let frc = configs.get(SUPPORT_FRC)?.as_bool()?;
    Some(if frc { 120 } else { 60 })
}
