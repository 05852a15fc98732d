use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::abi::ContextAbi;
use crate::bridge::BridgeOptions;
use crate::bus::LibrarySymbols;
use crate::error::{BridgeError, Result};

/// ```toml
/// abi = "v2"              # 省略则按导出符号自动判断
/// call_timeout_ms = 5000  # 省略则一直等
/// app_id = "org.example.app"
/// log_filter = "lunabridge=debug"
///
/// [library]
/// path = "libhelpers.so.2"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub library: LibrarySymbols,
    pub abi: Option<ContextAbi>,
    pub call_timeout_ms: Option<u64>,
    pub app_id: Option<String>,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library: LibrarySymbols::default(),
            abi: None,
            call_timeout_ms: None,
            app_id: None,
            log_filter: "info".to_owned(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| BridgeError::config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Configured application id, falling back to `$APPID` like the webOS launcher sets it.
    pub fn app_id(&self) -> Option<String> {
        self.app_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| std::env::var("APPID").ok().filter(|id| !id.is_empty()))
    }

    /// Like [`BridgeConfig::app_id`], but a missing id is an error.
    pub fn require_app_id(&self) -> Result<String> {
        self.app_id()
            .ok_or_else(|| BridgeError::config("no app_id configured and $APPID is not set"))
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            call_timeout: self.call_timeout(),
            ..BridgeOptions::default()
        }
    }
}
