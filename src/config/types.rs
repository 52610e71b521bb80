use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::device::connection::ConnectionSettings;
use crate::device::constants::{DEFAULT_PERIPHERAL_ADDRESS, DEFAULT_PERIPHERAL_NAME, LINK_CHECK_DEADLINE, LINK_CHECK_INTERVAL, MIN_SETUP_TIMEOUT, RELEASE_DEADLINE, SCAN_TIMEOUT, SETUP_TIMEOUT};
use crate::device::types::GattIds;
use crate::render::render_loop::{RenderSettings, FRAME_INTERVAL};

/// Selects the peripheral to connect to from the scan results.
/// A peripheral matches if either the address or the name pattern matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralFilter {
    pub address: Option<String>,
    pub name_contains: Option<String>,
}

impl PeripheralFilter {
    pub fn matches(&self, address: &str, name: Option<&str>) -> bool {
        if let Some(wanted) = &self.address {
            if wanted.eq_ignore_ascii_case(address) {
                return true;
            }
        }

        match (&self.name_contains, name) {
            (Some(pattern), Some(name)) => !pattern.is_empty() && name.contains(pattern.as_str()),
            _ => false,
        }
    }
}

impl Default for PeripheralFilter {
    fn default() -> Self {
        PeripheralFilter {
            address: Some(DEFAULT_PERIPHERAL_ADDRESS.to_string()),
            name_contains: Some(DEFAULT_PERIPHERAL_NAME.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub peripheral: PeripheralFilter,
    pub gatt: GattIds,
    pub setup_timeout_ms: u64,
    pub scan_timeout_ms: u64,
    pub frame_interval_ms: u64,
}

impl Config {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ids: self.gatt,
            // a zero timeout would fail every connection before it could start
            setup_timeout: Duration::from_millis(self.setup_timeout_ms.max(MIN_SETUP_TIMEOUT)),
            link_check_interval: Duration::from_millis(LINK_CHECK_INTERVAL),
            link_check_deadline: Duration::from_millis(LINK_CHECK_DEADLINE),
            release_deadline: Duration::from_millis(RELEASE_DEADLINE),
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            frame_interval: Duration::from_millis(self.frame_interval_ms.max(1)),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            peripheral: PeripheralFilter::default(),
            gatt: GattIds::default(),
            setup_timeout_ms: SETUP_TIMEOUT,
            scan_timeout_ms: SCAN_TIMEOUT,
            frame_interval_ms: FRAME_INTERVAL,
        }
    }
}
