//! Lifecycle configuration

use std::time::Duration;

use beacon_proto::Layout;

use crate::power::{Level, WakeSource};

pub const DEFAULT_DEVICE_NAME: &str = "BTHome Beacon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// How long the device stays awake and advertising per cycle
    pub active_window: Duration,
    /// Re-encode and re-push the payload this often during the window.
    /// Zero disables the refresh; the start payload is then the only push.
    pub update_interval: Duration,
    /// Longest wait for the radio stack's ready callback
    pub ready_timeout: Duration,
    /// Calls to the power-off primitive before the cycle is restarted
    pub power_off_attempts: u32,
    pub wake_source: WakeSource,
    pub device_name: String,
    pub layout: Layout,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            active_window: Duration::from_secs(10),
            update_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(2),
            power_off_attempts: 3,
            // BOOT button on most ESP32 dev boards
            wake_source: WakeSource::Pin {
                gpio: 0,
                level: Level::Low,
            },
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            layout: Layout::Minimal,
        }
    }
}
