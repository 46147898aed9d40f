//! BTHome Boot-Counter Beacon for ESP32
//!
//! Counts boots and power-offs in RTC memory, broadcasts the boot count as
//! BTHome v2 service data for a few seconds, then drops into deep sleep until
//! the wake button is pressed.

mod ble;
mod power;

use std::time::Duration;

use beacon_mcu::{Layout, Level, LifecycleConfig, LifecycleController, RetainedBlock, WakeSource};
use log::*;

// Configuration
const DEVICE_NAME: &str = "BTHome Beacon";
const ACTIVE_WINDOW: Duration = Duration::from_secs(10);
const UPDATE_INTERVAL: Duration = Duration::from_secs(1);
// BOOT button, active low
const WAKE_GPIO: u8 = 0;

// Survives deep sleep and resets; garbage after power-on. The CRC tag tells
// the two apart.
#[link_section = ".rtc_noinit"]
static mut RETAINED: RetainedBlock = RetainedBlock::ZEROED;

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("BTHome Beacon v0.1");

    let config = LifecycleConfig {
        active_window: ACTIVE_WINDOW,
        update_interval: UPDATE_INTERVAL,
        wake_source: WakeSource::Pin {
            gpio: WAKE_GPIO,
            level: Level::Low,
        },
        device_name: DEVICE_NAME.to_string(),
        layout: Layout::Minimal,
        ..Default::default()
    };

    // Only main() touches RETAINED, and it never returns
    let block = unsafe { &mut *std::ptr::addr_of_mut!(RETAINED) };

    LifecycleController::new(
        block,
        ble::NimbleTransport::new(),
        power::EspPower,
        power::EspClock,
        config,
    )
    .run()
}
