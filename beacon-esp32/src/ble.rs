//! NimBLE advertising transport
//!
//! Broadcast only: no GATT server, no connections. The payload built by
//! beacon_proto is handed to NimBLE as a name plus 16-bit service data.

use beacon_mcu::{AdvertisementData, AdvertisingTransport, ReadyNotifier};
use esp32_nimble::{utilities::BleUuid, BLEAdvertisementData, BLEDevice, BLEError};
use log::*;

#[derive(Default)]
pub struct NimbleTransport {
    initialized: bool,
}

impl NimbleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_payload(&self, payload: &AdvertisementData) -> Result<(), BLEError> {
        let advertising = BLEDevice::take().get_advertising();
        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(payload.name())
                .service_data(
                    BleUuid::from_uuid16(beacon_proto::SERVICE_UUID),
                    payload.object_data(),
                ),
        )
    }
}

impl AdvertisingTransport for NimbleTransport {
    type Error = BLEError;

    fn init(&mut self, ready: ReadyNotifier) -> Result<(), BLEError> {
        // take() returns once the NimBLE host has synced with the controller
        BLEDevice::take();
        self.initialized = true;
        ready.ready();
        info!("NimBLE host ready");
        Ok(())
    }

    fn start(&mut self, payload: &AdvertisementData) -> Result<(), BLEError> {
        debug_assert!(self.initialized, "start before init");
        BLEDevice::set_device_name(payload.name())?;
        self.set_payload(payload)?;
        BLEDevice::take().get_advertising().lock().start()?;
        info!("BLE advertising started as '{}'", payload.name());
        Ok(())
    }

    fn update(&mut self, payload: &AdvertisementData) -> Result<(), BLEError> {
        self.set_payload(payload)
    }

    fn stop(&mut self) -> Result<(), BLEError> {
        BLEDevice::take().get_advertising().lock().stop()
    }
}
