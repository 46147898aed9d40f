//! BLE scanner for BTHome beacons
//!
//! Finds devices advertising BTHome service data and decodes the counters
//! they carry.
//!
//! # Example
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = beacon_scan::get_adapter().await?;
//!     for reading in beacon_scan::scan(&adapter, 5).await? {
//!         println!("{} boots={:?}", reading.name, reading.boots());
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use beacon_proto::{parse_object_data, DecodeError, Decoded};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use uuid::Uuid;

/// BTHome service UUID in its 128-bit Bluetooth base form
pub const BTHOME_UUID: Uuid = Uuid::from_u128(0x0000fcd2_0000_1000_8000_00805f9b34fb);

/// One decoded advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconReading {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Raw object data (service data without the UUID)
    pub raw: Vec<u8>,
    pub decoded: Result<Decoded, DecodeError>,
}

impl BeaconReading {
    /// Build a reading from a peripheral's service data map. `None` when the
    /// device does not advertise BTHome data at all.
    pub fn from_service_data(
        name: String,
        address: String,
        rssi: Option<i16>,
        service_data: &HashMap<Uuid, Vec<u8>>,
    ) -> Option<Self> {
        let raw = service_data.get(&BTHOME_UUID)?.clone();
        let decoded = parse_object_data(&raw);
        Some(Self {
            name,
            address,
            rssi,
            raw,
            decoded,
        })
    }

    pub fn boots(&self) -> Option<u32> {
        self.decoded.as_ref().ok().and_then(|d| d.boots())
    }

    pub fn off_count(&self) -> Option<u32> {
        self.decoded.as_ref().ok().and_then(|d| d.off_count())
    }

    pub fn raw_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.raw)
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Scan for `duration_secs` and return every BTHome advertiser seen
pub async fn scan(
    adapter: &Adapter,
    duration_secs: u64,
) -> Result<Vec<BeaconReading>, Box<dyn std::error::Error>> {
    adapter
        .start_scan(ScanFilter {
            services: vec![BTHOME_UUID],
        })
        .await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;
    let mut readings = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            if let Some(reading) =
                BeaconReading::from_service_data(name, address, props.rssi, &props.service_data)
            {
                readings.push(reading);
            }
        }
    }

    adapter.stop_scan().await?;
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_proto::{encode, CounterSnapshot, Layout};

    fn reading(data: &[u8]) -> Option<BeaconReading> {
        let mut service_data = HashMap::new();
        service_data.insert(BTHOME_UUID, data.to_vec());
        BeaconReading::from_service_data(
            "BTHome Beacon".to_string(),
            "AA:BB:CC:DD:EE:FF".to_string(),
            Some(-60),
            &service_data,
        )
    }

    #[test]
    fn decodes_beacon_counters() {
        let snapshot = CounterSnapshot {
            boots: 42,
            off_count: 41,
            uptime_ms: 0,
        };
        let data = encode(&snapshot, Layout::Extended);
        let reading = reading(data.object_data()).unwrap();

        assert_eq!(reading.boots(), Some(42));
        assert_eq!(reading.off_count(), Some(41));
        assert_eq!(reading.raw_hex(), "443e2a0000003e29000000");
    }

    #[test]
    fn ignores_devices_without_bthome_data() {
        let mut service_data = HashMap::new();
        service_data.insert(Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb), vec![0x64]);
        let reading = BeaconReading::from_service_data(
            "Battery".to_string(),
            "00:11:22:33:44:55".to_string(),
            None,
            &service_data,
        );
        assert!(reading.is_none());
    }

    #[test]
    fn keeps_undecodable_payloads() {
        let reading = reading(&[0x41, 0x3e]).unwrap();
        assert_eq!(reading.decoded, Err(DecodeError::Encrypted));
        assert_eq!(reading.boots(), None);
    }
}
