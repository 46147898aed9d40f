//! Advertising transport trait
//!
//! Payload format lives in beacon_proto. This module only describes what
//! the controller needs from a BLE stack.

use beacon_proto::AdvertisementData;

use crate::ready::ReadyNotifier;

/// Trait for BLE advertising implementations
///
/// MCU-specific crates implement this trait using their BLE stack. Every
/// call is fallible and is not retried within a cycle.
pub trait AdvertisingTransport {
    /// Error type for BLE operations
    type Error: std::fmt::Debug;

    /// Bring up the radio. Readiness is reported through `ready`, possibly
    /// from another thread, possibly before this returns.
    fn init(&mut self, ready: ReadyNotifier) -> Result<(), Self::Error>;

    /// Start advertising with the given payload
    fn start(&mut self, payload: &AdvertisementData) -> Result<(), Self::Error>;

    /// Replace the advertised payload while advertising
    fn update(&mut self, payload: &AdvertisementData) -> Result<(), Self::Error>;

    /// Stop advertising
    fn stop(&mut self) -> Result<(), Self::Error>;
}
