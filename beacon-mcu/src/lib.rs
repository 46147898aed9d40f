//! Beacon MCU Library
//!
//! Retained-state lifecycle for a BTHome beacon that powers off between
//! broadcasts.
//!
//! This crate provides:
//! - The retained block and its integrity tag
//! - Saturating boot/off/uptime counters
//! - Traits for the advertising transport, power-off primitive and clock
//! - The lifecycle controller driving one power cycle
//! - A simulated platform for host runs and tests
//!
//! # Example MCU implementations
//! - ESP32: See `beacon-esp32`
//!
//! # Note
//! Nothing here is a global. The firmware owns the one retained block and
//! lends it to the controller, so tests can run many devices side by side.

pub mod config;
pub mod counters;
pub mod lifecycle;
pub mod power;
pub mod ready;
pub mod retained;
pub mod sim;
pub mod transport;

pub use config::*;
pub use counters::*;
pub use lifecycle::*;
pub use power::*;
pub use ready::*;
pub use retained::*;
pub use transport::*;

pub use beacon_proto::{AdvertisementData, CounterSnapshot, Layout, ServiceData};
