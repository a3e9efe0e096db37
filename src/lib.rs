//! Klimat library: sensor telemetry ingestion engine.
//!
//! Samples a Plantower particulate sensor streaming frames over a serial
//! link and a BMP280 barometric sensor on I2C, and keeps a fault-tolerant,
//! staleness-aware health record for each so a display layer can always
//! render something honest. Hardware access lives in the platform binary
//! (`daemon/`); everything here is testable on any host with `cargo test`.
//!
//! The library is organized in two code layers:
//! - **Protocol layer** (`no_std`, no allocator): `frame`, `stream`,
//!   `bmp280`, `register`, `defaults`.
//! - **Runtime layer** (feature `std`, on by default): `health`, `worker`.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod bmp280;
pub mod defaults;
pub mod frame;
pub mod register;
pub mod stream;

#[cfg(feature = "std")]
pub mod health;
#[cfg(feature = "std")]
pub mod worker;
