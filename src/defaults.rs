//! Compiled-in defaults for every configurable value.
//!
//! The daemon overrides these from the environment at startup; the
//! library itself never reads configuration.

use core::time::Duration;

/// Serial device the particulate sensor is wired to.
pub const PMS_PORT: &str = "/dev/serial0";

/// Plantower sensors talk at a fixed 9600 8N1.
pub const PMS_BAUD: u32 = 9600;

/// Upper bound on one blocking serial read.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Bytes requested per serial read.
pub const SERIAL_CHUNK: usize = 128;

/// Whether the barometric sensor worker runs at all.
pub const BMP_ENABLED: bool = true;

/// I2C bus number, i.e. `/dev/i2c-1`.
pub const BMP_I2C_BUS: u8 = 1;

/// Candidate BMP280 addresses, in probe order.
pub const BMP_ADDRS: [u8; 2] = crate::bmp280::ADDRESSES;

/// Pause before reopening a transport after a failure.
pub const BACKOFF: Duration = Duration::from_secs(2);

/// Pause between serial reads so an idle link does not spin.
pub const IDLE_PAUSE: Duration = Duration::from_millis(100);

/// Time between barometric reads.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// PM2.5 level (µg/m³) above which the dashboard tile turns red.
pub const PM25_LIMIT: f32 = 25.0;

/// PM10 level (µg/m³) above which the dashboard tile turns red.
pub const PM10_LIMIT: f32 = 50.0;

/// Dashboard auto-refresh period in seconds.
pub const REFRESH_SECONDS: u32 = 5;

/// Address the HTTP server listens on.
pub const HTTP_BIND: &str = "0.0.0.0:5000";

/// Number of HTTP handler threads.
pub const HTTP_THREADS: usize = 4;
