//! Plantower particulate sensor frame decoder.
//!
//! The sensor streams fixed 32-byte frames over a UART with no framing
//! beyond a two-byte start marker and a trailing 16-bit sum:
//!
//! ```text
//!  0-1   0x42 0x4D      start marker
//!  2-3   frame length   (28, not checked)
//!  4-9   PM1.0 / PM2.5 / PM10   CF=1 (factory calibration)
//! 10-15  PM1.0 / PM2.5 / PM10   ATM (ambient)
//! 16-29  particle counts, version, error code (ignored)
//! 30-31  checksum = sum(bytes 0..30) mod 65536, big-endian
//! ```
//!
//! [`decode`] is pure: it looks at a buffer that may start anywhere in the
//! stream and tells the caller what it found and how far it may trim.
//! Stateful buffering lives in [`crate::stream`].

use serde::Serialize;

/// Two-byte synchronization marker at the start of every frame.
pub const SYNC: [u8; 2] = [0x42, 0x4D];

/// Total frame length including marker and checksum.
pub const FRAME_LEN: usize = 32;

/// Offset of the big-endian checksum.
const CHECKSUM_OFFSET: usize = 30;

/// Offsets of the CF=1 concentration triple.
const CF1_OFFSET: usize = 4;

/// Offsets of the ATM concentration triple.
const ATM_OFFSET: usize = 10;

/// Readings above this (µg/m³) are link noise that happened to pass the
/// checksum, not air.
pub const PM_CEILING: u16 = 5000;

/// PM1.0 / PM2.5 / PM10 mass concentrations in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PmTriple {
    pub pm1: u16,
    pub pm25: u16,
    pub pm10: u16,
}

impl PmTriple {
    fn read(frame: &[u8], offset: usize) -> Self {
        Self {
            pm1: be16(frame, offset),
            pm25: be16(frame, offset + 2),
            pm10: be16(frame, offset + 4),
        }
    }

    /// True if any of the three concentrations is above [`PM_CEILING`].
    pub fn exceeds_ceiling(&self) -> bool {
        self.pm1 > PM_CEILING || self.pm25 > PM_CEILING || self.pm10 > PM_CEILING
    }
}

/// Both concentration triples carried by one frame.
///
/// `atm` is the canonical value surfaced to the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedReading {
    pub cf1: PmTriple,
    pub atm: PmTriple,
}

impl DecodedReading {
    pub fn is_plausible(&self) -> bool {
        !self.cf1.exceeds_ceiling() && !self.atm.exceeds_ceiling()
    }
}

/// Result of one [`decode`] pass.
///
/// Every variant carries the trim guidance for the caller's buffer:
/// `consumed` bytes may be dropped from the front after a frame-sized
/// window was examined, `keep_from` is the first byte worth keeping when
/// nothing was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Valid, plausible frame.
    Frame {
        reading: DecodedReading,
        consumed: usize,
    },
    /// Marker found, checksum mismatch. The whole window is skipped.
    Corrupt { consumed: usize },
    /// Checksum matched but a concentration is above [`PM_CEILING`].
    Implausible {
        reading: DecodedReading,
        consumed: usize,
    },
    /// No complete frame in the buffer.
    NotFound { keep_from: usize },
}

/// Scan `buf` for the first frame and validate it.
///
/// - no marker: `NotFound`, keeping only a trailing `0x42` (a marker split
///   across reads)
/// - marker but fewer than [`FRAME_LEN`] bytes from it: `NotFound`,
///   keeping from the marker
/// - otherwise the 32-byte window is checksummed and the caller may drop
///   everything through the end of it, whatever the verdict
pub fn decode(buf: &[u8]) -> Decode {
    let Some(start) = find_sync(buf) else {
        let keep_from = match buf.last() {
            Some(&b) if b == SYNC[0] => buf.len() - 1,
            _ => buf.len(),
        };
        return Decode::NotFound { keep_from };
    };

    if buf.len() - start < FRAME_LEN {
        return Decode::NotFound { keep_from: start };
    }

    let frame = &buf[start..start + FRAME_LEN];
    let consumed = start + FRAME_LEN;

    if checksum(&frame[..CHECKSUM_OFFSET]) != be16(frame, CHECKSUM_OFFSET) {
        return Decode::Corrupt { consumed };
    }

    let reading = DecodedReading {
        cf1: PmTriple::read(frame, CF1_OFFSET),
        atm: PmTriple::read(frame, ATM_OFFSET),
    };

    if reading.is_plausible() {
        Decode::Frame { reading, consumed }
    } else {
        Decode::Implausible { reading, consumed }
    }
}

/// 16-bit wrapping byte sum used by the sensor.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC.len()).position(|w| w == SYNC)
}

#[inline]
fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}
