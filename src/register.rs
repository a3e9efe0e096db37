//! Register sensor reader with address fallback.
//!
//! Owns a bus handle and a priority-ordered list of candidate addresses.
//! The first read probes the candidates in order and binds to the first one
//! that passes the identification handshake; later reads reuse that binding.
//! A failed read drops the binding so the next read probes again.

use embedded_hal::i2c::I2c;
use heapless::Vec;

use crate::bmp280::{self, Bmp280, Measurement};

/// Upper bound on configured candidate addresses.
pub const MAX_CANDIDATES: usize = 4;

pub type Candidates = Vec<u8, MAX_CANDIDATES>;

#[derive(Debug, thiserror::Error)]
pub enum Error<E: core::fmt::Debug> {
    #[error("no candidate addresses configured")]
    NoCandidates,

    /// Every candidate failed; `source` is the last one's fault.
    #[error("no sensor at any address (last {address:#04x}: {source})")]
    Exhausted {
        address: u8,
        #[source]
        source: bmp280::Error<E>,
    },

    /// The bound device stopped responding.
    #[error("read from {address:#04x} failed: {source}")]
    Read {
        address: u8,
        #[source]
        source: bmp280::Error<E>,
    },
}

pub struct RegisterReader<I> {
    i2c: I,
    candidates: Candidates,
    device: Option<Bmp280>,
}

impl<I: I2c> RegisterReader<I> {
    pub fn new(i2c: I, candidates: Candidates) -> Self {
        Self {
            i2c,
            candidates,
            device: None,
        }
    }

    /// Address the reader is currently bound to, if any.
    pub fn bound_address(&self) -> Option<u8> {
        self.device.as_ref().map(Bmp280::address)
    }

    /// One logical read: bind if needed, then measure.
    pub fn read(&mut self) -> Result<Measurement, Error<I::Error>> {
        let device = match self.device.take() {
            Some(dev) => dev,
            None => self.discover()?,
        };

        match device.measure(&mut self.i2c) {
            Ok(m) => {
                self.device = Some(device);
                Ok(m)
            }
            Err(source) => Err(Error::Read {
                address: device.address(),
                source,
            }),
        }
    }

    fn discover(&mut self) -> Result<Bmp280, Error<I::Error>> {
        let mut last = None;
        for &address in &self.candidates {
            match Bmp280::probe(&mut self.i2c, address) {
                Ok(dev) => {
                    log::info!("BMP280 bound at {:#04x}", address);
                    return Ok(dev);
                }
                Err(e) => {
                    log::debug!("No BMP280 at {:#04x}: {}", address, e);
                    last = Some((address, e));
                }
            }
        }
        match last {
            Some((address, source)) => Err(Error::Exhausted { address, source }),
            None => Err(Error::NoCandidates),
        }
    }

    /// Give the bus handle back.
    pub fn release(self) -> I {
        self.i2c
    }
}

/// Parse a comma-separated address list such as `"0x76,0x77"`.
/// The `0x` prefix is optional; entries are hexadecimal.
pub fn parse_candidates(s: &str) -> Option<Candidates> {
    let mut out = Candidates::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let digits = part
            .strip_prefix("0x")
            .or_else(|| part.strip_prefix("0X"))
            .unwrap_or(part);
        let addr = u8::from_str_radix(digits, 16).ok()?;
        if addr > 0x7F {
            return None;
        }
        out.push(addr).ok()?;
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmp280::tests::{probe_script, DATASHEET_DATA};
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    fn nack(addr: u8) -> Transaction {
        Transaction::write_read(addr, std::vec![0xD0], std::vec![0])
            .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }

    fn measure(addr: u8) -> Transaction {
        Transaction::write_read(addr, std::vec![0xF7], DATASHEET_DATA.to_vec())
    }

    fn candidates(list: &[u8]) -> Candidates {
        Candidates::from_slice(list).unwrap()
    }

    #[test]
    fn falls_back_to_second_address_and_binds_once() {
        let mut script = std::vec![nack(0x76)];
        script.extend(probe_script(0x77));
        script.push(measure(0x77));
        script.push(measure(0x77));
        let mut reader = RegisterReader::new(I2cMock::new(&script), candidates(&[0x76, 0x77]));

        let first = reader.read().unwrap();
        assert_eq!(reader.bound_address(), Some(0x77));
        let second = reader.read().unwrap();
        assert_eq!(first, second);

        reader.release().done();
    }

    #[test]
    fn exhausted_keeps_last_fault() {
        let script = [
            nack(0x76),
            Transaction::write_read(0x77, std::vec![0xD0], std::vec![0x60]),
        ];
        let mut reader = RegisterReader::new(I2cMock::new(&script), candidates(&[0x76, 0x77]));

        match reader.read() {
            Err(Error::Exhausted { address, source }) => {
                assert_eq!(address, 0x77);
                assert!(matches!(source, bmp280::Error::UnknownChip(0x60)));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        assert_eq!(reader.bound_address(), None);
        reader.release().done();
    }

    #[test]
    fn read_failure_drops_binding_and_rediscovers() {
        let mut script = probe_script(0x76);
        script.push(measure(0x76).with_error(ErrorKind::Other));
        script.extend(probe_script(0x76));
        script.push(measure(0x76));
        let mut reader = RegisterReader::new(I2cMock::new(&script), candidates(&[0x76]));

        let err = reader.read().unwrap_err();
        assert!(matches!(err, Error::Read { address: 0x76, .. }));
        assert_eq!(reader.bound_address(), None);

        assert!(reader.read().is_ok());
        assert_eq!(reader.bound_address(), Some(0x76));
        reader.release().done();
    }

    #[test]
    fn empty_candidate_list() {
        let mut reader = RegisterReader::new(I2cMock::new(&[]), Candidates::new());
        assert!(matches!(reader.read(), Err(Error::NoCandidates)));
        reader.release().done();
    }

    #[test]
    fn error_text_names_the_fault() {
        let script = [nack(0x76)];
        let mut reader = RegisterReader::new(I2cMock::new(&script), candidates(&[0x76]));
        let msg = std::format!("{}", reader.read().unwrap_err());
        assert!(msg.contains("0x76"), "{msg}");
        assert!(msg.contains("NoAcknowledge"), "{msg}");
        reader.release().done();
    }

    #[test]
    fn parses_address_lists() {
        assert_eq!(parse_candidates("0x76,0x77"), Some(candidates(&[0x76, 0x77])));
        assert_eq!(parse_candidates(" 77 , 0X76 "), Some(candidates(&[0x77, 0x76])));
        assert_eq!(parse_candidates(""), None);
        assert_eq!(parse_candidates("0x76,zz"), None);
        assert_eq!(parse_candidates("0x80"), None);
        assert_eq!(parse_candidates("1,2,3,4,5"), None);
    }
}
