//! Register-level driver for the Bosch BMP280 barometric sensor.
//!
//! Written against the blocking `embedded-hal` 1.0 [`I2c`] trait. The
//! driver does not own the bus: [`Bmp280`] holds only the bound address and
//! the factory calibration, and every call borrows the bus. This lets
//! [`crate::register`] probe several addresses on the same bus handle.

use embedded_hal::i2c::I2c;

/// Default 7-bit addresses (SDO low, SDO high), in probe order.
pub const ADDRESSES: [u8; 2] = [0x76, 0x77];

/// Value of the id register for a BMP280.
pub const CHIP_ID: u8 = 0x58;

mod reg {
    pub const CALIB: u8 = 0x88;
    pub const ID: u8 = 0xD0;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const CONFIG: u8 = 0xF5;
    pub const PRESS_MSB: u8 = 0xF7;
}

/// osrs_t = x2, osrs_p = x16, mode = normal
const CTRL_MEAS_VALUE: u8 = (0b010 << 5) | (0b101 << 2) | 0b11;

/// t_sb = 0.5 ms, filter = x16
const CONFIG_VALUE: u8 = 0b100 << 2;

/// Raw ADC value reported for a skipped measurement.
const SKIPPED: i32 = 0x80000;

#[derive(Debug, thiserror::Error)]
pub enum Error<E: core::fmt::Debug> {
    /// Underlying bus error (no ACK, arbitration loss, I/O failure).
    #[error("I2C error: {0:?}")]
    I2c(E),

    /// Something answered, but it is not a BMP280.
    #[error("unexpected chip id {0:#04x}")]
    UnknownChip(u8),

    /// The data registers still hold the reset value.
    #[error("measurement not ready")]
    NotReady,

    /// Calibration block would divide by zero.
    #[error("invalid calibration data")]
    InvalidCalibration,
}

/// Factory trim parameters (datasheet section 3.11.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

impl Calibration {
    /// Parse the 24-byte little-endian block starting at `0x88`.
    pub fn from_bytes(b: &[u8; 24]) -> Self {
        let u = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
        }
    }

    /// Floating-point compensation from the datasheet (section 8.1).
    /// Returns (°C, Pa), or `None` when `p1` is zero.
    pub fn compensate(&self, adc_t: i32, adc_p: i32) -> Option<(f64, f64)> {
        let adc_t = f64::from(adc_t);
        let adc_p = f64::from(adc_p);
        let t1 = f64::from(self.t1);

        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let d = adc_t / 131072.0 - t1 / 8192.0;
        let var2 = d * d * f64::from(self.t3);
        let t_fine = var1 + var2;
        let temperature = t_fine / 5120.0;

        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524288.0 + f64::from(self.p2) * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return None;
        }

        let mut p = 1048576.0 - adc_p;
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2147483648.0;
        let var2 = p * f64::from(self.p8) / 32768.0;
        p += (var1 + var2 + f64::from(self.p7)) / 16.0;

        Some((temperature, p))
    }
}

/// One compensated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
}

/// A BMP280 bound to one address on some bus.
#[derive(Debug, Clone)]
pub struct Bmp280 {
    address: u8,
    calib: Calibration,
}

impl Bmp280 {
    /// Identify, read calibration and start continuous measurement at
    /// `address`.
    pub fn probe<I: I2c>(i2c: &mut I, address: u8) -> Result<Self, Error<I::Error>> {
        let mut id = [0u8; 1];
        i2c.write_read(address, &[reg::ID], &mut id).map_err(Error::I2c)?;
        if id[0] != CHIP_ID {
            return Err(Error::UnknownChip(id[0]));
        }

        let mut raw = [0u8; 24];
        i2c.write_read(address, &[reg::CALIB], &mut raw).map_err(Error::I2c)?;
        let calib = Calibration::from_bytes(&raw);
        if calib.p1 == 0 {
            return Err(Error::InvalidCalibration);
        }

        // Config must be written before leaving sleep mode.
        i2c.write(address, &[reg::CONFIG, CONFIG_VALUE]).map_err(Error::I2c)?;
        i2c.write(address, &[reg::CTRL_MEAS, CTRL_MEAS_VALUE]).map_err(Error::I2c)?;

        Ok(Self { address, calib })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Burst-read the data registers and compensate.
    pub fn measure<I: I2c>(&self, i2c: &mut I) -> Result<Measurement, Error<I::Error>> {
        let mut data = [0u8; 6];
        i2c.write_read(self.address, &[reg::PRESS_MSB], &mut data)
            .map_err(Error::I2c)?;

        let adc_p = raw20(data[0], data[1], data[2]);
        let adc_t = raw20(data[3], data[4], data[5]);
        if adc_t == SKIPPED {
            return Err(Error::NotReady);
        }

        let (t, p) = self
            .calib
            .compensate(adc_t, adc_p)
            .ok_or(Error::InvalidCalibration)?;

        Ok(Measurement {
            temperature_c: t as f32,
            pressure_hpa: (p / 100.0) as f32,
        })
    }
}

fn raw20(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    /// Calibration example from the datasheet, section 8.2.
    pub(crate) const DATASHEET_CALIB: Calibration = Calibration {
        t1: 27504,
        t2: 26435,
        t3: -1000,
        p1: 36477,
        p2: -10685,
        p3: 3024,
        p4: 2855,
        p5: 140,
        p6: -7,
        p7: 15500,
        p8: -14600,
        p9: 6000,
    };

    pub(crate) fn calib_bytes(c: &Calibration) -> std::vec::Vec<u8> {
        let mut v = std::vec::Vec::with_capacity(24);
        v.extend_from_slice(&c.t1.to_le_bytes());
        for s in [c.t2, c.t3] {
            v.extend_from_slice(&s.to_le_bytes());
        }
        v.extend_from_slice(&c.p1.to_le_bytes());
        for s in [c.p2, c.p3, c.p4, c.p5, c.p6, c.p7, c.p8, c.p9] {
            v.extend_from_slice(&s.to_le_bytes());
        }
        v
    }

    /// Register bytes for adc_P = 415148, adc_T = 519888.
    pub(crate) const DATASHEET_DATA: [u8; 6] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00];

    /// Transactions for a successful probe at `addr`.
    pub(crate) fn probe_script(addr: u8) -> std::vec::Vec<Transaction> {
        std::vec![
            Transaction::write_read(addr, std::vec![0xD0], std::vec![CHIP_ID]),
            Transaction::write_read(addr, std::vec![0x88], calib_bytes(&DATASHEET_CALIB)),
            Transaction::write(addr, std::vec![0xF5, CONFIG_VALUE]),
            Transaction::write(addr, std::vec![0xF4, CTRL_MEAS_VALUE]),
        ]
    }

    #[test]
    fn calibration_round_trips_through_register_layout() {
        let bytes = calib_bytes(&DATASHEET_CALIB);
        let arr: [u8; 24] = bytes.as_slice().try_into().unwrap();
        assert_eq!(Calibration::from_bytes(&arr), DATASHEET_CALIB);
    }

    #[test]
    fn compensation_matches_datasheet_example() {
        let (t, p) = DATASHEET_CALIB.compensate(519888, 415148).unwrap();
        assert!((t - 25.08).abs() < 0.01, "temperature {t}");
        assert!((p - 100653.27).abs() < 1.0, "pressure {p}");
    }

    #[test]
    fn raw_values_are_20_bit() {
        assert_eq!(raw20(0x65, 0x5A, 0xC0), 415148);
        assert_eq!(raw20(0x7E, 0xED, 0x00), 519888);
        assert_eq!(raw20(0x80, 0x00, 0x00), SKIPPED);
    }

    #[test]
    fn probe_then_measure() {
        let mut script = probe_script(0x76);
        script.push(Transaction::write_read(0x76, std::vec![0xF7], DATASHEET_DATA.to_vec()));
        let mut i2c = I2cMock::new(&script);

        let dev = Bmp280::probe(&mut i2c, 0x76).unwrap();
        assert_eq!(dev.address(), 0x76);
        let m = dev.measure(&mut i2c).unwrap();
        assert!((m.temperature_c - 25.08).abs() < 0.01);
        assert!((m.pressure_hpa - 1006.53).abs() < 0.01);

        i2c.done();
    }

    #[test]
    fn wrong_chip_id_is_rejected() {
        let mut i2c = I2cMock::new(&[Transaction::write_read(0x77, std::vec![0xD0], std::vec![0x60])]);
        assert!(matches!(Bmp280::probe(&mut i2c, 0x77), Err(Error::UnknownChip(0x60))));
        i2c.done();
    }

    #[test]
    fn bus_error_is_surfaced() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(0x76, std::vec![0xD0], std::vec![0]).with_error(ErrorKind::Other),
        ]);
        assert!(matches!(Bmp280::probe(&mut i2c, 0x76), Err(Error::I2c(ErrorKind::Other))));
        i2c.done();
    }

    #[test]
    fn skipped_measurement_is_not_ready() {
        let dev = Bmp280 { address: 0x76, calib: DATASHEET_CALIB };
        let mut i2c = I2cMock::new(&[Transaction::write_read(
            0x76,
            std::vec![0xF7],
            std::vec![0x80, 0x00, 0x00, 0x80, 0x00, 0x00],
        )]);
        assert!(matches!(dev.measure(&mut i2c), Err(Error::NotReady)));
        i2c.done();
    }

    #[test]
    fn zero_p1_is_invalid_calibration() {
        let calib = Calibration { p1: 0, ..DATASHEET_CALIB };
        assert_eq!(calib.compensate(519888, 415148), None);
    }
}
