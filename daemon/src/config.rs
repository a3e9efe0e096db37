//! Runtime configuration from the environment.
//!
//! Every key is optional and falls back to [`klimat::defaults`]. A key that
//! is present but does not parse is a startup error, never a silent default.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use klimat::defaults;
use klimat::register::{parse_candidates, Candidates};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub pms_port: String,
    pub pms_baud: u32,
    pub bmp_enabled: bool,
    pub bmp_i2c_bus: u8,
    pub bmp_addrs: Candidates,
    pub pm25_limit: f32,
    pub pm10_limit: f32,
    pub refresh_seconds: u32,
    pub http_bind: String,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bmp_addrs = match get("BMP_ADDRS") {
            Some(raw) => parse_candidates(&raw)
                .ok_or_else(|| anyhow!("invalid BMP_ADDRS={raw:?}: expected comma-separated hex addresses"))?,
            None => defaults::BMP_ADDRS.iter().copied().collect(),
        };

        Ok(Self {
            pms_port: get("PMS_PORT").unwrap_or_else(|| defaults::PMS_PORT.into()),
            pms_baud: parsed(&get, "PMS_BAUD", defaults::PMS_BAUD)?,
            bmp_enabled: get("BMP_ENABLED").map_or(defaults::BMP_ENABLED, |v| v.trim() == "1"),
            bmp_i2c_bus: parsed(&get, "BMP_I2C_BUS", defaults::BMP_I2C_BUS)?,
            bmp_addrs,
            pm25_limit: parsed(&get, "PM25_LIMIT", defaults::PM25_LIMIT)?,
            pm10_limit: parsed(&get, "PM10_LIMIT", defaults::PM10_LIMIT)?,
            refresh_seconds: parsed(&get, "REFRESH_SECONDS", defaults::REFRESH_SECONDS)?,
            http_bind: get("HTTP_BIND").unwrap_or_else(|| defaults::HTTP_BIND.into()),
        })
    }

    pub fn i2c_path(&self) -> String {
        format!("/dev/i2c-{}", self.bmp_i2c_bus)
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Display + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}={raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.pms_port, "/dev/serial0");
        assert_eq!(c.pms_baud, 9600);
        assert!(c.bmp_enabled);
        assert_eq!(c.i2c_path(), "/dev/i2c-1");
        assert_eq!(c.bmp_addrs.as_slice(), &[0x76, 0x77]);
        assert_eq!(c.pm25_limit, 25.0);
        assert_eq!(c.pm10_limit, 50.0);
        assert_eq!(c.refresh_seconds, 5);
        assert_eq!(c.http_bind, "0.0.0.0:5000");
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("PMS_PORT", "/dev/ttyUSB0"),
            ("PMS_BAUD", "115200"),
            ("BMP_I2C_BUS", "3"),
            ("BMP_ADDRS", "0x77"),
            ("PM25_LIMIT", "12.5"),
            ("REFRESH_SECONDS", " 10 "),
            ("HTTP_BIND", "127.0.0.1:8080"),
        ])
        .unwrap();
        assert_eq!(c.pms_port, "/dev/ttyUSB0");
        assert_eq!(c.pms_baud, 115_200);
        assert_eq!(c.i2c_path(), "/dev/i2c-3");
        assert_eq!(c.bmp_addrs.as_slice(), &[0x77]);
        assert_eq!(c.pm25_limit, 12.5);
        assert_eq!(c.pm10_limit, 50.0);
        assert_eq!(c.refresh_seconds, 10);
        assert_eq!(c.http_bind, "127.0.0.1:8080");
    }

    #[test]
    fn bmp_enabled_only_by_one() {
        assert!(config(&[("BMP_ENABLED", "1")]).unwrap().bmp_enabled);
        assert!(!config(&[("BMP_ENABLED", "0")]).unwrap().bmp_enabled);
        assert!(!config(&[("BMP_ENABLED", "yes")]).unwrap().bmp_enabled);
    }

    #[test]
    fn bad_values_fail_with_key_name() {
        let err = config(&[("PMS_BAUD", "fast")]).unwrap_err();
        assert!(format!("{err:#}").contains("PMS_BAUD"));

        let err = config(&[("PM10_LIMIT", "")]).unwrap_err();
        assert!(err.to_string().contains("PM10_LIMIT"));

        let err = config(&[("BMP_ADDRS", "0x76,zz")]).unwrap_err();
        assert!(err.to_string().contains("BMP_ADDRS"));

        assert!(config(&[("BMP_I2C_BUS", "300")]).is_err());
    }
}
