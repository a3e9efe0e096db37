//! Dashboard rendering: HTML page and JSON snapshot.
//!
//! Both are built from [`SensorView`]s only, so a sensor that never
//! answered still renders as a tile with placeholders.

use std::time::Duration;

use askama::Template;
use serde::Serialize;

use klimat::health::{Reading, SensorView, Status};

/// Shown wherever a value is not available.
pub const PLACEHOLDER: &str = "—";

/// Readings older than this are flagged on the page.
pub const STALE_AFTER: Duration = Duration::from_secs(60);

/// Initial JSON buffer; doubled until the snapshot fits.
const JSON_BUF: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub pm25: f32,
    pub pm10: f32,
}

pub struct Row {
    pub label: &'static str,
    pub value: String,
    pub unit: &'static str,
}

pub struct Tile {
    pub title: &'static str,
    pub class: &'static str,
    pub status: &'static str,
    pub age: String,
    pub error: String,
    pub rows: Vec<Row>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct Dashboard {
    pub refresh: u32,
    pub pm25_limit: f32,
    pub pm10_limit: f32,
    pub tiles: Vec<Tile>,
}

impl Dashboard {
    pub fn new(limits: Limits, refresh: u32, particulate: &SensorView, atmospheric: &SensorView) -> Self {
        Self {
            refresh,
            pm25_limit: limits.pm25,
            pm10_limit: limits.pm10,
            tiles: vec![atmospheric_tile(atmospheric), particulate_tile(particulate, limits)],
        }
    }
}

/// Body of `GET /api/sensors`.
#[derive(Serialize)]
pub struct Snapshot<'a> {
    pub particulate: &'a SensorView,
    pub atmospheric: &'a SensorView,
}

impl Snapshot<'_> {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json_core::ser::Error> {
        let mut buf = vec![0u8; JSON_BUF];
        loop {
            match serde_json_core::to_slice(self, &mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                // Error text has no length bound.
                Err(serde_json_core::ser::Error::BufferFull) => {
                    let len = buf.len() * 2;
                    buf.resize(len, 0);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn status_class(status: Status) -> &'static str {
    match status {
        Status::Ok => "ok",
        Status::Warn => "warn",
        Status::Init | Status::Err => "",
    }
}

fn age_label(view: &SensorView) -> String {
    match view.age_secs {
        Some(secs) if view.is_stale(STALE_AFTER) => format!("{secs} s ago (stale)"),
        Some(secs) => format!("{secs} s ago"),
        None => PLACEHOLDER.into(),
    }
}

fn tile(title: &'static str, class: &'static str, view: &SensorView, rows: Vec<Row>) -> Tile {
    Tile {
        title,
        class,
        status: view.status.as_str(),
        age: age_label(view),
        error: view.error.clone(),
        rows,
    }
}

fn atmospheric_tile(view: &SensorView) -> Tile {
    let (temp, press) = match view.reading {
        Some(Reading::Atmospheric(a)) => (format!("{:.2}", a.temp_c), format!("{:.2}", a.press_hpa)),
        _ => (PLACEHOLDER.into(), PLACEHOLDER.into()),
    };
    let rows = vec![
        Row { label: "Temperature", value: temp, unit: "°C" },
        Row { label: "Pressure", value: press, unit: "hPa" },
    ];
    tile("Atmosphere (BMP280)", status_class(view.status), view, rows)
}

fn particulate_tile(view: &SensorView, limits: Limits) -> Tile {
    let pm = match view.reading {
        Some(Reading::Particulate(pm)) => Some(pm),
        _ => None,
    };
    // A stale reading over the limit still shows red.
    let over = pm.is_some_and(|pm| f32::from(pm.pm25) > limits.pm25 || f32::from(pm.pm10) > limits.pm10);
    let class = if over { "bad" } else { status_class(view.status) };

    let value = |v: Option<u16>| v.map_or_else(|| PLACEHOLDER.into(), |v| v.to_string());
    let rows = vec![
        Row { label: "PM1.0", value: value(pm.map(|p| p.pm1)), unit: "µg/m³" },
        Row { label: "PM2.5", value: value(pm.map(|p| p.pm25)), unit: "µg/m³" },
        Row { label: "PM10", value: value(pm.map(|p| p.pm10)), unit: "µg/m³" },
    ];
    tile("Particulates (PMS)", class, view, rows)
}
