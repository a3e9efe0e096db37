//! Per-sensor health records and the store shared between workers and the
//! presentation layer.
//!
//! Each record is written by exactly one worker and read by any number of
//! request handlers. Records sit behind their own lock, so the two sensors
//! never contend with each other, and every read hands out a copy.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::bmp280::Measurement;
use crate::frame::PmTriple;

/// Logical sensors known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    Particulate,
    Atmospheric,
}

impl SensorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::Particulate => "particulate",
            SensorId::Atmospheric => "atmospheric",
        }
    }

    const fn index(self) -> usize {
        match self {
            SensorId::Particulate => 0,
            SensorId::Atmospheric => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Never read successfully, never failed either
    Init,
    /// Last attempt succeeded
    Ok,
    /// Last attempt failed, older reading still available
    Warn,
    /// Last attempt failed, nothing ever succeeded
    Err,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Init => "INIT",
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::Err => "ERR",
        }
    }
}

/// Temperature and pressure from the barometric sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Atmospheric {
    pub temp_c: f32,
    pub press_hpa: f32,
}

impl From<Measurement> for Atmospheric {
    fn from(m: Measurement) -> Self {
        Self {
            temp_c: m.temperature_c,
            press_hpa: m.pressure_hpa,
        }
    }
}

/// Last good payload, one fixed shape per sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Particulate(PmTriple),
    Atmospheric(Atmospheric),
}

/// Result of one poll attempt, as reported by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Reading),
    Failure(String),
}

/// State of one logical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorHealth {
    pub status: Status,
    pub last_ok: Option<Instant>,
    pub last_attempt: Option<Instant>,
    pub last_error: String,
    pub payload: Option<Reading>,
}

impl SensorHealth {
    pub const fn new() -> Self {
        Self {
            status: Status::Init,
            last_ok: None,
            last_attempt: None,
            last_error: String::new(),
            payload: None,
        }
    }

    /// Record the start of an attempt.
    pub fn touch(&mut self, at: Instant) {
        self.last_attempt = Some(self.last_attempt.map_or(at, |prev| prev.max(at)));
    }

    /// Apply one attempt outcome.
    ///
    /// Success replaces payload and `last_ok` together and clears the error.
    /// Failure never touches the payload; status is WARN if anything ever
    /// succeeded, ERR otherwise.
    pub fn apply(&mut self, outcome: Outcome, at: Instant) {
        match outcome {
            Outcome::Success(reading) => {
                self.status = Status::Ok;
                self.payload = Some(reading);
                self.last_ok = Some(self.last_ok.map_or(at, |prev| prev.max(at)));
                self.last_error.clear();
            }
            Outcome::Failure(error) => {
                self.status = if self.last_ok.is_some() {
                    Status::Warn
                } else {
                    Status::Err
                };
                self.last_error = error;
            }
        }
    }

    /// Presentation view relative to `now`.
    pub fn view(&self, now: Instant) -> SensorView {
        SensorView {
            status: self.status,
            reading: self.payload,
            age_secs: self.last_ok.map(|t| age(now, t)),
            attempt_age_secs: self.last_attempt.map(|t| age(now, t)),
            error: self.last_error.clone(),
        }
    }
}

impl Default for SensorHealth {
    fn default() -> Self {
        Self::new()
    }
}

fn age(now: Instant, then: Instant) -> u64 {
    now.saturating_duration_since(then).as_secs()
}

/// What the presentation layer gets to see of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
    pub age_secs: Option<u64>,
    pub attempt_age_secs: Option<u64>,
    pub error: String,
}

impl SensorView {
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age_secs.map_or(true, |a| a > max_age.as_secs())
    }
}

/// Shared holder of every sensor's latest state.
pub struct HealthStore {
    records: [Mutex<SensorHealth>; 2],
}

impl HealthStore {
    pub const fn new() -> Self {
        Self {
            records: [Mutex::new(SensorHealth::new()), Mutex::new(SensorHealth::new())],
        }
    }

    fn lock(&self, id: SensorId) -> MutexGuard<'_, SensorHealth> {
        // Records are plain data updated in one step; a panicked holder
        // cannot leave one half-written.
        self.records[id.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the start of an attempt on `id`.
    pub fn touch(&self, id: SensorId) {
        self.lock(id).touch(Instant::now());
    }

    /// Apply one attempt outcome to `id`.
    pub fn update(&self, id: SensorId, outcome: Outcome) {
        self.lock(id).apply(outcome, Instant::now());
    }

    /// Deep copy of the current record.
    pub fn snapshot(&self, id: SensorId) -> SensorHealth {
        self.lock(id).clone()
    }

    /// Presentation view of `id` as of now.
    pub fn view(&self, id: SensorId) -> SensorView {
        let health = self.snapshot(id);
        health.view(Instant::now())
    }
}

impl Default for HealthStore {
    fn default() -> Self {
        Self::new()
    }
}
