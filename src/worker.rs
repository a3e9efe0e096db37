//! Polling workers, one per sensor, each owning its transport.
//!
//! A worker loops until its [`Shutdown`] token fires: open the transport,
//! read, push every outcome into the [`HealthStore`], and on any transport
//! failure close it, back off, and start over. Nothing a worker hits is
//! ever propagated; failures only show up as health state.
//!
//! Transports are reached through [`Connector`], so the loops run the same
//! against a real serial port / I2C bus and against scripted fakes.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::defaults;
use crate::health::{Atmospheric, HealthStore, Outcome, Reading, SensorId};
use crate::register::{Candidates, RegisterReader};
use crate::stream::FrameReader;

/// Opens a fresh transport handle. Dropping the handle closes it.
pub trait Connector {
    type Link;
    type Error: fmt::Display;

    fn connect(&mut self) -> Result<Self::Link, Self::Error>;
}

impl<F, L, E> Connector for F
where
    F: FnMut() -> Result<L, E>,
    E: fmt::Display,
{
    type Link = L;
    type Error = E;

    fn connect(&mut self) -> Result<L, E> {
        self()
    }
}

/// Sleep intervals used by the worker loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Pause after a failed open or a dropped link
    pub backoff: Duration,
    /// Pause between serial reads
    pub idle: Duration,
    /// Pause between register-bus reads
    pub interval: Duration,
}

impl PollTiming {
    pub const fn new() -> Self {
        Self {
            backoff: defaults::BACKOFF,
            idle: defaults::IDLE_PAUSE,
            interval: defaults::POLL_INTERVAL,
        }
    }
}

impl Default for PollTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ShutdownInner {
    stop: Mutex<bool>,
    cv: Condvar,
}

/// Cancellation token shared by the workers and whoever stops them.
///
/// All worker sleeps go through [`Shutdown::wait_timeout`], so triggering
/// wakes them immediately.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.stop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn trigger(&self) {
        *self.lock() = true;
        self.inner.cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.lock()
    }

    /// Sleep up to `timeout`. Returns true if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .inner
            .cv
            .wait_timeout_while(guard, timeout, |stop| !*stop)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        let guard = self.lock();
        let _stopped = self
            .inner
            .cv
            .wait_while(guard, |stop| !*stop)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Logs a failure at `warn` the first time it is seen and at `debug` while
/// it keeps repeating, so a missing device does not flood the log.
struct FailureLog {
    sensor: SensorId,
    last: Option<String>,
}

impl FailureLog {
    const fn new(sensor: SensorId) -> Self {
        Self { sensor, last: None }
    }

    fn failed(&mut self, what: &str, error: &str) {
        if self.last.as_deref() == Some(error) {
            log::debug!("{} {} failed again: {}", self.sensor.as_str(), what, error);
        } else {
            log::warn!("{} {} failed: {}", self.sensor.as_str(), what, error);
            self.last = Some(error.to_string());
        }
    }

    fn recovered(&mut self) {
        if self.last.take().is_some() {
            log::info!("{} sensor recovered", self.sensor.as_str());
        }
    }
}

// ── Particulate (serial) ──────────────────────────────────────────────

/// Reads the particulate sensor's byte stream and records every frame.
pub struct ParticulateWorker<C> {
    connector: C,
    store: Arc<HealthStore>,
    shutdown: Shutdown,
    timing: PollTiming,
    failures: FailureLog,
}

impl<C> ParticulateWorker<C>
where
    C: Connector,
    C::Link: Read,
{
    const ID: SensorId = SensorId::Particulate;

    pub fn new(connector: C, store: Arc<HealthStore>, shutdown: Shutdown, timing: PollTiming) -> Self {
        Self {
            connector,
            store,
            shutdown,
            timing,
            failures: FailureLog::new(Self::ID),
        }
    }

    /// Run until shutdown.
    pub fn run(mut self) {
        log::info!("Particulate worker started");

        while !self.shutdown.is_triggered() {
            self.store.touch(Self::ID);

            let error = match self.connector.connect() {
                Ok(link) => {
                    log::info!("Particulate sensor link open");
                    match self.pump(link) {
                        Ok(()) => break,
                        Err(e) => {
                            self.failures.failed("read", &e.to_string());
                            e.to_string()
                        }
                    }
                }
                Err(e) => {
                    let e = e.to_string();
                    self.failures.failed("open", &e);
                    e
                }
            };

            self.store.update(Self::ID, Outcome::Failure(error));
            if self.shutdown.wait_timeout(self.timing.backoff) {
                break;
            }
        }

        log::info!("Particulate worker stopped");
    }

    /// Read from an open link until it fails (`Err`) or shutdown (`Ok`).
    /// The link is dropped, and so closed, on return.
    fn pump(&mut self, mut link: C::Link) -> io::Result<()> {
        let mut reader = FrameReader::new();
        let mut chunk = [0u8; defaults::SERIAL_CHUNK];

        loop {
            self.store.touch(Self::ID);

            match link.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    let store = &self.store;
                    let stats = reader.feed(&chunk[..n], |reading| {
                        store.update(Self::ID, Outcome::Success(Reading::Particulate(reading.atm)));
                    });
                    if stats.frames > 0 {
                        self.failures.recovered();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self.shutdown.wait_timeout(self.timing.idle) {
                return Ok(());
            }
        }
    }
}

// ── Atmospheric (register bus) ────────────────────────────────────────

/// Polls the barometric sensor on a fixed interval.
pub struct AtmosphericWorker<C: Connector> {
    connector: C,
    candidates: Candidates,
    store: Arc<HealthStore>,
    shutdown: Shutdown,
    timing: PollTiming,
    reader: Option<RegisterReader<C::Link>>,
    failures: FailureLog,
}

impl<C> AtmosphericWorker<C>
where
    C: Connector,
    C::Link: I2c,
{
    const ID: SensorId = SensorId::Atmospheric;

    pub fn new(
        connector: C,
        candidates: Candidates,
        store: Arc<HealthStore>,
        shutdown: Shutdown,
        timing: PollTiming,
    ) -> Self {
        Self {
            connector,
            candidates,
            store,
            shutdown,
            timing,
            reader: None,
            failures: FailureLog::new(Self::ID),
        }
    }

    /// Run until shutdown.
    pub fn run(mut self) {
        log::info!("Atmospheric worker started");

        while !self.shutdown.is_triggered() {
            self.step();
            if self.shutdown.wait_timeout(self.timing.interval) {
                break;
            }
        }

        log::info!("Atmospheric worker stopped");
    }

    /// One attempt: open the bus if needed, read, record the outcome.
    pub fn step(&mut self) {
        self.store.touch(Self::ID);

        let outcome = match self.read() {
            Ok(reading) => {
                self.failures.recovered();
                Outcome::Success(Reading::Atmospheric(reading))
            }
            Err(e) => {
                // Tear the bus down; the next attempt reopens and rediscovers.
                self.reader = None;
                self.failures.failed("read", &e);
                Outcome::Failure(e)
            }
        };

        self.store.update(Self::ID, outcome);
    }

    fn read(&mut self) -> Result<Atmospheric, String> {
        let reader = match &mut self.reader {
            Some(reader) => reader,
            slot => {
                let bus = self.connector.connect().map_err(|e| e.to_string())?;
                slot.insert(RegisterReader::new(bus, self.candidates.clone()))
            }
        };

        reader.read().map(Atmospheric::from).map_err(|e| e.to_string())
    }
}
