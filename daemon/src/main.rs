//! Klimat daemon
//!
//! One thread per sensor worker plus a small pool of HTTP threads, all
//! sharing the health store. SIGINT/SIGTERM trigger the shutdown token;
//! workers notice it between attempts and the HTTP threads are unblocked.

mod config;
mod page;
mod server;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use linux_embedded_hal::I2cdev;

use klimat::defaults;
use klimat::health::HealthStore;
use klimat::worker::{AtmosphericWorker, ParticulateWorker, PollTiming, Shutdown};

use config::Config;
use page::Limits;
use server::App;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    let dotenv = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Ok(path) = dotenv {
        log::info!("Loaded environment from {}", path.display());
    }

    let config = Config::from_env().context("reading configuration")?;

    log::info!("Klimat v{} starting", VERSION);
    log::info!(
        "PMS on {} @ {} baud, BMP280 {} (bus {}, addrs {:02x?})",
        config.pms_port,
        config.pms_baud,
        if config.bmp_enabled { "enabled" } else { "disabled" },
        config.bmp_i2c_bus,
        config.bmp_addrs.as_slice(),
    );

    let store = Arc::new(HealthStore::new());
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("Signal received, shutting down");
            shutdown.trigger();
        })
        .context("installing signal handler")?;
    }

    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    // ── Particulate worker ───────────────────────────────────────────

    let port = config.pms_port.clone();
    let baud = config.pms_baud;
    let connector = move || {
        serialport::new(port.as_str(), baud)
            .timeout(defaults::SERIAL_READ_TIMEOUT)
            .open()
    };
    let pms = ParticulateWorker::new(connector, Arc::clone(&store), shutdown.clone(), PollTiming::new());
    workers.push(thread::Builder::new().name("pms".into()).spawn(move || pms.run())?);
    log::info!("PMS thread spawned");

    // ── Atmospheric worker ───────────────────────────────────────────

    if config.bmp_enabled {
        let path = config.i2c_path();
        let connector = move || I2cdev::new(&path);
        let bmp = AtmosphericWorker::new(
            connector,
            config.bmp_addrs.clone(),
            Arc::clone(&store),
            shutdown.clone(),
            PollTiming::new(),
        );
        workers.push(thread::Builder::new().name("bmp".into()).spawn(move || bmp.run())?);
        log::info!("BMP thread spawned");
    } else {
        log::info!("BMP280 disabled, atmospheric tile stays INIT");
    }

    // ── HTTP ─────────────────────────────────────────────────────────

    let http = Arc::new(
        tiny_http::Server::http(config.http_bind.as_str())
            .map_err(|e| anyhow!("cannot listen on {}: {}", config.http_bind, e))?,
    );
    let app = Arc::new(App {
        store: Arc::clone(&store),
        limits: Limits {
            pm25: config.pm25_limit,
            pm10: config.pm10_limit,
        },
        refresh: config.refresh_seconds,
    });

    let mut handlers = Vec::with_capacity(defaults::HTTP_THREADS);
    for i in 0..defaults::HTTP_THREADS {
        let http = Arc::clone(&http);
        let app = Arc::clone(&app);
        handlers.push(
            thread::Builder::new()
                .name(format!("http-{i}"))
                .spawn(move || server::http_thread(http, app))?,
        );
    }
    log::info!("HTTP listening on {} ({} threads)", config.http_bind, defaults::HTTP_THREADS);

    // ── Shutdown ─────────────────────────────────────────────────────

    shutdown.wait();

    // Each unblock wakes exactly one thread blocked in recv().
    for _ in &handlers {
        http.unblock();
    }
    for handle in handlers.into_iter().chain(workers) {
        let name = handle.thread().name().unwrap_or("?").to_owned();
        if handle.join().is_err() {
            log::error!("{} thread panicked", name);
        }
    }

    log::info!("Stopped");
    Ok(())
}
