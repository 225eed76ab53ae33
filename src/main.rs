//! # Drone Link
//!
//! Headless ground link to an AR.Drone-class quadcopter.
//!
//! Opens a session, keeps the channels supervised, runs the flight tick with
//! neutral sticks and records telemetry until Ctrl+C, then lands and closes.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use drone_link::clock::MonotonicClock;
use drone_link::config::{Config, LoggingConfig};
use drone_link::flight::{FlightController, StickInput};
use drone_link::flight_log::{FlightRecord, FlightRecorder};
use drone_link::session::{altitude_limit_mm, Session};

/// Config file read when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Seconds between health reports
const STATUS_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).with_context(|| format!("loading {}", config_path))?
    } else {
        Config::default()
    };

    let _log_guard = init_logging(&config.logging)?;
    info!("Drone Link v{} starting...", env!("CARGO_PKG_VERSION"));
    if !Path::new(&config_path).exists() {
        warn!("{} not found, using built-in defaults", config_path);
    }

    let clock = MonotonicClock::shared();
    let session = Session::open(&config, None, clock.clone())
        .await
        .with_context(|| format!("opening session to {}", config.peer.address))?;
    info!("Connected, profile {:?}", session.profile());

    session.set_max_altitude(config.flight.max_altitude_m).await?;
    info!("Altitude limit {} mm", altitude_limit_mm(config.flight.max_altitude_m));

    let mut recorder = if config.flight_log.enabled {
        Some(FlightRecorder::new(&config.flight_log)?)
    } else {
        None
    };

    let mut flight = FlightController::new(
        session,
        config.autopilot_settings(),
        f64::from(config.flight.max_altitude_m),
        clock.clone(),
    );

    let mut tick = interval(Duration::from_millis(config.flight.tick_interval_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut log_tick = interval(Duration::from_millis(config.flight_log.log_interval_ms));
    log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_tick = interval(Duration::from_secs(STATUS_INTERVAL_SECS));

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = flight.tick(StickInput::default()).await {
                    warn!("Flight tick failed: {}", e);
                }
            }

            _ = log_tick.tick(), if recorder.is_some() => {
                let telemetry = flight.drone().snapshot();
                let mut record = FlightRecord::now(&telemetry);
                record.flying_time_ms = flight.flying_time_ms();
                record.return_home = flight.return_home_active();
                record.distance_home_m = flight.autopilot().distance();
                if let Some(log) = recorder.as_mut() {
                    if let Err(e) = log.record(&record) {
                        error!("Flight log write failed, recording disabled: {}", e);
                        recorder = None;
                    }
                }
            }

            _ = status_tick.tick() => {
                let state = flight.drone().snapshot();
                info!(
                    "Battery {}%, altitude {:.2} m, flying {}",
                    state.battery_percent, state.altitude_m, state.is_flying()
                );
                for (kind, health) in flight.drone().health() {
                    if health.active && !health.running {
                        warn!("{} channel not confirmed yet", kind);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Some(log) = recorder.as_mut() {
        log.flush()?;
    }
    flight.drone().close().await;
    info!("Total flying time: {} ms", flight.flying_time_ms());

    Ok(())
}

/// Console logging plus an optional daily rolling file
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level")?;

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "drone-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}
