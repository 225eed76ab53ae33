//! # Flight Controller
//!
//! The controlling application's tick. Turns pilot input into move commands,
//! enforces the altitude limit, and hands control to the autopilot while
//! return-to-home is active.
//!
//! This module handles:
//! - Take-off/landing toggle with the flight timer and home reset
//! - Altitude limit ladder for manual flight
//! - Feeding telemetry to the autopilot on every airborne tick
//! - Detecting a running flight timer while the drone reports landed

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::autopilot::{AutoPilot, AutoPilotSettings, WayHome};
use crate::channel::telemetry::TelemetryState;
use crate::clock::SharedClock;
use crate::error::Result;
use crate::session::Session;

/// Pilot stick input, each axis in `[-1, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StickInput {
    /// Positive moves right
    pub side: f32,
    /// Positive moves forward
    pub forward: f32,
    /// Positive climbs
    pub vertical: f32,
    /// Positive turns clockwise
    pub turn: f32,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Drone on the ground, nothing sent
    Grounded,
    /// Pilot input sent, with the vertical command after the altitude limit
    Manual { input: StickInput },
    /// Autopilot output sent
    ReturnHome { way: WayHome, distance_m: f64 },
}

/// Vertical command after applying the altitude limit
///
/// Below the limit the pilot's request passes through; at or above it the
/// drone is brought down harder the further it overshoots.
pub fn altitude_command(altitude_m: f64, limit_m: f64, requested: f32) -> f32 {
    if altitude_m < limit_m {
        return requested;
    }
    let over = altitude_m - limit_m;
    if over > 10.0 {
        -0.75
    } else if over > 5.0 {
        -0.5
    } else {
        -0.2
    }
}

/// Commands the flight controller needs from the link
#[async_trait]
pub trait DroneLink: Send + Sync {
    /// Copy of the latest telemetry
    fn snapshot(&self) -> TelemetryState;

    async fn takeoff(&self) -> Result<()>;

    async fn land(&self) -> Result<()>;

    /// Progressive move, forward positive
    async fn move_custom(&self, side: f32, forward: f32, vertical: f32, turn: f32) -> Result<()>;
}

#[async_trait]
impl DroneLink for Session {
    fn snapshot(&self) -> TelemetryState {
        Session::snapshot(self)
    }

    async fn takeoff(&self) -> Result<()> {
        Session::takeoff(self).await.map(|_| ())
    }

    async fn land(&self) -> Result<()> {
        Session::land(self).await.map(|_| ())
    }

    async fn move_custom(&self, side: f32, forward: f32, vertical: f32, turn: f32) -> Result<()> {
        Session::move_custom(self, side, forward, vertical, turn).await.map(|_| ())
    }
}

/// Accumulated airborne time
#[derive(Debug, Clone, Copy, Default)]
struct FlightTimer {
    running_since_ms: Option<u64>,
    accumulated_ms: u64,
}

impl FlightTimer {
    fn resume(&mut self, now_ms: u64) {
        self.running_since_ms.get_or_insert(now_ms);
    }

    fn pause(&mut self, now_ms: u64) {
        if let Some(since) = self.running_since_ms.take() {
            self.accumulated_ms += now_ms.saturating_sub(since);
        }
    }

    fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.accumulated_ms + self.running_since_ms.map_or(0, |since| now_ms.saturating_sub(since))
    }
}

/// Flight logic on top of a [`DroneLink`]
pub struct FlightController<D> {
    drone: D,
    autopilot: AutoPilot,
    clock: SharedClock,
    altitude_limit_m: f64,
    return_home: bool,
    timer: FlightTimer,
}

impl<D: DroneLink> FlightController<D> {
    /// # Arguments
    ///
    /// * `drone` - Link to command
    /// * `autopilot` - Return-to-home limits
    /// * `altitude_limit_m` - Manual flight ceiling
    /// * `clock` - Same clock the channels use
    pub fn new(drone: D, autopilot: AutoPilotSettings, altitude_limit_m: f64, clock: SharedClock) -> Self {
        Self {
            drone,
            autopilot: AutoPilot::new(autopilot),
            clock,
            altitude_limit_m,
            return_home: false,
            timer: FlightTimer::default(),
        }
    }

    pub fn drone(&self) -> &D {
        &self.drone
    }

    pub fn autopilot(&self) -> &AutoPilot {
        &self.autopilot
    }

    pub fn return_home_active(&self) -> bool {
        self.return_home
    }

    pub fn set_return_home(&mut self, active: bool) {
        if active != self.return_home {
            info!("Return to home {}", if active { "enabled" } else { "disabled" });
        }
        self.return_home = active;
    }

    pub fn set_altitude_limit(&mut self, metres: f64) {
        self.altitude_limit_m = metres;
    }

    /// Total airborne time so far
    pub fn flying_time_ms(&self) -> u64 {
        self.timer.elapsed_ms(self.clock.now_ms())
    }

    pub fn flight_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Make the current position the new home
    pub fn reset_home(&mut self) {
        let state = self.drone.snapshot();
        let has_gps = state.has_gps();
        let (lat, lon) = state.gps.as_ref().map_or((0.0, 0.0), |fix| (fix.latitude, fix.longitude));
        self.autopilot.reset(self.clock.now_micros() as i64, has_gps, lat, lon);
    }

    /// Take off when landed, land when flying
    pub async fn toggle_takeoff(&mut self) -> Result<()> {
        if self.drone.snapshot().on_ground() {
            info!("Taking off");
            self.reset_home();
            self.drone.takeoff().await?;
            self.timer.resume(self.clock.now_ms());
        } else {
            info!("Landing");
            self.timer.pause(self.clock.now_ms());
            self.drone.land().await?;
        }
        Ok(())
    }

    /// One control step
    ///
    /// # Errors
    ///
    /// Returns error if the move command cannot be sent.
    pub async fn tick(&mut self, input: StickInput) -> Result<TickOutcome> {
        let state = self.drone.snapshot();
        let now_ms = self.clock.now_ms();

        if state.on_ground() {
            if self.timer.is_running() {
                warn!("Flying timer active while drone on ground, timer will be stopped");
                self.timer.pause(now_ms);
            }
            return Ok(TickOutcome::Grounded);
        }

        if self.autopilot.has_gps() {
            if let Some(fix) = &state.gps {
                self.autopilot.update_gps(fix.latitude, fix.longitude);
            }
        }

        let altitude = f64::from(state.altitude_m);
        self.autopilot.update(
            self.clock.now_micros() as i64,
            f64::from(state.yaw_360()),
            f64::from(state.velocity.x),
            f64::from(state.velocity.y),
            altitude,
            self.return_home,
        );

        if self.return_home {
            let way = self.autopilot.compute_way_to_home();
            self.drone
                .move_custom(0.0, way.forward as f32, way.vertical as f32, way.rotation as f32)
                .await?;
            debug!("Return to home {:?} at {:.1} m", way, self.autopilot.distance());
            return Ok(TickOutcome::ReturnHome { way, distance_m: self.autopilot.distance() });
        }

        let vertical = altitude_command(altitude, self.altitude_limit_m, input.vertical);
        self.drone.move_custom(input.side, input.forward, vertical, input.turn).await?;
        Ok(TickOutcome::Manual { input: StickInput { vertical, ..input } })
    }
}
