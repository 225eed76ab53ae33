//! # Return-to-Home Autopilot
//!
//! Estimates where the drone is relative to its take-off point and computes
//! the control outputs that bring it back.
//!
//! Two position sources:
//! - **GPS**: great-circle distance between the home fix and the latest fix
//! - **Dead reckoning**: trapezoidal integration of body-frame velocities,
//!   projected onto the world frame with the current heading
//!
//! The source is chosen once per [`AutoPilot::reset`] and never switches
//! mid-flight. Angles are degrees at the interface; trigonometry converts to
//! radians at the point of use.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Mean Earth radius used for great-circle distances, in metres
pub const EARTH_RADIUS_M: f64 = 6_372_795.0;

/// Below this distance the drone only holds position
const HOLD_DISTANCE_M: f64 = 1.0;
/// Below this distance the drone stops climbing and comes down
const NEAR_DISTANCE_M: f64 = 3.0;
/// Forward speed above which the proximity caps apply
const PROXIMITY_SPEED_THRESHOLD: f64 = 0.09;
/// `(distance below, forward speed cap)`, nearest first
const PROXIMITY_CAPS: [(f64, f64); 3] = [(2.0, 0.05), (4.0, 0.075), (6.0, 0.1)];
/// Heading error at which forward speed reaches zero
const FORWARD_SPEED_ZERO_ERROR_DEG: f64 = 30.0;
/// Degrees of heading error per unit of command
const COMMAND_SCALE: f64 = 100.0;

/// Tunable limits of the return-to-home controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoPilotSettings {
    /// Climb and descent command magnitude
    pub vertical_speed: f64,
    /// Altitude above which the drone descends once close to home, in metres
    pub descent_altitude_m: f64,
    /// Allowed excess over the highest manual altitude, in metres
    pub altitude_margin_m: f64,
    /// Heading error beyond which the drone only turns
    pub max_heading_error_deg: f64,
    /// Rotation command limit while only turning
    pub max_rotation: f64,
}

impl Default for AutoPilotSettings {
    fn default() -> Self {
        Self {
            vertical_speed: 0.25,
            descent_altitude_m: 3.0,
            altitude_margin_m: 1.5,
            max_heading_error_deg: 25.0,
            max_rotation: 0.5,
        }
    }
}

/// Control outputs toward home
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WayHome {
    /// Yaw command, positive turns clockwise
    pub rotation: f64,
    /// Forward command
    pub forward: f64,
    /// Vertical command, positive climbs
    pub vertical: f64,
}

/// Values exposed for on-screen debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugProperty {
    /// East offset from home, in metres (dead reckoning)
    PositionX,
    /// North offset from home, in metres (dead reckoning)
    PositionY,
    Altitude,
    AltitudeMax,
    DroneHeading,
    HomeHeading,
    CurrentLatitude,
    CurrentLongitude,
}

/// Wrap an angle into `[0, 360)`
pub fn normalize_360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into `[-180, 180]`
pub fn normalize_180(angle: f64) -> f64 {
    let wrapped = normalize_360(angle);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Great-circle distance in metres (spherical law of cosines)
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (a, b) = (lat1.to_radians(), lat2.to_radians());
    let delta_lon = (lon1 - lon2).to_radians();
    let cosine = a.cos() * b.cos() * delta_lon.cos() + a.sin() * b.sin();
    // Rounding can push identical points just past 1
    EARTH_RADIUS_M * cosine.clamp(-1.0, 1.0).acos()
}

/// Return-to-home state for one flight
#[derive(Debug, Clone)]
pub struct AutoPilot {
    settings: AutoPilotSettings,
    has_gps: bool,
    home: (f64, f64),
    fix: Option<(f64, f64)>,
    position_x: f64,
    position_y: f64,
    last_forward: f64,
    last_lateral: f64,
    last_update_us: i64,
    distance: f64,
    altitude: f64,
    max_altitude: f64,
    heading: f64,
    home_heading: f64,
}

impl AutoPilot {
    /// Idle autopilot with no home point
    pub fn new(settings: AutoPilotSettings) -> Self {
        Self {
            settings,
            has_gps: false,
            home: (0.0, 0.0),
            fix: None,
            position_x: 0.0,
            position_y: 0.0,
            last_forward: 0.0,
            last_lateral: 0.0,
            last_update_us: 0,
            distance: 0.0,
            altitude: 0.0,
            max_altitude: 0.0,
            heading: 0.0,
            home_heading: 0.0,
        }
    }

    /// Start a new flight
    ///
    /// # Arguments
    ///
    /// * `timestamp_us` - Monotonic time of the reset, in microseconds
    /// * `has_gps` - Use GPS instead of dead reckoning until the next reset
    /// * `home_lat` / `home_lon` - Home fix, used only with GPS
    pub fn reset(&mut self, timestamp_us: i64, has_gps: bool, home_lat: f64, home_lon: f64) {
        *self = Self::new(self.settings);
        self.last_update_us = timestamp_us;
        self.has_gps = has_gps;
        if has_gps {
            self.home = (home_lat, home_lon);
            info!("Autopilot reset with GPS, home at {:.6}, {:.6}", home_lat, home_lon);
        } else {
            info!("Autopilot reset with dead reckoning");
        }
    }

    /// Store the latest GPS fix
    pub fn update_gps(&mut self, lat: f64, lon: f64) {
        self.fix = Some((lat, lon));
    }

    /// Feed one telemetry sample
    ///
    /// # Arguments
    ///
    /// * `timestamp_us` - Monotonic sample time, in microseconds
    /// * `heading_deg` - Drone heading in `[0, 360)`
    /// * `forward` / `lateral` - Body-frame velocities, in m/s
    /// * `altitude` - Altitude in metres
    /// * `autonomous` - Return-to-home is flying; the altitude ceiling is frozen
    pub fn update(
        &mut self,
        timestamp_us: i64,
        heading_deg: f64,
        forward: f64,
        lateral: f64,
        altitude: f64,
        autonomous: bool,
    ) {
        self.heading = heading_deg;
        self.altitude = altitude;
        if !autonomous && altitude > self.max_altitude {
            self.max_altitude = altitude;
        }

        if self.has_gps {
            if let Some((lat, lon)) = self.fix {
                self.distance = great_circle_distance(self.home.0, self.home.1, lat, lon);
            }
            return;
        }

        let elapsed_s = if timestamp_us > self.last_update_us {
            (timestamp_us - self.last_update_us) as f64 * 1e-6
        } else {
            0.0
        };
        self.last_update_us = self.last_update_us.max(timestamp_us);

        let forward_avg = (forward + self.last_forward) / 2.0;
        let lateral_avg = (lateral + self.last_lateral) / 2.0;
        self.last_forward = forward;
        self.last_lateral = lateral;

        let heading = heading_deg.to_radians();
        self.position_x += heading.sin() * forward_avg * elapsed_s;
        self.position_y += heading.cos() * forward_avg * elapsed_s;

        let side = (heading_deg + 90.0).to_radians();
        self.position_x += side.sin() * lateral_avg * elapsed_s;
        self.position_y += side.cos() * lateral_avg * elapsed_s;

        self.distance = self.position_x.hypot(self.position_y);
    }

    /// Control outputs that bring the drone home
    ///
    /// In GPS mode without a fix yet only the vertical command is set.
    pub fn compute_way_to_home(&mut self) -> WayHome {
        let s = self.settings;
        let mut out = WayHome::default();

        if self.distance < NEAR_DISTANCE_M {
            if self.altitude > s.descent_altitude_m {
                out.vertical = -s.vertical_speed;
            }
            if self.distance < HOLD_DISTANCE_M {
                return out;
            }
        } else if self.altitude < self.max_altitude {
            out.vertical = s.vertical_speed;
        } else if self.altitude > self.max_altitude + s.altitude_margin_m {
            out.vertical = -s.vertical_speed;
        }

        let (to_home_x, to_home_y) = if self.has_gps {
            match self.fix {
                Some((lat, lon)) => (self.home.1 - lon, self.home.0 - lat),
                None => return out,
            }
        } else {
            // Offset points from home to the drone; home is the other way
            (-self.position_x, -self.position_y)
        };
        self.home_heading = normalize_360(to_home_x.atan2(to_home_y).to_degrees());

        let error = normalize_180(self.home_heading - self.heading);
        if error.abs() > s.max_heading_error_deg {
            out.forward = 0.0;
            out.rotation = error.clamp(-s.max_rotation, s.max_rotation);
        } else {
            out.rotation = error / COMMAND_SCALE;
            out.forward = (FORWARD_SPEED_ZERO_ERROR_DEG - error.abs()) / COMMAND_SCALE;
        }

        if out.forward > PROXIMITY_SPEED_THRESHOLD {
            if let Some(&(_, cap)) = PROXIMITY_CAPS.iter().find(|(limit, _)| self.distance < *limit) {
                out.forward = cap;
            }
        }

        out
    }

    /// GPS is the position source for this flight
    pub fn has_gps(&self) -> bool {
        self.has_gps
    }

    /// Distance to home, in metres
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Current value of one internal quantity, for diagnostics
    pub fn debug_property(&self, property: DebugProperty) -> f64 {
        match property {
            DebugProperty::PositionX => self.position_x,
            DebugProperty::PositionY => self.position_y,
            DebugProperty::Altitude => self.altitude,
            DebugProperty::AltitudeMax => self.max_altitude,
            DebugProperty::DroneHeading => self.heading,
            DebugProperty::HomeHeading => self.home_heading,
            DebugProperty::CurrentLatitude => self.fix.map_or(0.0, |f| f.0),
            DebugProperty::CurrentLongitude => self.fix.map_or(0.0, |f| f.1),
        }
    }
}

impl Default for AutoPilot {
    fn default() -> Self {
        Self::new(AutoPilotSettings::default())
    }
}
