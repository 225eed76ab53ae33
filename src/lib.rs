//! # Drone Link Library
//!
//! Command, telemetry and video link to an AR.Drone-class quadcopter.
//!
//! This library provides the wire codec for the peer's command and navdata
//! formats, the three supervised I/O channels, the watchdog that restarts
//! stalled channels, and the return-to-home autopilot fed by telemetry.

pub mod autopilot;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod flight;
pub mod flight_log;
pub mod peer_config;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod version;
