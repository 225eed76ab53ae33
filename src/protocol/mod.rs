//! # Peer Wire Protocol
//!
//! Pure encoders and decoders for the three peer-facing formats. No I/O.
//!
//! This module handles:
//! - AT command frames (`VERB=seq,args\r`) sent on the command port
//! - Navdata packets (header + tagged options) from the telemetry port
//! - Navdata checksum verification
//! - PaVE framing of the TCP video stream

pub mod checksum;
pub mod command;
pub mod constants;
pub mod navdata;
pub mod video;
