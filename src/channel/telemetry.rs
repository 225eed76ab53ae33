//! # Telemetry Channel
//!
//! Receives navdata from the peer's telemetry port and publishes it as a
//! [`TelemetryState`] snapshot.
//!
//! Each loop iteration sends the one-byte stream trigger, waits for a packet
//! with a bounded timeout, decodes it and replaces the published state as a
//! whole. A malformed packet is logged and skipped. A socket error ends the
//! loop and flags the channel for restart; restarts are left to the
//! supervisor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::CommandChannel;
use super::worker::Worker;
use super::{open_udp, ChannelHealth, ChannelKind, PeerEndpoint, Supervised};
use crate::clock::SharedClock;
use crate::error::Result;
use crate::protocol::command::AtCommand;
use crate::protocol::constants::{hdvideo, state, tags, NAVDATA_OPTIONS_V2, STREAM_TRIGGER};
use crate::protocol::navdata::{
    decode_demo, decode_gps, decode_hdvideo, decode_telemetry_packet, NavdataPacket,
};
use crate::version::PeerProfile;

/// Largest navdata datagram accepted
pub const NAVDATA_BUFFER_SIZE: usize = 4096;

/// Free space (kB) a USB key needs to be usable for recording
pub const USB_MIN_FREESPACE_KB: u32 = 10_000;

/// Remaining recording time (s) a USB key needs to be usable
pub const USB_MIN_REMAINING_S: u32 = 120;

/// Velocity in m/s, drone frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// GPS position reported by the flight recorder accessory
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Course over ground; only meaningful while moving
    pub heading_deg: f32,
    /// Receiver is plugged in
    pub plugged: bool,
    /// Receiver reports a usable position
    pub valid: bool,
    pub satellites: u8,
}

/// Onboard USB recording status
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsbStatus {
    pub present: bool,
    pub recording: bool,
    pub full: bool,
    pub freespace_kb: u32,
    pub remaining_s: u32,
}

/// Drone error conditions, in reporting priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneError {
    Motors,
    Cutout,
    AnglesOutOfRange,
    Ultrasound,
    ComLost,
    ComWatchdog,
    Emergency,
    UserEmergency,
    BatteryLow,
}

impl DroneError {
    /// Human readable description
    pub fn describe(&self) -> &'static str {
        match self {
            DroneError::Motors => "Motor problem",
            DroneError::Cutout => "Motor blocked",
            DroneError::AnglesOutOfRange => "Angles out of range",
            DroneError::Ultrasound => "Ultrasonic sensor problem",
            DroneError::ComLost => "Communication lost",
            DroneError::ComWatchdog => "Communication watchdog",
            DroneError::Emergency => "Emergency",
            DroneError::UserEmergency => "User emergency",
            DroneError::BatteryLow => "Battery too low",
        }
    }
}

const ERROR_PRIORITY: [(u32, DroneError); 9] = [
    (state::MOTORS, DroneError::Motors),
    (state::CUTOUT, DroneError::Cutout),
    (state::ANGLES_OUT_OF_RANGE, DroneError::AnglesOutOfRange),
    (state::ULTRASOUND, DroneError::Ultrasound),
    (state::COM_LOST, DroneError::ComLost),
    (state::COM_WATCHDOG, DroneError::ComWatchdog),
    (state::EMERGENCY, DroneError::Emergency),
    (state::USER_EMERGENCY, DroneError::UserEmergency),
    (state::VBAT_LOW, DroneError::BatteryLow),
];

/// Latest decoded telemetry
///
/// Replaced as a whole for every accepted packet; readers get a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryState {
    /// Navdata sequence of the packet this state came from
    pub sequence: u32,
    /// Drone state bitmask
    pub status: u32,
    /// Control state from the demo block
    pub ctrl_state: u32,
    pub battery_percent: u32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    /// -180..180
    pub yaw_deg: f32,
    pub altitude_m: f32,
    pub velocity: Velocity,
    pub gps: Option<GpsFix>,
    pub usb: Option<UsbStatus>,
    /// Monotonic time the packet was accepted, in ms
    pub updated_ms: u64,
}

impl TelemetryState {
    /// Build the next state from a decoded packet
    ///
    /// Blocks missing from the packet keep their previous values.
    ///
    /// # Errors
    ///
    /// Returns error if an allow-listed block is malformed.
    pub fn merge_packet(&self, packet: &NavdataPacket, decodes_gps: bool, now_ms: u64) -> Result<Self> {
        let mut next = self.clone();
        next.sequence = packet.header.sequence;
        next.status = packet.header.state;
        next.updated_ms = now_ms;

        for option in &packet.options {
            match option.tag {
                tags::DEMO => {
                    let demo = decode_demo(&option.payload)?;
                    next.ctrl_state = demo.ctrl_state;
                    next.battery_percent = demo.battery_percent;
                    next.roll_deg = demo.roll_deg;
                    next.pitch_deg = demo.pitch_deg;
                    next.yaw_deg = demo.yaw_deg;
                    next.altitude_m = demo.altitude_m;
                    next.velocity = Velocity { x: demo.velocity_x, y: demo.velocity_y, z: demo.velocity_z };
                }
                tags::HDVIDEO_STREAM => {
                    let block = decode_hdvideo(&option.payload)?;
                    next.usb = Some(UsbStatus {
                        present: block.state & hdvideo::USBKEY_PRESENT != 0,
                        recording: block.state & hdvideo::USBKEY_RECORDING != 0,
                        full: block.state & hdvideo::USBKEY_FULL != 0,
                        freespace_kb: block.usbkey_freespace_kb,
                        remaining_s: block.usbkey_remaining_s,
                    });
                }
                // Older firmware uses this tag for an unrelated sensor block
                tags::GPS if decodes_gps => {
                    let gps = decode_gps(&option.payload)?;
                    next.gps = Some(GpsFix {
                        latitude: gps.latitude,
                        longitude: gps.longitude,
                        heading_deg: gps.heading_deg,
                        plugged: gps.plugged,
                        valid: gps.data_available,
                        satellites: gps.satellites,
                    });
                }
                _ => {}
            }
        }

        Ok(next)
    }

    pub fn is_flying(&self) -> bool {
        self.status & state::FLY != 0
    }

    pub fn on_ground(&self) -> bool {
        !self.is_flying()
    }

    pub fn is_emergency(&self) -> bool {
        self.status & state::EMERGENCY != 0
    }

    /// Highest priority condition, low battery included
    pub fn error_kind(&self) -> Option<DroneError> {
        ERROR_PRIORITY
            .iter()
            .find(|(mask, _)| self.status & mask != 0)
            .map(|(_, kind)| *kind)
    }

    /// A condition that prevents normal flight; low battery alone is not one
    pub fn has_error(&self) -> bool {
        matches!(self.error_kind(), Some(kind) if kind != DroneError::BatteryLow)
    }

    /// USB key present with room to record
    pub fn has_usb_key(&self) -> bool {
        match self.usb {
            Some(usb) => {
                self.status & state::USB != 0
                    && usb.freespace_kb > USB_MIN_FREESPACE_KB
                    && usb.remaining_s > USB_MIN_REMAINING_S
            }
            None => false,
        }
    }

    /// GPS receiver plugged in
    pub fn has_gps(&self) -> bool {
        self.gps.map(|g| g.plugged).unwrap_or(false)
    }

    /// Major control state (landed, flying, hovering, ...)
    pub fn control_state(&self) -> u32 {
        self.ctrl_state >> 16
    }

    /// Yaw mapped to 0..360
    pub fn yaw_360(&self) -> f32 {
        if self.yaw_deg < 0.0 {
            self.yaw_deg + 360.0
        } else {
            self.yaw_deg
        }
    }

    /// Horizontal speed in m/s
    pub fn horizontal_speed(&self) -> f32 {
        self.velocity.x.hypot(self.velocity.y)
    }
}

/// Receive loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySettings {
    /// Pause between iterations
    pub poll_interval: Duration,
    /// Longest wait for one packet
    pub receive_timeout: Duration,
    /// Consecutive decode failures that raise a warning
    pub failure_warn_threshold: u32,
    /// Bound for joining the receive loop
    pub join_timeout: Duration,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            receive_timeout: Duration::from_millis(500),
            failure_warn_threshold: 3,
            join_timeout: Duration::from_millis(2500),
        }
    }
}

struct TelemetryShared {
    endpoint: PeerEndpoint,
    settings: TelemetrySettings,
    profile: PeerProfile,
    clock: SharedClock,
    health: ChannelHealth,
    state: watch::Sender<TelemetryState>,
}

impl TelemetryShared {
    /// Decode and publish one datagram
    fn accept_packet(&self, bytes: &[u8]) -> Result<()> {
        let packet = decode_telemetry_packet(bytes)?;
        let now = self.clock.now_ms();
        let next = self.state.borrow().merge_packet(&packet, self.profile.decodes_gps(), now)?;
        self.state.send_replace(next);
        self.health.mark_update(now);
        Ok(())
    }
}

/// Navdata receiver
pub struct TelemetryChannel {
    shared: Arc<TelemetryShared>,
    commands: Arc<CommandChannel>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for TelemetryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryChannel")
            .field("endpoint", &self.shared.endpoint)
            .finish_non_exhaustive()
    }
}

impl TelemetryChannel {
    /// Create a closed channel
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Peer telemetry port
    /// * `settings` - Receive loop timing
    /// * `profile` - Decides the option mask and whether option 27 is GPS
    /// * `commands` - Used to configure the navdata stream on init
    /// * `clock` - Shared monotonic clock
    pub fn new(
        endpoint: PeerEndpoint,
        settings: TelemetrySettings,
        profile: PeerProfile,
        commands: Arc<CommandChannel>,
        clock: SharedClock,
    ) -> Self {
        let (state, _) = watch::channel(TelemetryState::default());
        let shared = TelemetryShared {
            endpoint,
            settings,
            profile,
            clock,
            health: ChannelHealth::new(ChannelKind::Telemetry),
            state,
        };
        Self { shared: Arc::new(shared), commands, worker: Mutex::new(None) }
    }

    /// Copy of the latest state
    pub fn snapshot(&self) -> TelemetryState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every accepted packet
    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.shared.state.subscribe()
    }

    /// Ask the peer for demo navdata and the options this crate decodes
    async fn configure_stream(&self) -> Result<()> {
        self.commands.send_config("general:navdata_demo", "TRUE").await?;
        if self.shared.profile.is_v2() {
            self.commands
                .send_config("general:navdata_options", &NAVDATA_OPTIONS_V2.to_string())
                .await?;
        }
        self.commands.send(&AtCommand::Ctrl { mode: 0 }).await?;
        Ok(())
    }
}

async fn run_telemetry(shared: Arc<TelemetryShared>, socket: UdpSocket, cancel: CancellationToken) {
    let mut buf = vec![0u8; NAVDATA_BUFFER_SIZE];
    let mut failures: u32 = 0;

    loop {
        if let Err(e) = socket.send(&STREAM_TRIGGER).await {
            error!("Telemetry trigger failed: {}", e);
            shared.health.flag_restart();
            break;
        }

        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = tokio::time::timeout(shared.settings.receive_timeout, socket.recv(&mut buf)) => r,
        };

        match received {
            Err(_) => debug!("No navdata within {:?}", shared.settings.receive_timeout),
            Ok(Err(e)) => {
                error!("Telemetry receive failed: {}", e);
                shared.health.flag_restart();
                break;
            }
            Ok(Ok(n)) => match shared.accept_packet(&buf[..n]) {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    if failures >= shared.settings.failure_warn_threshold {
                        warn!("{} consecutive bad navdata packets, last: {}", failures, e);
                    } else {
                        debug!("Discarding navdata packet: {}", e);
                    }
                }
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.settings.poll_interval) => {}
        }
    }
}

#[async_trait]
impl Supervised for TelemetryChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telemetry
    }

    fn health(&self) -> &ChannelHealth {
        &self.shared.health
    }

    async fn init(&self) -> Result<()> {
        let socket = open_udp(&self.shared.endpoint).await?;
        socket.send(&STREAM_TRIGGER).await?;
        self.configure_stream().await?;

        self.shared.health.mark_started(self.shared.clock.now_ms());
        let shared = Arc::clone(&self.shared);
        let worker = Worker::spawn("telemetry", move |cancel| run_telemetry(shared, socket, cancel));
        if let Some(previous) = self.worker.lock().await.replace(worker) {
            previous.stop(self.shared.settings.join_timeout).await;
        }

        info!("Telemetry channel open to {}", self.shared.endpoint.remote());
        Ok(())
    }

    async fn finalize(&self) {
        self.shared.health.mark_stopped();
        if let Some(worker) = self.worker.lock().await.take() {
            worker.stop(self.shared.settings.join_timeout).await;
        }
        info!("Telemetry channel closed");
    }
}
