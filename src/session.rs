//! # Session
//!
//! Owns the connection to one peer: queries its firmware, opens the command,
//! telemetry and video channels in that order, starts the supervisor, and
//! tears everything down in reverse on close.
//!
//! Also carries the high-level drone commands (take-off, trim, camera and
//! codec selection...) built on top of the command channel.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::channel::command::CommandChannel;
use crate::channel::telemetry::{TelemetryChannel, TelemetryState};
use crate::channel::video::{Frame, FrameDecoder, VideoChannel};
use crate::channel::{ChannelKind, HealthSnapshot, PeerEndpoint, Supervised};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::Result;
use crate::peer_config::{self, ConfigDump};
use crate::protocol::command::{AtCommand, CommandArg};
use crate::supervisor::Supervisor;
use crate::version::{query_version, PeerProfile};

/// Wait after opening for the first telemetry to arrive
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between the codec write and reopening the stream
const CODEC_SWITCH_DELAY: Duration = Duration::from_millis(100);

/// Altitude limit the peer treats as unlimited, in metres
pub const UNLIMITED_ALTITUDE_M: u32 = 100;

/// H.264 stream settings of version 2 peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    #[serde(rename = "h264_360p")]
    Sd360,
    #[serde(rename = "h264_720p")]
    Hd720,
}

impl VideoCodec {
    /// Value of the `video:video_codec` key
    pub fn config_value(&self) -> u32 {
        match self {
            VideoCodec::Sd360 => 0x81,
            VideoCodec::Hd720 => 0x83,
        }
    }
}

/// Altitude limit in millimetres as written to `control:altitude_max`
pub fn altitude_limit_mm(metres: u32) -> u32 {
    if metres > UNLIMITED_ALTITUDE_M {
        UNLIMITED_ALTITUDE_M * 1000
    } else {
        metres * 1000
    }
}

/// Open connection to one peer
pub struct Session {
    config: Config,
    profile: PeerProfile,
    commands: Arc<CommandChannel>,
    telemetry: Arc<TelemetryChannel>,
    video: Option<Arc<VideoChannel>>,
    supervisor: Arc<Supervisor>,
    closed: Mutex<bool>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.config.peer.address)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect to the peer named in `config`
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `decoder` - Video decoder; `None` leaves the video channel closed
    /// * `clock` - Monotonic clock shared by every channel
    ///
    /// # Errors
    ///
    /// Returns error if the firmware cannot be determined or any channel
    /// fails to open. Channels opened before the failure are closed again.
    pub async fn open(config: &Config, decoder: Option<Box<dyn FrameDecoder>>, clock: SharedClock) -> Result<Self> {
        let peer = &config.peer;
        info!("Opening session to {}", peer.address);

        let firmware = match config.firmware_override()? {
            Some(firmware) => {
                info!("Using configured firmware version {}", firmware);
                firmware
            }
            None => query_version(&peer.address, peer.ports.version, config.connect_timeout()).await?,
        };
        let profile = PeerProfile::new(firmware);

        let endpoint = |port| PeerEndpoint::new(peer.address.clone(), port, peer.bind_local_ports);

        let commands = Arc::new(CommandChannel::new(
            endpoint(peer.ports.command),
            config.command_settings(),
            profile.uses_multiconfig(),
            clock.clone(),
        ));
        commands.init().await?;

        let telemetry = Arc::new(TelemetryChannel::new(
            endpoint(peer.ports.telemetry),
            config.telemetry_settings(),
            profile,
            Arc::clone(&commands),
            clock.clone(),
        ));
        if let Err(e) = telemetry.init().await {
            commands.finalize().await;
            return Err(e);
        }

        let video = match (config.video.enabled, decoder) {
            (true, Some(decoder)) => {
                if let (true, Some(codec)) = (profile.is_v2(), config.video.codec) {
                    let value = codec.config_value().to_string();
                    if let Err(e) = commands.send_config("video:video_codec", &value).await {
                        warn!("Could not select video codec {:?}: {}", codec, e);
                    }
                }
                let transport = config.video_transport(&profile);
                let video = Arc::new(VideoChannel::new(
                    endpoint(peer.ports.video),
                    config.video_settings(transport),
                    decoder,
                    clock.clone(),
                ));
                if let Err(e) = video.init().await {
                    telemetry.finalize().await;
                    commands.finalize().await;
                    return Err(e);
                }
                Some(video)
            }
            (true, None) => {
                warn!("No video decoder supplied, video channel stays closed");
                None
            }
            (false, _) => None,
        };

        let mut watched: Vec<Arc<dyn Supervised>> = vec![
            commands.clone() as Arc<dyn Supervised>,
            telemetry.clone() as Arc<dyn Supervised>,
        ];
        if let Some(video) = &video {
            watched.push(video.clone() as Arc<dyn Supervised>);
        }
        let supervisor = Arc::new(Supervisor::new(watched, config.supervisor_settings(), clock));
        supervisor.start().await;

        let session = Self {
            config: config.clone(),
            profile,
            commands,
            telemetry,
            video,
            supervisor,
            closed: Mutex::new(false),
        };

        tokio::time::sleep(SETTLE_DELAY).await;
        let settled = async {
            session.commands.send(&AtCommand::ComWdg).await?;
            session.reset_emergency().await
        };
        if let Err(e) = settled.await {
            session.close().await;
            return Err(e);
        }

        info!("Session to {} open (firmware {})", session.config.peer.address, firmware);
        Ok(session)
    }

    /// Land if flying, then stop the supervisor and every channel
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let mut closed = self.closed.lock().await;
        if *closed {
            return;
        }

        if !self.snapshot().on_ground() {
            info!("Drone flying, landing before close");
            if let Err(e) = self.land().await {
                error!("Landing on close failed: {}", e);
            }
        }

        self.supervisor.stop().await;
        if let Some(video) = &self.video {
            video.finalize().await;
        }
        self.telemetry.finalize().await;
        self.commands.finalize().await;

        *closed = true;
        info!("Session to {} closed", self.config.peer.address);
    }

    pub fn profile(&self) -> &PeerProfile {
        &self.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn commands(&self) -> &Arc<CommandChannel> {
        &self.commands
    }

    pub fn telemetry(&self) -> &Arc<TelemetryChannel> {
        &self.telemetry
    }

    pub fn video(&self) -> Option<&Arc<VideoChannel>> {
        self.video.as_ref()
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Copy of the latest telemetry
    pub fn snapshot(&self) -> TelemetryState {
        self.telemetry.snapshot()
    }

    /// Latest decoded video frame
    pub fn latest_frame(&self) -> Option<Frame> {
        self.video.as_ref().and_then(|video| video.latest_frame())
    }

    /// Health of every open channel
    pub fn health(&self) -> Vec<(ChannelKind, HealthSnapshot)> {
        let mut report = vec![
            (ChannelKind::Command, self.commands.health().snapshot()),
            (ChannelKind::Telemetry, self.telemetry.health().snapshot()),
        ];
        if let Some(video) = &self.video {
            report.push((ChannelKind::Video, video.health().snapshot()));
        }
        report
    }

    /// Send a raw command frame
    pub async fn send(&self, verb: &str, args: &[CommandArg]) -> Result<u32> {
        self.commands.send_raw(verb, args).await
    }

    pub async fn takeoff(&self) -> Result<u32> {
        info!("Take-off");
        self.commands.send(&AtCommand::takeoff()).await
    }

    pub async fn land(&self) -> Result<u32> {
        info!("Landing");
        self.commands.send(&AtCommand::landing()).await
    }

    /// Toggle the emergency state (cuts the motors when flying)
    pub async fn emergency(&self) -> Result<u32> {
        warn!("Emergency toggled");
        self.commands.send(&AtCommand::emergency()).await
    }

    /// Clear the emergency state if the peer reports it
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `true` if a reset was sent
    pub async fn reset_emergency(&self) -> Result<bool> {
        if !self.snapshot().is_emergency() {
            return Ok(false);
        }
        info!("Peer in emergency state, resetting");
        self.commands.send(&AtCommand::emergency()).await?;
        Ok(true)
    }

    pub async fn hover(&self) -> Result<u32> {
        self.commands.send(&AtCommand::hover()).await
    }

    /// Flat trim; only sent while on the ground
    pub async fn trim(&self) -> Result<bool> {
        if !self.snapshot().on_ground() {
            warn!("Trim ignored while flying");
            return Ok(false);
        }
        self.commands.send(&AtCommand::Ftrim).await?;
        Ok(true)
    }

    /// Magnetometer calibration; only sent while flying
    pub async fn calibrate(&self, device: i32) -> Result<bool> {
        if self.snapshot().on_ground() {
            warn!("Calibration ignored on the ground");
            return Ok(false);
        }
        self.commands.send(&AtCommand::Calib { device }).await?;
        Ok(true)
    }

    /// Progressive move from stick-style inputs
    ///
    /// Forward is positive; the peer expects a negative pitch for forward.
    pub async fn move_custom(&self, side: f32, forward: f32, vertical: f32, turn: f32) -> Result<u32> {
        let command = AtCommand::Pcmd { roll: side, pitch: -forward, gaz: vertical, yaw: turn };
        self.commands.send(&command).await
    }

    /// Select the front (0) or bottom (1) camera
    pub async fn set_camera(&self, channel: u32) -> Result<u32> {
        let channels = if self.profile.is_v2() { 2 } else { 4 };
        let value = channel % channels;
        info!("Camera channel {}", value);
        self.commands.send_config("video:video_channel", &value.to_string()).await
    }

    /// Altitude limit in metres; above 100 m lifts the limit
    pub async fn set_max_altitude(&self, metres: u32) -> Result<u32> {
        let millimetres = altitude_limit_mm(metres);
        info!("Max altitude {} m ({} mm)", millimetres / 1000, millimetres);
        self.commands.send_config("control:altitude_max", &millimetres.to_string()).await
    }

    /// Switch the H.264 stream settings
    ///
    /// The video channel is closed around the change. If it cannot be
    /// reopened it is left for the supervisor to restart.
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `false` when the peer has no selectable codec
    pub async fn set_video_codec(&self, codec: VideoCodec) -> Result<bool> {
        if !self.profile.is_v2() {
            return Ok(false);
        }

        if let Some(video) = &self.video {
            video.finalize().await;
        }
        let sent = self
            .commands
            .send_config("video:video_codec", &codec.config_value().to_string())
            .await;
        tokio::time::sleep(CODEC_SWITCH_DELAY).await;

        if let Some(video) = &self.video {
            if let Err(e) = video.init().await {
                error!("Video did not reopen after codec change, leaving it to the supervisor: {}", e);
                video.health().restart_failed();
            }
        }

        sent?;
        info!("Video codec set to {:?}", codec);
        Ok(true)
    }

    /// Read the peer's configuration dump
    pub async fn fetch_peer_config(&self) -> Result<ConfigDump> {
        let peer = &self.config.peer;
        peer_config::fetch(&peer.address, peer.ports.config, &self.commands, self.config.connect_timeout()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_altitude_limit_conversion() {
        assert_eq!(altitude_limit_mm(3), 3000);
        assert_eq!(altitude_limit_mm(100), 100_000);
        assert_eq!(altitude_limit_mm(250), 100_000, "Above 100 m means unlimited");
        assert_eq!(altitude_limit_mm(0), 0);
    }

    #[test]
    fn test_codec_values() {
        assert_eq!(VideoCodec::Sd360.config_value(), 0x81);
        assert_eq!(VideoCodec::Hd720.config_value(), 0x83);
    }

    #[test]
    fn test_codec_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            codec: VideoCodec,
        }
        let parsed: Wrapper = toml::from_str("codec = \"h264_360p\"").unwrap();
        assert_eq!(parsed.codec, VideoCodec::Sd360);
        assert!(toml::from_str::<Wrapper>("codec = \"mjpeg\"").is_err());
    }
}
