//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! configuration for a stock peer at `192.168.1.1`.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::autopilot::AutoPilotSettings;
use crate::channel::command::CommandSettings;
use crate::channel::telemetry::TelemetrySettings;
use crate::channel::video::{VideoSettings, VideoTransport};
use crate::error::{DroneLinkError, Result};
use crate::protocol::constants::{
    COMMAND_PORT, CONFIG_PORT, DEFAULT_PEER_ADDRESS, TELEMETRY_PORT, VERSION_PORT, VIDEO_PORT,
};
use crate::session::VideoCodec;
use crate::supervisor::SupervisorSettings;
use crate::version::{FirmwareVersion, PeerProfile};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub autopilot: AutoPilotConfig,
    #[serde(default)]
    pub flight: FlightConfig,
    #[serde(default)]
    pub flight_log: FlightLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Peer address and handshake
#[derive(Debug, Deserialize, Clone)]
pub struct PeerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    /// `"auto"` queries the version port, anything else is parsed as `M.m.r`
    #[serde(default = "default_firmware")]
    pub firmware: String,

    /// Bind local UDP ports to the remote port numbers
    #[serde(default = "default_bind_local_ports")]
    pub bind_local_ports: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub ports: PortsConfig,
}

/// Well-known peer ports
#[derive(Debug, Deserialize, Clone)]
pub struct PortsConfig {
    #[serde(default = "default_version_port")]
    pub version: u16,

    #[serde(default = "default_telemetry_port")]
    pub telemetry: u16,

    #[serde(default = "default_video_port")]
    pub video: u16,

    #[serde(default = "default_command_port")]
    pub command: u16,

    #[serde(default = "default_config_port")]
    pub config: u16,
}

/// Command channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    #[serde(default = "default_keepalive_check_ms")]
    pub keepalive_check_ms: u64,
}

/// Telemetry channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_telemetry_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    #[serde(default = "default_failure_warn_threshold")]
    pub failure_warn_threshold: u32,
}

/// Video channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    #[serde(default = "default_video_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub transport: VideoTransportChoice,

    /// Applied on open for version 2 peers
    #[serde(default)]
    pub codec: Option<VideoCodec>,

    #[serde(default = "default_video_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Accepted `[width, height]` pairs; empty means the transport defaults
    #[serde(default)]
    pub resolutions: Vec<[u32; 2]>,
}

/// Configured video transport
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoTransportChoice {
    /// Follow the peer's firmware
    #[default]
    Auto,
    Tcp,
    Udp,
}

/// Supervisor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,

    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

/// Return-to-home configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AutoPilotConfig {
    #[serde(default = "default_vertical_speed")]
    pub vertical_speed: f64,

    #[serde(default = "default_descent_altitude_m")]
    pub descent_altitude_m: f64,

    #[serde(default = "default_altitude_margin_m")]
    pub altitude_margin_m: f64,

    #[serde(default = "default_max_heading_error_deg")]
    pub max_heading_error_deg: f64,

    #[serde(default = "default_max_rotation")]
    pub max_rotation: f64,
}

/// Flight controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FlightConfig {
    /// Altitude limit in metres; above 100 means unlimited
    #[serde(default = "default_max_altitude_m")]
    pub max_altitude_m: u32,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Flight recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FlightLogConfig {
    #[serde(default = "default_flight_log_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily rolling log file here
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_address() -> String { DEFAULT_PEER_ADDRESS.to_string() }
fn default_firmware() -> String { "auto".to_string() }
fn default_bind_local_ports() -> bool { true }
fn default_connect_timeout_ms() -> u64 { 2000 }

fn default_version_port() -> u16 { VERSION_PORT }
fn default_telemetry_port() -> u16 { TELEMETRY_PORT }
fn default_video_port() -> u16 { VIDEO_PORT }
fn default_command_port() -> u16 { COMMAND_PORT }
fn default_config_port() -> u16 { CONFIG_PORT }

fn default_keepalive_interval_ms() -> u64 { 200 }
fn default_keepalive_check_ms() -> u64 { 30 }

fn default_poll_interval_ms() -> u64 { 50 }
fn default_telemetry_receive_timeout_ms() -> u64 { 500 }
fn default_failure_warn_threshold() -> u32 { 3 }

fn default_video_enabled() -> bool { true }
fn default_video_receive_timeout_ms() -> u64 { 1000 }

fn default_supervisor_poll_interval_ms() -> u64 { 100 }
fn default_stall_threshold_ms() -> u64 { 3000 }
fn default_join_timeout_ms() -> u64 { 2500 }

fn default_vertical_speed() -> f64 { 0.25 }
fn default_descent_altitude_m() -> f64 { 3.0 }
fn default_altitude_margin_m() -> f64 { 1.5 }
fn default_max_heading_error_deg() -> f64 { 25.0 }
fn default_max_rotation() -> f64 { 0.5 }

fn default_max_altitude_m() -> u32 { 3 }
fn default_tick_interval_ms() -> u64 { 30 }

fn default_flight_log_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }

fn default_log_level() -> String { "info".to_string() }

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            firmware: default_firmware(),
            bind_local_ports: default_bind_local_ports(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ports: PortsConfig::default(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            version: default_version_port(),
            telemetry: default_telemetry_port(),
            video: default_video_port(),
            command: default_command_port(),
            config: default_config_port(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_check_ms: default_keepalive_check_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            receive_timeout_ms: default_telemetry_receive_timeout_ms(),
            failure_warn_threshold: default_failure_warn_threshold(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: default_video_enabled(),
            transport: VideoTransportChoice::default(),
            codec: None,
            receive_timeout_ms: default_video_receive_timeout_ms(),
            resolutions: Vec::new(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_supervisor_poll_interval_ms(),
            stall_threshold_ms: default_stall_threshold_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl Default for AutoPilotConfig {
    fn default() -> Self {
        Self {
            vertical_speed: default_vertical_speed(),
            descent_altitude_m: default_descent_altitude_m(),
            altitude_margin_m: default_altitude_margin_m(),
            max_heading_error_deg: default_max_heading_error_deg(),
            max_rotation: default_max_rotation(),
        }
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            max_altitude_m: default_max_altitude_m(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for FlightLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_flight_log_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), dir: None }
    }
}

fn invalid(message: impl std::fmt::Display) -> DroneLinkError {
    DroneLinkError::Config(toml::de::Error::custom(message))
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use drone_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.peer.address.trim().is_empty() {
            return Err(invalid("peer address cannot be empty"));
        }
        self.firmware_override()?;

        let ports = &self.peer.ports;
        let all_ports = [ports.version, ports.telemetry, ports.video, ports.command, ports.config];
        if all_ports.contains(&0) {
            return Err(invalid("peer ports must be non-zero"));
        }

        // Timing fields
        check_range("connect_timeout_ms", self.peer.connect_timeout_ms, 1, 60000)?;
        check_range("keepalive_interval_ms", self.command.keepalive_interval_ms, 1, 10000)?;
        check_range("keepalive_check_ms", self.command.keepalive_check_ms, 1, 10000)?;
        check_range("telemetry poll_interval_ms", self.telemetry.poll_interval_ms, 1, 10000)?;
        check_range("telemetry receive_timeout_ms", self.telemetry.receive_timeout_ms, 1, 10000)?;
        check_range("video receive_timeout_ms", self.video.receive_timeout_ms, 1, 10000)?;
        check_range("supervisor poll_interval_ms", self.supervisor.poll_interval_ms, 1, 10000)?;
        check_range("stall_threshold_ms", self.supervisor.stall_threshold_ms, 1, 60000)?;
        check_range("join_timeout_ms", self.supervisor.join_timeout_ms, 1, 60000)?;
        check_range("tick_interval_ms", self.flight.tick_interval_ms, 1, 1000)?;
        check_range("log_interval_ms", self.flight_log.log_interval_ms, 1, 60000)?;

        if self.command.keepalive_check_ms > self.command.keepalive_interval_ms {
            return Err(invalid("keepalive_check_ms must not exceed keepalive_interval_ms"));
        }

        if self.supervisor.stall_threshold_ms <= self.supervisor.poll_interval_ms {
            return Err(invalid("stall_threshold_ms must be greater than supervisor poll_interval_ms"));
        }

        if self.telemetry.failure_warn_threshold == 0 {
            return Err(invalid("failure_warn_threshold must be greater than 0"));
        }

        // Video
        for [width, height] in &self.video.resolutions {
            if *width == 0 || *height == 0 || *width > 4096 || *height > 4096 {
                return Err(invalid(format!("video resolution {}x{} is out of range", width, height)));
            }
        }

        // Autopilot
        let pilot = &self.autopilot;
        if pilot.vertical_speed <= 0.0 || pilot.vertical_speed > 1.0 {
            return Err(invalid("vertical_speed must be in (0.0, 1.0]"));
        }
        if pilot.max_rotation <= 0.0 || pilot.max_rotation > 1.0 {
            return Err(invalid("max_rotation must be in (0.0, 1.0]"));
        }
        if pilot.max_heading_error_deg <= 0.0 || pilot.max_heading_error_deg >= 180.0 {
            return Err(invalid("max_heading_error_deg must be in (0, 180)"));
        }
        if pilot.descent_altitude_m < 0.0 || pilot.altitude_margin_m < 0.0 {
            return Err(invalid("autopilot altitudes cannot be negative"));
        }

        if self.flight.max_altitude_m == 0 {
            return Err(invalid("max_altitude_m must be greater than 0"));
        }

        // Flight recorder
        if self.flight_log.enabled && self.flight_log.log_dir.is_empty() {
            return Err(invalid("flight_log log_dir cannot be empty when enabled"));
        }
        if self.flight_log.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }
        if self.flight_log.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }

    /// Firmware forced by configuration, `None` when it must be queried
    pub fn firmware_override(&self) -> Result<Option<FirmwareVersion>> {
        match self.peer.firmware.trim() {
            "auto" | "" => Ok(None),
            text => text
                .parse()
                .map(Some)
                .map_err(|_| invalid(format!("firmware must be 'auto' or M.m.r, got {:?}", text))),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.peer.connect_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.supervisor.join_timeout_ms)
    }

    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            keepalive_interval: Duration::from_millis(self.command.keepalive_interval_ms),
            keepalive_check: Duration::from_millis(self.command.keepalive_check_ms),
            join_timeout: self.join_timeout(),
        }
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            poll_interval: Duration::from_millis(self.telemetry.poll_interval_ms),
            receive_timeout: Duration::from_millis(self.telemetry.receive_timeout_ms),
            failure_warn_threshold: self.telemetry.failure_warn_threshold,
            join_timeout: self.join_timeout(),
        }
    }

    /// Transport to use for a peer
    pub fn video_transport(&self, profile: &PeerProfile) -> VideoTransport {
        match self.video.transport {
            VideoTransportChoice::Tcp => VideoTransport::TcpPave,
            VideoTransportChoice::Udp => VideoTransport::UdpUvlc,
            VideoTransportChoice::Auto => profile.video_transport(),
        }
    }

    pub fn video_settings(&self, transport: VideoTransport) -> VideoSettings {
        let resolutions = if self.video.resolutions.is_empty() {
            transport.default_resolutions()
        } else {
            self.video.resolutions.iter().map(|[w, h]| (*w, *h)).collect()
        };
        VideoSettings {
            transport,
            resolutions,
            receive_timeout: Duration::from_millis(self.video.receive_timeout_ms),
            connect_timeout: self.connect_timeout(),
            join_timeout: self.join_timeout(),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            poll_interval: Duration::from_millis(self.supervisor.poll_interval_ms),
            stall_threshold: Duration::from_millis(self.supervisor.stall_threshold_ms),
            join_timeout: self.join_timeout(),
        }
    }

    pub fn autopilot_settings(&self) -> AutoPilotSettings {
        AutoPilotSettings {
            vertical_speed: self.autopilot.vertical_speed,
            descent_altitude_m: self.autopilot.descent_altitude_m,
            altitude_margin_m: self.autopilot.altitude_margin_m,
            max_heading_error_deg: self.autopilot.max_heading_error_deg,
            max_rotation: self.autopilot.max_rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.peer.ports.command, 5556);
        assert_eq!(config.supervisor.stall_threshold_ms, 3000);
        assert_eq!(config.autopilot_settings(), AutoPilotSettings::default());
    }

    #[test]
    fn test_empty_file_matches_default() {
        let parsed = Config::parse("").unwrap();
        let default = Config::default();
        assert_eq!(parsed.peer.address, default.peer.address);
        assert_eq!(parsed.telemetry.poll_interval_ms, default.telemetry.poll_interval_ms);
        assert_eq!(parsed.flight_log.max_files_to_keep, default.flight_log.max_files_to_keep);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[peer]
address = "10.0.0.7"
firmware = "2.4.8"
bind_local_ports = false

[peer.ports]
command = 6556

[video]
transport = "tcp"
codec = "h264_720p"
resolutions = [[1280, 720]]

[supervisor]
stall_threshold_ms = 1500
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.peer.address, "10.0.0.7");
        assert_eq!(config.peer.ports.command, 6556);
        assert_eq!(config.peer.ports.telemetry, 5554);
        assert_eq!(config.firmware_override().unwrap(), Some(FirmwareVersion::new(2, 4, 8)));
        assert_eq!(config.video.codec, Some(VideoCodec::Hd720));
        assert_eq!(config.video_settings(VideoTransport::TcpPave).resolutions, vec![(1280, 720)]);
        assert_eq!(config.supervisor_settings().stall_threshold, Duration::from_millis(1500));
    }

    #[test]
    fn test_invalid_address() {
        let mut config = create_valid_config();
        config.peer.address = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_firmware() {
        let mut config = create_valid_config();
        config.peer.firmware = "two".to_string();
        assert!(config.validate().is_err());

        config.peer.firmware = "auto".to_string();
        assert_eq!(config.firmware_override().unwrap(), None);
    }

    #[test]
    fn test_invalid_timeouts() {
        let mut config = create_valid_config();
        config.telemetry.receive_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.supervisor.join_timeout_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stall_threshold_must_exceed_poll() {
        let mut config = create_valid_config();
        config.supervisor.stall_threshold_ms = 100;
        config.supervisor.poll_interval_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keepalive_check_within_interval() {
        let mut config = create_valid_config();
        config.command.keepalive_check_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_video_transport() {
        let result = Config::parse("[video]\ntransport = \"rtsp\"\n");
        assert!(matches!(result, Err(DroneLinkError::Config(_))), "Unknown transport must be rejected");

        let config = Config::parse("[video]\ntransport = \"udp\"\n").unwrap();
        assert_eq!(config.video.transport, VideoTransportChoice::Udp);
    }

    #[test]
    fn test_invalid_resolution() {
        let mut config = create_valid_config();
        config.video.resolutions = vec![[0, 360]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_autopilot_values() {
        let mut config = create_valid_config();
        config.autopilot.max_rotation = 1.5;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.autopilot.max_heading_error_deg = 0.0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.autopilot.vertical_speed = -0.25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_flight_log_limits() {
        let mut config = create_valid_config();
        config.flight_log.max_records_per_file = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.flight_log.max_files_to_keep = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.flight_log.enabled = true;
        config.flight_log.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flight_log_section() {
        let config = Config::parse(
            r#"
            [flight_log]
            enabled = true
            log_dir = "/var/log/drone-link"
            max_records_per_file = 500
        "#,
        )
        .unwrap();

        assert!(config.flight_log.enabled);
        assert_eq!(config.flight_log.log_dir, "/var/log/drone-link");
        assert_eq!(config.flight_log.max_records_per_file, 500);
        assert_eq!(config.flight_log.max_files_to_keep, 10);
        assert_eq!(config.flight_log.log_interval_ms, 100);
    }

    #[test]
    fn test_video_transport_choice() {
        let v1 = PeerProfile::new(FirmwareVersion::new(1, 11, 5));
        let v2 = PeerProfile::new(FirmwareVersion::new(2, 4, 8));

        let mut config = create_valid_config();
        assert_eq!(config.video_transport(&v1), VideoTransport::UdpUvlc);
        assert_eq!(config.video_transport(&v2), VideoTransport::TcpPave);

        config.video.transport = VideoTransportChoice::Udp;
        assert_eq!(config.video_transport(&v2), VideoTransport::UdpUvlc);
    }

    #[test]
    fn test_default_resolutions_follow_transport() {
        let config = create_valid_config();
        let settings = config.video_settings(VideoTransport::UdpUvlc);
        assert_eq!(settings.resolutions, VideoTransport::UdpUvlc.default_resolutions());
        assert_eq!(settings.join_timeout, Duration::from_millis(2500));
    }
}
