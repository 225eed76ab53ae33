//! # Protocol Constants
//!
//! Core definitions shared by the command, navdata and video codecs.

/// Default peer address (the drone's own access point)
pub const DEFAULT_PEER_ADDRESS: &str = "192.168.1.1";

/// Firmware version file served on the version (FTP) port
pub const VERSION_PORT: u16 = 5551;

/// Navdata (telemetry) UDP port
pub const TELEMETRY_PORT: u16 = 5554;

/// Video stream port (TCP on version 2 peers, UDP on version 1)
pub const VIDEO_PORT: u16 = 5555;

/// AT command UDP port
pub const COMMAND_PORT: u16 = 5556;

/// Configuration dump TCP port
pub const CONFIG_PORT: u16 = 5559;

/// Magic number opening every navdata packet
pub const NAVDATA_MAGIC: u32 = 0x5566_7788;

/// Navdata header size: magic, state, sequence, vision flag (4 × u32)
pub const NAVDATA_HEADER_SIZE: usize = 16;

/// Size of the tag + size prefix of every navdata option
pub const NAVDATA_OPTION_HEADER_SIZE: usize = 4;

/// One-byte trigger that (re)starts the navdata and legacy video streams
pub const STREAM_TRIGGER: [u8; 1] = [0x01];

/// Application identifiers sent with `AT*CONFIG_IDS`
pub const SESSION_ID: &str = "d2e081a3";
/// Profile identifier sent with `AT*CONFIG_IDS`
pub const PROFILE_ID: &str = "be27e2e4";
/// Application identifier sent with `AT*CONFIG_IDS`
pub const APPLICATION_ID: &str = "d87f7e0c";

/// Navdata option tags decoded into the telemetry state
pub mod tags {
    /// Demo block: control state, battery, attitude, altitude, velocity
    pub const DEMO: u16 = 0;
    /// HD video stream block: USB storage status
    pub const HDVIDEO_STREAM: u16 = 25;
    /// GPS block (firmware 2.4 and later; earlier firmware uses it for another sensor)
    pub const GPS: u16 = 27;
    /// Checksum block, always last
    pub const CHECKSUM: u16 = 0xFFFF;
}

/// Drone state bitmask carried in the navdata header
pub mod state {
    /// (1) flying, (0) landed
    pub const FLY: u32 = 1 << 0;
    /// Video enabled
    pub const VIDEO: u32 = 1 << 1;
    /// Control command acknowledged
    pub const COMMAND_ACK: u32 = 1 << 6;
    /// USB key ready
    pub const USB: u32 = 1 << 9;
    /// Only demo navdata is sent
    pub const NAVDATA_DEMO: u32 = 1 << 10;
    /// No navdata options sent (bootstrap mode)
    pub const NAVDATA_BOOTSTRAP: u32 = 1 << 11;
    /// Motors problem
    pub const MOTORS: u32 = 1 << 12;
    /// Communication lost
    pub const COM_LOST: u32 = 1 << 13;
    /// Battery too low
    pub const VBAT_LOW: u32 = 1 << 15;
    /// User emergency landing active
    pub const USER_EMERGENCY: u32 = 1 << 16;
    /// Angles out of range
    pub const ANGLES_OUT_OF_RANGE: u32 = 1 << 19;
    /// Ultrasonic sensor deaf
    pub const ULTRASOUND: u32 = 1 << 21;
    /// Cutout system detected a blocked motor
    pub const CUTOUT: u32 = 1 << 22;
    /// Communication watchdog tripped
    pub const COM_WATCHDOG: u32 = 1 << 30;
    /// Emergency landing
    pub const EMERGENCY: u32 = 1 << 31;
}

/// HD video stream state bits (USB recording)
pub mod hdvideo {
    /// Storage FIFO full
    pub const FIFO_FULL: u32 = 1 << 0;
    /// USB key present
    pub const USBKEY_PRESENT: u32 = 1 << 8;
    /// USB key recording
    pub const USBKEY_RECORDING: u32 = 1 << 9;
    /// USB key full
    pub const USBKEY_FULL: u32 = 1 << 10;
}

/// `AT*REF` base value; bits 18, 20, 22, 24 and 28 must always be set
pub const REF_BASE: u32 = 0x1154_0000;
/// `AT*REF` takeoff bit
pub const REF_TAKEOFF: u32 = 1 << 9;
/// `AT*REF` emergency toggle bit
pub const REF_EMERGENCY: u32 = 1 << 8;

/// Navdata option mask requested from version 2 peers: demo, HD video stream, GPS
pub const NAVDATA_OPTIONS_V2: u32 =
    (1 << tags::DEMO) | (1 << tags::HDVIDEO_STREAM) | (1 << tags::GPS);
