//! # Navdata Decoder
//!
//! Decodes telemetry (navdata) packets received on the telemetry port.
//!
//! A packet is a 16-byte little-endian header (magic, state bitmask, sequence,
//! vision flag) followed by options `{tag: u16, size: u16, payload}`. The
//! declared size counts the 4-byte tag/size prefix. Options are walked by their
//! declared size so unknown tags are skipped without being understood.
//!
//! Only a small allow-list of options is decoded into typed blocks (demo, HD
//! video stream, GPS). Unit conversion happens here: angles in degrees,
//! altitude in metres, velocities in m/s.

use super::checksum::verify_checksum;
use super::constants::*;
use crate::error::{DroneLinkError, Result};

/// Minimum demo option payload: ctrl_state, vbat, theta, phi, psi, altitude, vx, vy, vz
pub const DEMO_PAYLOAD_SIZE: usize = 36;

/// HD video stream option payload: seven u32 fields
pub const HDVIDEO_PAYLOAD_SIZE: usize = 28;

/// Minimum GPS option payload (up to and including `gps_plugged`)
pub const GPS_PAYLOAD_MIN_SIZE: usize = 196;

/// GPS option payload including time-of-week, week, fix and satellite count
pub const GPS_PAYLOAD_EXTENDED_SIZE: usize = 316;

/// Navdata packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavdataHeader {
    /// Always [`NAVDATA_MAGIC`]
    pub magic: u32,
    /// Drone state bitmask (see [`state`])
    pub state: u32,
    /// Packet sequence number
    pub sequence: u32,
    /// Vision flag
    pub vision: u32,
}

/// Raw option record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavdataOption {
    /// Option tag
    pub tag: u16,
    /// Payload without the tag/size prefix
    pub payload: Vec<u8>,
}

/// Structurally valid navdata packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavdataPacket {
    /// Packet header
    pub header: NavdataHeader,
    /// All options in wire order, unknown tags included
    pub options: Vec<NavdataOption>,
}

impl NavdataPacket {
    /// First option carrying `tag`
    pub fn option(&self, tag: u16) -> Option<&NavdataOption> {
        self.options.iter().find(|o| o.tag == tag)
    }
}

/// Decode a complete navdata packet
///
/// # Arguments
///
/// * `packet` - One UDP datagram from the telemetry port
///
/// # Returns
///
/// * `Result<NavdataPacket>` - Header and every option record
///
/// # Errors
///
/// Returns error if:
/// - Packet is shorter than the header
/// - Magic number is wrong
/// - An option header is cut off, or declares a size below 4 or beyond the buffer
/// - The checksum option does not match the preceding bytes
///
/// # Examples
///
/// ```
/// use drone_link::protocol::navdata::decode_telemetry_packet;
///
/// let mut packet = Vec::new();
/// packet.extend_from_slice(&0x5566_7788u32.to_le_bytes());
/// packet.extend_from_slice(&1u32.to_le_bytes());
/// packet.extend_from_slice(&42u32.to_le_bytes());
/// packet.extend_from_slice(&0u32.to_le_bytes());
///
/// let decoded = decode_telemetry_packet(&packet)?;
/// assert_eq!(decoded.header.sequence, 42);
/// assert!(decoded.options.is_empty());
/// # Ok::<(), drone_link::error::DroneLinkError>(())
/// ```
pub fn decode_telemetry_packet(packet: &[u8]) -> Result<NavdataPacket> {
    if packet.len() < NAVDATA_HEADER_SIZE {
        return Err(DroneLinkError::Telemetry(format!(
            "Packet too short: {} bytes (header is {})",
            packet.len(),
            NAVDATA_HEADER_SIZE
        )));
    }

    let header = NavdataHeader {
        magic: read_u32(packet, 0)?,
        state: read_u32(packet, 4)?,
        sequence: read_u32(packet, 8)?,
        vision: read_u32(packet, 12)?,
    };

    if header.magic != NAVDATA_MAGIC {
        return Err(DroneLinkError::Telemetry(format!(
            "Invalid magic: 0x{:08X}",
            header.magic
        )));
    }

    let mut options = Vec::new();
    let mut offset = NAVDATA_HEADER_SIZE;

    while offset < packet.len() {
        let remaining = packet.len() - offset;
        if remaining < NAVDATA_OPTION_HEADER_SIZE {
            return Err(DroneLinkError::Telemetry(format!(
                "Truncated option header at offset {} ({} bytes left)",
                offset, remaining
            )));
        }

        let tag = read_u16(packet, offset)?;
        let size = read_u16(packet, offset + 2)? as usize;

        if size < NAVDATA_OPTION_HEADER_SIZE || size > remaining {
            return Err(DroneLinkError::Telemetry(format!(
                "Option 0x{:04X} at offset {} declares {} bytes, {} available",
                tag, offset, size, remaining
            )));
        }

        let payload = &packet[offset + NAVDATA_OPTION_HEADER_SIZE..offset + size];

        if tag == tags::CHECKSUM {
            let received = read_u32(payload, 0)?;
            if !verify_checksum(&packet[..offset], received) {
                return Err(DroneLinkError::Telemetry(format!(
                    "Checksum mismatch in packet {}",
                    header.sequence
                )));
            }
            options.push(NavdataOption { tag, payload: payload.to_vec() });
            // Checksum is always the last option
            break;
        }

        options.push(NavdataOption { tag, payload: payload.to_vec() });
        offset += size;
    }

    Ok(NavdataPacket { header, options })
}

/// Demo block: flight state, battery, attitude, altitude and velocity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemoBlock {
    /// Control state (major state in the upper 16 bits)
    pub ctrl_state: u32,
    /// Battery charge in percent
    pub battery_percent: u32,
    /// Pitch (theta) in degrees
    pub pitch_deg: f32,
    /// Roll (phi) in degrees
    pub roll_deg: f32,
    /// Yaw (psi) in degrees, -180..180
    pub yaw_deg: f32,
    /// Altitude in metres
    pub altitude_m: f32,
    /// Forward velocity in m/s
    pub velocity_x: f32,
    /// Lateral velocity in m/s
    pub velocity_y: f32,
    /// Vertical velocity in m/s
    pub velocity_z: f32,
}

/// Decode the demo option payload
///
/// # Errors
///
/// Returns error if the payload is shorter than [`DEMO_PAYLOAD_SIZE`].
pub fn decode_demo(payload: &[u8]) -> Result<DemoBlock> {
    ensure_len("demo", payload, DEMO_PAYLOAD_SIZE)?;

    Ok(DemoBlock {
        ctrl_state: read_u32(payload, 0)?,
        battery_percent: read_u32(payload, 4)?,
        pitch_deg: read_f32(payload, 8)? / 1000.0,
        roll_deg: read_f32(payload, 12)? / 1000.0,
        yaw_deg: read_f32(payload, 16)? / 1000.0,
        altitude_m: read_i32(payload, 20)? as f32 / 1000.0,
        velocity_x: read_f32(payload, 24)? / 1000.0,
        velocity_y: read_f32(payload, 28)? / 1000.0,
        velocity_z: read_f32(payload, 32)? / 1000.0,
    })
}

/// HD video stream block: onboard USB recording status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HdVideoBlock {
    /// Recording state bits (see [`hdvideo`])
    pub state: u32,
    /// Packets queued for storage
    pub fifo_packets: u32,
    /// Storage FIFO size
    pub fifo_size: u32,
    /// USB key size in kB
    pub usbkey_size_kb: u32,
    /// USB key free space in kB
    pub usbkey_freespace_kb: u32,
    /// Last stored frame number
    pub frame_number: u32,
    /// Remaining recording time in seconds
    pub usbkey_remaining_s: u32,
}

/// Decode the HD video stream option payload
pub fn decode_hdvideo(payload: &[u8]) -> Result<HdVideoBlock> {
    ensure_len("hdvideo", payload, HDVIDEO_PAYLOAD_SIZE)?;

    Ok(HdVideoBlock {
        state: read_u32(payload, 0)?,
        fifo_packets: read_u32(payload, 4)?,
        fifo_size: read_u32(payload, 8)?,
        usbkey_size_kb: read_u32(payload, 12)?,
        usbkey_freespace_kb: read_u32(payload, 16)?,
        frame_number: read_u32(payload, 20)?,
        usbkey_remaining_s: read_u32(payload, 24)?,
    })
}

/// GPS block (flight recorder accessory, firmware 2.4+)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsBlock {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub hdop: f64,
    /// Receiver reports a usable position
    pub data_available: bool,
    pub state: u32,
    /// Ground speed
    pub speed: f32,
    /// Course over ground in degrees
    pub heading_deg: f32,
    /// Magnetic heading in degrees
    pub heading_magnetic_deg: f32,
    /// Receiver plugged into the USB port
    pub plugged: bool,
    /// Time of week in seconds (0 when not sent)
    pub time_of_week: f64,
    pub week: u16,
    pub fix: u8,
    pub satellites: u8,
}

/// Decode the GPS option payload
///
/// Older firmware sends a shorter block without timing fields; those fields
/// are left at zero.
pub fn decode_gps(payload: &[u8]) -> Result<GpsBlock> {
    ensure_len("gps", payload, GPS_PAYLOAD_MIN_SIZE)?;

    let mut gps = GpsBlock {
        latitude: read_f64(payload, 0)?,
        longitude: read_f64(payload, 8)?,
        elevation: read_f64(payload, 16)?,
        hdop: read_f64(payload, 24)?,
        data_available: read_i32(payload, 32)? != 0,
        state: read_u32(payload, 76)?,
        speed: read_f32(payload, 136)?,
        heading_deg: read_f32(payload, 144)?,
        heading_magnetic_deg: read_f32(payload, 148)?,
        plugged: read_i32(payload, 192)? != 0,
        ..GpsBlock::default()
    };

    if payload.len() >= GPS_PAYLOAD_EXTENDED_SIZE {
        gps.time_of_week = read_f64(payload, 304)?;
        gps.week = read_u16(payload, 312)?;
        gps.fix = payload[314];
        gps.satellites = payload[315];
    }

    Ok(gps)
}

fn ensure_len(block: &str, payload: &[u8], min: usize) -> Result<()> {
    if payload.len() < min {
        return Err(DroneLinkError::Telemetry(format!(
            "{} block too short: {} bytes (need {})",
            block,
            payload.len(),
            min
        )));
    }
    Ok(())
}

fn le_bytes<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    buf.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            DroneLinkError::Telemetry(format!(
                "Read of {} bytes at offset {} past end ({} bytes)",
                N,
                offset,
                buf.len()
            ))
        })
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    le_bytes(buf, offset).map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    le_bytes(buf, offset).map(u32::from_le_bytes)
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    le_bytes(buf, offset).map(i32::from_le_bytes)
}

fn read_f32(buf: &[u8], offset: usize) -> Result<f32> {
    le_bytes(buf, offset).map(f32::from_le_bytes)
}

fn read_f64(buf: &[u8], offset: usize) -> Result<f64> {
    le_bytes(buf, offset).map(f64::from_le_bytes)
}

#[cfg(test)]
pub(crate) mod test_packets {
    //! Packet builders shared by the channel tests

    use super::*;
    use crate::protocol::checksum::navdata_checksum;

    pub fn header(state: u32, sequence: u32) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&NAVDATA_MAGIC.to_le_bytes());
        packet.extend_from_slice(&state.to_le_bytes());
        packet.extend_from_slice(&sequence.to_le_bytes());
        packet.extend_from_slice(&0u32.to_le_bytes());
        packet
    }

    pub fn push_option(packet: &mut Vec<u8>, tag: u16, payload: &[u8]) {
        packet.extend_from_slice(&tag.to_le_bytes());
        packet.extend_from_slice(&((payload.len() + 4) as u16).to_le_bytes());
        packet.extend_from_slice(payload);
    }

    pub fn push_checksum(packet: &mut Vec<u8>) {
        let sum = navdata_checksum(packet);
        push_option(packet, tags::CHECKSUM, &sum.to_le_bytes());
    }

    /// Demo payload with raw wire units
    pub fn demo_payload(
        ctrl_state: u32,
        battery: u32,
        theta_mdeg: f32,
        phi_mdeg: f32,
        psi_mdeg: f32,
        altitude_mm: i32,
        vx_mm_s: f32,
        vy_mm_s: f32,
    ) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&ctrl_state.to_le_bytes());
        p.extend_from_slice(&battery.to_le_bytes());
        p.extend_from_slice(&theta_mdeg.to_le_bytes());
        p.extend_from_slice(&phi_mdeg.to_le_bytes());
        p.extend_from_slice(&psi_mdeg.to_le_bytes());
        p.extend_from_slice(&altitude_mm.to_le_bytes());
        p.extend_from_slice(&vx_mm_s.to_le_bytes());
        p.extend_from_slice(&vy_mm_s.to_le_bytes());
        p.extend_from_slice(&0f32.to_le_bytes());
        p
    }

    pub fn hdvideo_payload(state: u32, freespace_kb: u32, remaining_s: u32) -> Vec<u8> {
        let fields = [state, 0, 0, 4_000_000, freespace_kb, 0, remaining_s];
        fields.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    pub fn gps_payload(latitude: f64, longitude: f64, available: bool, heading: f32) -> Vec<u8> {
        let mut p = vec![0u8; GPS_PAYLOAD_EXTENDED_SIZE];
        p[0..8].copy_from_slice(&latitude.to_le_bytes());
        p[8..16].copy_from_slice(&longitude.to_le_bytes());
        p[32..36].copy_from_slice(&(available as i32).to_le_bytes());
        p[144..148].copy_from_slice(&heading.to_le_bytes());
        p[192..196].copy_from_slice(&1i32.to_le_bytes());
        p[314] = 3;
        p[315] = 9;
        p
    }
}
