//! # AT Command Encoder
//!
//! Encodes commands into the peer's textual AT protocol.
//!
//! Every frame has the form `VERB=seq,arg1,arg2,...\r`, one frame per UDP
//! datagram. The sequence number is always the first argument. Float arguments
//! are transmitted as the signed integer sharing their IEEE-754 bit pattern.

use std::fmt;

use super::constants::*;
use crate::error::{DroneLinkError, Result};

/// Frame terminator
pub const COMMAND_TERMINATOR: char = '\r';

/// Largest command frame the peer accepts in one datagram
pub const MAX_COMMAND_LEN: usize = 1024;

/// Single argument of a command frame
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    /// Signed integer, printed in decimal
    Int(i32),
    /// Float, printed as the integer with the same bit pattern
    Float(f32),
    /// String, printed between double quotes
    Str(String),
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Int(v) => write!(f, "{}", v),
            CommandArg::Float(v) => write!(f, "{}", float_to_wire(*v)),
            CommandArg::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Reinterpret a float's bits as the signed integer sent on the wire
///
/// # Examples
///
/// ```
/// use drone_link::protocol::command::float_to_wire;
///
/// assert_eq!(float_to_wire(-0.8), -1_085_485_875);
/// assert_eq!(float_to_wire(0.0), 0);
/// ```
pub fn float_to_wire(value: f32) -> i32 {
    // -0.0 would otherwise go out as i32::MIN
    if value == 0.0 {
        return 0;
    }
    value.to_bits() as i32
}

/// Encode a command frame
///
/// # Arguments
///
/// * `sequence` - Sequence number, emitted as the first argument
/// * `verb` - Command verb including the `AT*` prefix (e.g. `AT*REF`)
/// * `args` - Remaining arguments
///
/// # Returns
///
/// * `Result<String>` - Complete frame terminated by `\r`
///
/// # Errors
///
/// Returns error if the verb is empty or contains separators, if a string
/// argument contains a quote or carriage return, or if the frame would exceed
/// [`MAX_COMMAND_LEN`].
///
/// # Examples
///
/// ```
/// use drone_link::protocol::command::{encode_command, CommandArg};
///
/// let frame = encode_command(7, "AT*REF", &[CommandArg::Int(290718208)])?;
/// assert_eq!(frame, "AT*REF=7,290718208\r");
/// # Ok::<(), drone_link::error::DroneLinkError>(())
/// ```
pub fn encode_command(sequence: u32, verb: &str, args: &[CommandArg]) -> Result<String> {
    if verb.is_empty() || verb.contains(['=', ',', '\r', '"']) {
        return Err(DroneLinkError::Protocol(format!("Invalid command verb: {:?}", verb)));
    }

    let mut frame = format!("{}={}", verb, sequence);
    for arg in args {
        if let CommandArg::Str(s) = arg {
            if s.contains(['"', '\r']) {
                return Err(DroneLinkError::Protocol(format!(
                    "Invalid string argument for {}: {:?}",
                    verb, s
                )));
            }
        }
        frame.push(',');
        frame.push_str(&arg.to_string());
    }
    frame.push(COMMAND_TERMINATOR);

    if frame.len() > MAX_COMMAND_LEN {
        return Err(DroneLinkError::Protocol(format!(
            "Command frame too long: {} bytes (max {})",
            frame.len(),
            MAX_COMMAND_LEN
        )));
    }

    Ok(frame)
}

/// Commands understood by the peer
#[derive(Debug, Clone, PartialEq)]
pub enum AtCommand {
    /// Takeoff / land / emergency toggle
    Ref { takeoff: bool, emergency: bool },
    /// Progressive move; all components in -1.0..=1.0
    Pcmd { roll: f32, pitch: f32, gaz: f32, yaw: f32 },
    /// Flat trim (on ground only)
    Ftrim,
    /// Magnetometer calibration (in flight only)
    Calib { device: i32 },
    /// Set a configuration key
    Config { key: String, value: String },
    /// Select the configuration context for the next `Config`
    ConfigIds,
    /// Reset the communication watchdog (keep-alive)
    ComWdg,
    /// Control mode request (0 = ack, 4 = get config, 5 = ack config)
    Ctrl { mode: i32 },
    /// LED animation
    Led { animation: i32, frequency: f32, duration_s: i32 },
    /// Flight animation
    Anim { animation: i32, duration_s: i32 },
}

impl AtCommand {
    /// Takeoff request
    pub fn takeoff() -> Self {
        AtCommand::Ref { takeoff: true, emergency: false }
    }

    /// Landing request
    pub fn landing() -> Self {
        AtCommand::Ref { takeoff: false, emergency: false }
    }

    /// Emergency toggle (cuts motors when flying, clears emergency when landed)
    pub fn emergency() -> Self {
        AtCommand::Ref { takeoff: false, emergency: true }
    }

    /// Hold position
    pub fn hover() -> Self {
        AtCommand::Pcmd { roll: 0.0, pitch: 0.0, gaz: 0.0, yaw: 0.0 }
    }

    /// Configuration key/value
    pub fn config(key: impl Into<String>, value: impl Into<String>) -> Self {
        AtCommand::Config { key: key.into(), value: value.into() }
    }

    /// Verb of this command
    pub fn verb(&self) -> &'static str {
        match self {
            AtCommand::Ref { .. } => "AT*REF",
            AtCommand::Pcmd { .. } => "AT*PCMD",
            AtCommand::Ftrim => "AT*FTRIM",
            AtCommand::Calib { .. } => "AT*CALIB",
            AtCommand::Config { .. } => "AT*CONFIG",
            AtCommand::ConfigIds => "AT*CONFIG_IDS",
            AtCommand::ComWdg => "AT*COMWDG",
            AtCommand::Ctrl { .. } => "AT*CTRL",
            AtCommand::Led { .. } => "AT*LED",
            AtCommand::Anim { .. } => "AT*ANIM",
        }
    }

    /// Arguments following the sequence number
    pub fn args(&self) -> Vec<CommandArg> {
        match self {
            AtCommand::Ref { takeoff, emergency } => {
                let mut value = REF_BASE;
                if *takeoff {
                    value |= REF_TAKEOFF;
                }
                if *emergency {
                    value |= REF_EMERGENCY;
                }
                vec![CommandArg::Int(value as i32)]
            }
            AtCommand::Pcmd { roll, pitch, gaz, yaw } => {
                // Mode 0 asks the peer to hover and ignore roll/pitch
                let progressive = (*roll != 0.0 || *pitch != 0.0) as i32;
                vec![
                    CommandArg::Int(progressive),
                    CommandArg::Float(roll.clamp(-1.0, 1.0)),
                    CommandArg::Float(pitch.clamp(-1.0, 1.0)),
                    CommandArg::Float(gaz.clamp(-1.0, 1.0)),
                    CommandArg::Float(yaw.clamp(-1.0, 1.0)),
                ]
            }
            AtCommand::Ftrim | AtCommand::ComWdg => Vec::new(),
            AtCommand::Calib { device } => vec![CommandArg::Int(*device)],
            AtCommand::Config { key, value } => {
                vec![CommandArg::Str(key.clone()), CommandArg::Str(value.clone())]
            }
            AtCommand::ConfigIds => vec![
                CommandArg::Str(SESSION_ID.to_string()),
                CommandArg::Str(PROFILE_ID.to_string()),
                CommandArg::Str(APPLICATION_ID.to_string()),
            ],
            AtCommand::Ctrl { mode } => vec![CommandArg::Int(*mode), CommandArg::Int(0)],
            AtCommand::Led { animation, frequency, duration_s } => vec![
                CommandArg::Int(*animation),
                CommandArg::Float(*frequency),
                CommandArg::Int(*duration_s),
            ],
            AtCommand::Anim { animation, duration_s } => {
                vec![CommandArg::Int(*animation), CommandArg::Int(*duration_s)]
            }
        }
    }

    /// Encode this command with the given sequence number
    pub fn encode(&self, sequence: u32) -> Result<String> {
        encode_command(sequence, self.verb(), &self.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_args() {
        let frame = encode_command(1, "AT*COMWDG", &[]).unwrap();
        assert_eq!(frame, "AT*COMWDG=1\r");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let args = [CommandArg::Int(1), CommandArg::Float(0.25), CommandArg::Str("x".into())];
        let a = encode_command(42, "AT*TEST", &args).unwrap();
        let b = encode_command(42, "AT*TEST", &args).unwrap();
        assert_eq!(a, b, "Same input must produce the same frame");
    }

    #[test]
    fn test_sequence_is_first_argument() {
        let frame = AtCommand::Calib { device: 0 }.encode(913).unwrap();
        assert_eq!(frame, "AT*CALIB=913,0\r");
    }

    #[test]
    fn test_encode_takeoff_landing_emergency() {
        assert_eq!(AtCommand::takeoff().encode(5).unwrap(), "AT*REF=5,290718208\r");
        assert_eq!(AtCommand::landing().encode(6).unwrap(), "AT*REF=6,290717696\r");
        assert_eq!(AtCommand::emergency().encode(7).unwrap(), "AT*REF=7,290717952\r");
    }

    #[test]
    fn test_encode_pcmd_float_bits() {
        let cmd = AtCommand::Pcmd { roll: -0.8, pitch: 0.0, gaz: 0.0, yaw: 0.0 };
        let frame = cmd.encode(10).unwrap();
        assert_eq!(frame, "AT*PCMD=10,1,-1085485875,0,0,0\r");
    }

    #[test]
    fn test_negative_zero_goes_out_as_zero() {
        assert_eq!(float_to_wire(-0.0), 0);
        let frame = AtCommand::Pcmd { roll: 0.0, pitch: -0.0, gaz: 0.0, yaw: 0.0 }.encode(1).unwrap();
        assert_eq!(frame, "AT*PCMD=1,0,0,0,0,0\r");
    }

    #[test]
    fn test_encode_hover_uses_mode_zero() {
        let frame = AtCommand::Pcmd { roll: 0.0, pitch: 0.0, gaz: 0.5, yaw: -0.1 }
            .encode(3)
            .unwrap();
        assert!(frame.starts_with("AT*PCMD=3,0,"), "Got {}", frame);
    }

    #[test]
    fn test_pcmd_components_are_clamped() {
        let args = AtCommand::Pcmd { roll: 3.0, pitch: -2.0, gaz: 0.0, yaw: 0.0 }.args();
        assert_eq!(args[1], CommandArg::Float(1.0));
        assert_eq!(args[2], CommandArg::Float(-1.0));
    }

    #[test]
    fn test_encode_config_quotes_strings() {
        let frame = AtCommand::config("control:altitude_max", "3000").encode(11).unwrap();
        assert_eq!(frame, "AT*CONFIG=11,\"control:altitude_max\",\"3000\"\r");
    }

    #[test]
    fn test_encode_config_ids() {
        let frame = AtCommand::ConfigIds.encode(2).unwrap();
        assert_eq!(frame, "AT*CONFIG_IDS=2,\"d2e081a3\",\"be27e2e4\",\"d87f7e0c\"\r");
    }

    #[test]
    fn test_encode_ctrl() {
        assert_eq!(AtCommand::Ctrl { mode: 0 }.encode(4).unwrap(), "AT*CTRL=4,0,0\r");
    }

    #[test]
    fn test_invalid_verb_rejected() {
        assert!(encode_command(1, "", &[]).is_err());
        assert!(encode_command(1, "AT*REF=1", &[]).is_err());
        assert!(encode_command(1, "AT,REF", &[]).is_err());
    }

    #[test]
    fn test_string_with_quote_rejected() {
        let result = encode_command(1, "AT*CONFIG", &[CommandArg::Str("a\"b".into())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let long = "x".repeat(MAX_COMMAND_LEN);
        let result = encode_command(1, "AT*CONFIG", &[CommandArg::Str(long)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_float_to_wire() {
        assert_eq!(float_to_wire(1.0), 1_065_353_216);
        assert_eq!(float_to_wire(-1.0), -1_082_130_432);
    }
}
