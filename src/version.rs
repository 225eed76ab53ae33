//! # Firmware Version Handshake
//!
//! The peer serves `version.txt` over a minimal FTP service on the version
//! port. The firmware major version decides the video transport and codec,
//! and whether navdata option 27 is a GPS block.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::channel::video::VideoTransport;
use crate::error::{DroneLinkError, Result};

/// File holding the firmware version on the peer
pub const VERSION_FILE: &str = "version.txt";

/// Firmware version `major.minor.revision`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self { major, minor, revision }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

impl FromStr for FirmwareVersion {
    type Err = DroneLinkError;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

/// Parse the content of `version.txt`
///
/// Accepts `major.minor[.revision]` with surrounding whitespace.
///
/// # Examples
///
/// ```
/// use drone_link::version::{parse_version, FirmwareVersion};
///
/// assert_eq!(parse_version("2.4.8\n")?, FirmwareVersion::new(2, 4, 8));
/// # Ok::<(), drone_link::error::DroneLinkError>(())
/// ```
pub fn parse_version(text: &str) -> Result<FirmwareVersion> {
    let text = text.trim();
    let invalid = || DroneLinkError::Handshake(format!("Invalid version string: {:?}", text));

    let mut parts = text.split('.');
    let mut next = |required: bool| -> Result<u32> {
        match parts.next() {
            Some(p) => p.trim().parse().map_err(|_| invalid()),
            None if required => Err(invalid()),
            None => Ok(0),
        }
    };

    let major = next(true)?;
    let minor = next(true)?;
    let revision = next(false)?;
    Ok(FirmwareVersion { major, minor, revision })
}

/// What the session needs to know about the peer hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerProfile {
    pub firmware: FirmwareVersion,
}

impl PeerProfile {
    pub fn new(firmware: FirmwareVersion) -> Self {
        Self { firmware }
    }

    /// Second generation hardware
    pub fn is_v2(&self) -> bool {
        self.firmware.major >= 2
    }

    /// Option 27 carries the GPS block (2.4 and later)
    ///
    /// Releases after 2.4 keep the 2.4 option layout, so they are GPS capable
    /// too rather than matching 2.4 only.
    pub fn decodes_gps(&self) -> bool {
        self.firmware >= FirmwareVersion::new(2, 4, 0)
    }

    /// Config writes must be preceded by `AT*CONFIG_IDS`
    pub fn uses_multiconfig(&self) -> bool {
        self.is_v2()
    }

    /// Video transport and codec pair of this hardware
    pub fn video_transport(&self) -> VideoTransport {
        if self.is_v2() {
            VideoTransport::TcpPave
        } else {
            VideoTransport::UdpUvlc
        }
    }
}

/// Extract the data port from a `227` passive-mode reply
///
/// # Examples
///
/// ```
/// use drone_link::version::parse_pasv_reply;
///
/// let port = parse_pasv_reply("227 Entering Passive Mode (192,168,1,1,19,137)")?;
/// assert_eq!(port, 19 * 256 + 137);
/// # Ok::<(), drone_link::error::DroneLinkError>(())
/// ```
pub fn parse_pasv_reply(reply: &str) -> Result<u16> {
    let invalid = || DroneLinkError::Handshake(format!("Invalid PASV reply: {:?}", reply.trim()));

    let start = reply.find('(').ok_or_else(invalid)?;
    let end = reply[start..].find(')').ok_or_else(invalid)? + start;
    let numbers: Vec<u8> = reply[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid())?;

    if numbers.len() != 6 {
        return Err(invalid());
    }
    Ok(u16::from(numbers[4]) << 8 | u16::from(numbers[5]))
}

/// Fetch the firmware version from the peer
///
/// # Arguments
///
/// * `address` - Peer address
/// * `port` - Version (FTP) port
/// * `timeout` - Bound for the whole exchange
///
/// # Errors
///
/// Returns error if the peer cannot be reached, replies unexpectedly, or the
/// exchange exceeds `timeout`.
pub async fn query_version(address: &str, port: u16, timeout: Duration) -> Result<FirmwareVersion> {
    let endpoint = format!("{}:{}", address, port);
    let text = tokio::time::timeout(timeout, fetch_file(address, &endpoint, VERSION_FILE))
        .await
        .map_err(|_| DroneLinkError::Timeout(format!("version query on {}", endpoint)))??;

    let version = parse_version(&text)?;
    info!("Peer firmware version {}", version);
    Ok(version)
}

async fn fetch_file(address: &str, endpoint: &str, file: &str) -> Result<String> {
    let stream = TcpStream::connect(endpoint)
        .await
        .map_err(|source| DroneLinkError::Connect { endpoint: endpoint.to_string(), source })?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    expect_reply(&mut reader, &[220]).await?;

    writer.write_all(b"USER anonymous\r\n").await?;
    if expect_reply(&mut reader, &[230, 331]).await? == 331 {
        writer.write_all(b"PASS anonymous\r\n").await?;
        expect_reply(&mut reader, &[230, 202]).await?;
    }

    writer.write_all(b"TYPE I\r\n").await?;
    expect_reply(&mut reader, &[200]).await?;

    writer.write_all(b"PASV\r\n").await?;
    let (_, line) = read_reply(&mut reader).await?;
    let data_port = parse_pasv_reply(&line)?;

    // Data connection goes to the control address; the advertised host may be unroutable
    let data_endpoint = format!("{}:{}", address, data_port);
    let mut data = TcpStream::connect(&data_endpoint)
        .await
        .map_err(|source| DroneLinkError::Connect { endpoint: data_endpoint.clone(), source })?;

    writer.write_all(format!("RETR {}\r\n", file).as_bytes()).await?;
    expect_reply(&mut reader, &[125, 150]).await?;

    let mut content = String::new();
    data.read_to_string(&mut content).await?;
    debug!("Fetched {} ({} bytes)", file, content.len());

    // Transfer-complete reply is not needed
    let _ = writer.write_all(b"QUIT\r\n").await;
    Ok(content)
}

async fn read_reply<R>(reader: &mut R) -> Result<(u16, String)>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(DroneLinkError::Handshake("Connection closed by peer".to_string()));
        }
        // Multi-line replies end with "NNN " on their last line
        let bytes = line.as_bytes();
        if bytes.len() >= 4 && bytes[..3].iter().all(u8::is_ascii_digit) && bytes[3] == b' ' {
            let code = line[..3].parse().map_err(|_| {
                DroneLinkError::Handshake(format!("Invalid reply: {:?}", line.trim()))
            })?;
            return Ok((code, line));
        }
    }
}

async fn expect_reply<R>(reader: &mut R, accepted: &[u16]) -> Result<u16>
where
    R: AsyncBufReadExt + Unpin,
{
    let (code, line) = read_reply(reader).await?;
    if accepted.contains(&code) {
        Ok(code)
    } else {
        Err(DroneLinkError::Handshake(format!("Unexpected reply: {}", line.trim())))
    }
}

#[cfg(test)]
pub(crate) mod fake_ftp {
    //! Minimal FTP responder serving a single file

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Serve `content` for one RETR and return the control port
    pub async fn serve_once(content: &'static str) -> u16 {
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = control.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = control.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let data_port = data.local_addr().unwrap().port();

            writer.write_all(b"220-Welcome\r\n220 Ready\r\n").await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = if line.starts_with("USER") {
                    "331 Password required\r\n".to_string()
                } else if line.starts_with("PASS") {
                    "230 Logged in\r\n".to_string()
                } else if line.starts_with("TYPE") {
                    "200 Type set\r\n".to_string()
                } else if line.starts_with("PASV") {
                    format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                        data_port >> 8,
                        data_port & 0xFF
                    )
                } else if line.starts_with("RETR") {
                    writer.write_all(b"150 Opening data connection\r\n").await.unwrap();
                    let (mut conn, _) = data.accept().await.unwrap();
                    conn.write_all(content.as_bytes()).await.unwrap();
                    drop(conn);
                    "226 Transfer complete\r\n".to_string()
                } else {
                    "221 Bye\r\n".to_string()
                };
                if writer.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("2.4.8").unwrap(), FirmwareVersion::new(2, 4, 8));
        assert_eq!(parse_version(" 1.11.5\r\n").unwrap(), FirmwareVersion::new(1, 11, 5));
        assert_eq!(parse_version("2.1").unwrap(), FirmwareVersion::new(2, 1, 0));
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!(parse_version("").is_err());
        assert!(parse_version("2").is_err());
        assert!(parse_version("v2.4.8").is_err());
    }

    #[test]
    fn test_version_display_and_order() {
        let v = FirmwareVersion::new(2, 4, 8);
        assert_eq!(v.to_string(), "2.4.8");
        assert!(FirmwareVersion::new(2, 3, 9) < FirmwareVersion::new(2, 4, 0));
    }

    #[test]
    fn test_profile_v1() {
        let profile = PeerProfile::new(FirmwareVersion::new(1, 11, 5));
        assert!(!profile.is_v2());
        assert!(!profile.decodes_gps());
        assert!(!profile.uses_multiconfig());
        assert_eq!(profile.video_transport(), VideoTransport::UdpUvlc);
    }

    #[test]
    fn test_profile_v2() {
        let old = PeerProfile::new(FirmwareVersion::new(2, 3, 3));
        assert!(old.is_v2());
        assert!(!old.decodes_gps(), "GPS block only exists from 2.4");
        assert_eq!(old.video_transport(), VideoTransport::TcpPave);

        let gps = PeerProfile::new(FirmwareVersion::new(2, 4, 8));
        assert!(gps.decodes_gps());

        let newer = PeerProfile::new(FirmwareVersion::new(2, 5, 0));
        assert!(newer.decodes_gps(), "Later releases keep the 2.4 layout");
    }

    #[test]
    fn test_parse_pasv_reply() {
        assert_eq!(
            parse_pasv_reply("227 Entering Passive Mode (127,0,0,1,4,1)\r\n").unwrap(),
            1025
        );
        assert!(parse_pasv_reply("227 Entering Passive Mode").is_err());
        assert!(parse_pasv_reply("227 (1,2,3)").is_err());
        assert!(parse_pasv_reply("227 (1,2,3,4,5,300)").is_err());
    }

    #[tokio::test]
    async fn test_query_version_against_fake_peer() {
        let port = fake_ftp::serve_once("2.4.8\n").await;
        let version = query_version("127.0.0.1", port, Duration::from_secs(2)).await.unwrap();
        assert_eq!(version, FirmwareVersion::new(2, 4, 8));
    }

    #[tokio::test]
    async fn test_query_version_unreachable() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = query_version("127.0.0.1", port, Duration::from_millis(500)).await;
        assert!(result.is_err());
    }
}
