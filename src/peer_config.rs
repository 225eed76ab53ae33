//! # Peer Configuration Dump
//!
//! Reads the peer's full configuration from the configuration port. The peer
//! writes its settings as `section:key = value` lines once it receives the
//! dump request on the command channel.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::channel::command::CommandChannel;
use crate::error::{DroneLinkError, Result};
use crate::protocol::command::AtCommand;

/// Control mode asking the peer to send its configuration
const CTRL_CFG_GET: i32 = 4;
/// Control mode resetting the pending config acknowledgement
const CTRL_ACK_RESET: i32 = 5;

/// Largest dump accepted
const MAX_DUMP_SIZE: usize = 64 * 1024;

/// Parsed configuration dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDump {
    entries: BTreeMap<String, String>,
}

impl ConfigDump {
    /// Parse `key = value` lines; lines without `=` are ignored
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Fetch the configuration dump
///
/// # Arguments
///
/// * `address` - Peer address
/// * `port` - Configuration port
/// * `commands` - Open command channel used for the request
/// * `timeout` - Bound for the whole exchange
///
/// # Errors
///
/// Returns error if the configuration port cannot be reached, the request
/// cannot be sent, or nothing arrives within `timeout`.
pub async fn fetch(address: &str, port: u16, commands: &CommandChannel, timeout: Duration) -> Result<ConfigDump> {
    let endpoint = format!("{}:{}", address, port);
    let mut stream = TcpStream::connect(&endpoint)
        .await
        .map_err(|source| DroneLinkError::Connect { endpoint: endpoint.clone(), source })?;

    commands.send(&AtCommand::Ctrl { mode: CTRL_ACK_RESET }).await?;
    commands.send(&AtCommand::Ctrl { mode: CTRL_CFG_GET }).await?;

    let text = tokio::time::timeout(timeout, read_dump(&mut stream))
        .await
        .map_err(|_| DroneLinkError::Timeout(format!("configuration dump from {}", endpoint)))??;

    let config = ConfigDump::parse(&text);
    info!("Read {} configuration entries from {}", config.len(), endpoint);
    Ok(config)
}

/// Read until the peer closes the stream or goes quiet after sending
async fn read_dump(stream: &mut TcpStream) -> Result<String> {
    const IDLE: Duration = Duration::from_millis(300);

    let mut dump = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = if dump.is_empty() {
            stream.read(&mut chunk).await
        } else {
            match tokio::time::timeout(IDLE, stream.read(&mut chunk)).await {
                Ok(r) => r,
                Err(_) => break,
            }
        };

        match read? {
            0 => break,
            n => {
                dump.extend_from_slice(&chunk[..n]);
                if dump.len() > MAX_DUMP_SIZE {
                    return Err(DroneLinkError::Protocol(format!(
                        "Configuration dump exceeds {} bytes",
                        MAX_DUMP_SIZE
                    )));
                }
            }
        }
    }

    debug!("Configuration dump of {} bytes", dump.len());
    Ok(String::from_utf8_lossy(&dump).into_owned())
}
