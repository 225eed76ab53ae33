//! # Peer Channels
//!
//! The three independent I/O channels to the peer and what they share.
//!
//! This module handles:
//! - Command channel: serialized AT command sends plus the keep-alive worker
//! - Telemetry channel: navdata receive loop feeding [`telemetry::TelemetryState`]
//! - Video channel: video receive loop feeding [`video::Frame`]
//! - Per-channel health records read by the supervisor
//! - Cancellable worker tasks with bounded joins

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::UdpSocket;

use crate::error::{DroneLinkError, Result};

pub mod command;
pub mod health;
pub mod telemetry;
pub mod video;
pub mod worker;

pub use health::{ChannelHealth, HealthSnapshot};

/// Identifies one of the three peer channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Command,
    Telemetry,
    Video,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Command => "command",
            ChannelKind::Telemetry => "telemetry",
            ChannelKind::Video => "video",
        };
        f.write_str(name)
    }
}

/// A channel the supervisor can observe and restart
#[async_trait]
pub trait Supervised: Send + Sync {
    /// Which channel this is
    fn kind(&self) -> ChannelKind;

    /// Health record written by the channel's own loop
    fn health(&self) -> &ChannelHealth;

    /// Open the socket and start the channel's worker
    async fn init(&self) -> Result<()>;

    /// Stop the worker and release the socket
    async fn finalize(&self);
}

/// Remote endpoint of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    /// Peer host or IP address
    pub address: String,
    /// Peer port
    pub port: u16,
    /// Bind the local socket to the same port number as the remote one
    pub bind_local: bool,
}

impl PeerEndpoint {
    pub fn new(address: impl Into<String>, port: u16, bind_local: bool) -> Self {
        Self { address: address.into(), port, bind_local }
    }

    /// `address:port` of the peer
    pub fn remote(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Local address to bind
    pub fn local(&self) -> String {
        let port = if self.bind_local { self.port } else { 0 };
        format!("0.0.0.0:{}", port)
    }
}

/// Bind a UDP socket and connect it to the peer
pub(crate) async fn open_udp(endpoint: &PeerEndpoint) -> Result<UdpSocket> {
    let connect_err = |source| DroneLinkError::Connect { endpoint: endpoint.remote(), source };

    let socket = UdpSocket::bind(endpoint.local()).await.map_err(connect_err)?;
    socket.connect(endpoint.remote()).await.map_err(connect_err)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_display() {
        assert_eq!(ChannelKind::Command.to_string(), "command");
        assert_eq!(ChannelKind::Telemetry.to_string(), "telemetry");
        assert_eq!(ChannelKind::Video.to_string(), "video");
    }

    #[test]
    fn test_endpoint_addresses() {
        let endpoint = PeerEndpoint::new("192.168.1.1", 5554, true);
        assert_eq!(endpoint.remote(), "192.168.1.1:5554");
        assert_eq!(endpoint.local(), "0.0.0.0:5554");

        let ephemeral = PeerEndpoint::new("127.0.0.1", 5554, false);
        assert_eq!(ephemeral.local(), "0.0.0.0:0");
    }

    #[tokio::test]
    async fn test_open_udp_connects_to_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let socket = open_udp(&PeerEndpoint::new("127.0.0.1", port, false)).await.unwrap();
        socket.send(b"ping").await.unwrap();

        let mut buf = [0u8; 8];
        let n = peer.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
