//! # Video Channel
//!
//! Receives encoded video from the peer and publishes decoded [`Frame`]s.
//!
//! Two transports exist, each paired with its codec:
//! - [`VideoTransport::TcpPave`]: TCP byte stream of PaVE-framed H.264 units
//! - [`VideoTransport::UdpUvlc`]: UDP datagrams, one UVLC picture each,
//!   requested with the stream trigger
//!
//! Decoding is delegated to a [`FrameDecoder`] and runs on tokio's blocking
//! pool so a slow decode never holds a runtime thread. A unit that fails to decode,
//! or decodes to an unexpected resolution, is dropped without touching the
//! published frame. Transport errors end the loop and flag a restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::worker::Worker;
use super::{open_udp, ChannelHealth, ChannelKind, PeerEndpoint, Supervised};
use crate::clock::SharedClock;
use crate::error::{DroneLinkError, Result};
use crate::protocol::constants::STREAM_TRIGGER;
use crate::protocol::video::{codec, PaveCodec};

/// Largest legacy UDP picture
pub const LEGACY_BUFFER_SIZE: usize = 122_880;

/// Encoded height of the 360p stream; the last 8 rows are padding
pub const PADDED_360P_HEIGHT: u32 = 368;

/// Transport and codec pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoTransport {
    /// PaVE framed H.264 over TCP (version 2 hardware)
    TcpPave,
    /// UVLC pictures over UDP (version 1 hardware)
    UdpUvlc,
}

impl VideoTransport {
    /// Resolutions accepted when none are configured
    pub fn default_resolutions(&self) -> Vec<(u32, u32)> {
        match self {
            VideoTransport::TcpPave => vec![(640, 360), (640, PADDED_360P_HEIGHT), (1280, 720)],
            VideoTransport::UdpUvlc => vec![(320, 240), (176, 144)],
        }
    }
}

/// Codec of one encoded unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedCodec {
    H264,
    Mpeg4,
    Uvlc,
}

impl EncodedCodec {
    /// Codec named by a PaVE header
    pub fn from_pave(id: u8) -> Option<Self> {
        match id {
            codec::H264 => Some(EncodedCodec::H264),
            codec::MPEG4 => Some(EncodedCodec::Mpeg4),
            codec::UVLC => Some(EncodedCodec::Uvlc),
            _ => None,
        }
    }
}

/// Raw image produced by a decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// External video decoder
///
/// Given one encoded unit, produce a raw pixel buffer and its dimensions.
#[cfg_attr(test, mockall::automock)]
pub trait FrameDecoder: Send {
    fn decode(&mut self, codec: EncodedCodec, data: &[u8]) -> Result<DecodedImage>;
}

/// Latest decoded picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
    /// Increments with every published frame, across restarts
    pub generation: u64,
}

impl Frame {
    /// Height without the 360p padding rows
    pub fn display_height(&self) -> u32 {
        if self.height == PADDED_360P_HEIGHT {
            360
        } else {
            self.height
        }
    }
}

/// Receive loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub transport: VideoTransport,
    /// Accepted `(width, height)` pairs
    pub resolutions: Vec<(u32, u32)>,
    /// Longest wait for one unit
    pub receive_timeout: Duration,
    /// Bound for the TCP connect
    pub connect_timeout: Duration,
    /// Bound for joining the receive loop
    pub join_timeout: Duration,
}

impl VideoSettings {
    pub fn new(transport: VideoTransport) -> Self {
        Self {
            transport,
            resolutions: transport.default_resolutions(),
            receive_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(2000),
            join_timeout: Duration::from_millis(2500),
        }
    }
}

struct VideoShared {
    endpoint: PeerEndpoint,
    settings: VideoSettings,
    clock: SharedClock,
    health: ChannelHealth,
    decoder: StdMutex<Box<dyn FrameDecoder>>,
    frame: watch::Sender<Option<Frame>>,
    generation: AtomicU64,
}

impl VideoShared {
    /// Decode one unit and publish it if it passes the size check
    ///
    /// Returns `true` when a frame was published.
    fn accept_unit(&self, codec: EncodedCodec, data: &[u8]) -> bool {
        let decoded = {
            let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
            decoder.decode(codec, data)
        };

        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!("Dropping undecodable video unit: {}", e);
                return false;
            }
        };

        if !self.settings.resolutions.contains(&(image.width, image.height)) {
            warn!("Dropping video frame with unexpected size {}x{}", image.width, image.height);
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.frame.send_replace(Some(Frame {
            pixels: Bytes::from(image.pixels),
            width: image.width,
            height: image.height,
            generation,
        }));
        self.health.mark_update(self.clock.now_ms());
        true
    }
}

/// Run [`VideoShared::accept_unit`] on the blocking pool
async fn accept_unit_blocking(shared: &Arc<VideoShared>, codec: EncodedCodec, data: Bytes) -> bool {
    let shared = Arc::clone(shared);
    match tokio::task::spawn_blocking(move || shared.accept_unit(codec, &data)).await {
        Ok(published) => published,
        Err(e) => {
            error!("Video decode task failed: {}", e);
            false
        }
    }
}

/// Video receiver
pub struct VideoChannel {
    shared: Arc<VideoShared>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for VideoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoChannel")
            .field("endpoint", &self.shared.endpoint)
            .field("transport", &self.shared.settings.transport)
            .finish_non_exhaustive()
    }
}

impl VideoChannel {
    /// Create a closed channel
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Peer video port
    /// * `settings` - Transport, accepted resolutions and timeouts
    /// * `decoder` - Decoder for the transport's codec
    /// * `clock` - Shared monotonic clock
    pub fn new(
        endpoint: PeerEndpoint,
        settings: VideoSettings,
        decoder: Box<dyn FrameDecoder>,
        clock: SharedClock,
    ) -> Self {
        let (frame, _) = watch::channel(None);
        let shared = VideoShared {
            endpoint,
            settings,
            clock,
            health: ChannelHealth::new(ChannelKind::Video),
            decoder: StdMutex::new(decoder),
            frame,
            generation: AtomicU64::new(0),
        };
        Self { shared: Arc::new(shared), worker: Mutex::new(None) }
    }

    pub fn transport(&self) -> VideoTransport {
        self.shared.settings.transport
    }

    /// Latest frame, if any was decoded yet
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.frame.borrow().clone()
    }

    /// Receiver notified on every published frame
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.shared.frame.subscribe()
    }
}

async fn run_tcp(shared: Arc<VideoShared>, stream: TcpStream, cancel: CancellationToken) {
    let mut units = FramedRead::new(stream, PaveCodec::new());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            n = tokio::time::timeout(shared.settings.receive_timeout, units.next()) => n,
        };

        match next {
            Err(_) => debug!("No video within {:?}", shared.settings.receive_timeout),
            Ok(None) => {
                error!("Video stream closed by peer");
                shared.health.flag_restart();
                break;
            }
            Ok(Some(Err(e))) => {
                error!("Video stream failed: {}", e);
                shared.health.flag_restart();
                break;
            }
            Ok(Some(Ok(unit))) => match EncodedCodec::from_pave(unit.header.codec) {
                Some(codec) => {
                    accept_unit_blocking(&shared, codec, unit.payload).await;
                }
                None => warn!("Dropping video unit with unknown codec {}", unit.header.codec),
            },
        }
    }
}

async fn run_udp(shared: Arc<VideoShared>, socket: tokio::net::UdpSocket, cancel: CancellationToken) {
    let mut buf = vec![0u8; LEGACY_BUFFER_SIZE];

    loop {
        if let Err(e) = socket.send(&STREAM_TRIGGER).await {
            error!("Video trigger failed: {}", e);
            shared.health.flag_restart();
            break;
        }

        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = tokio::time::timeout(shared.settings.receive_timeout, socket.recv(&mut buf)) => r,
        };

        match received {
            Err(_) => debug!("No video within {:?}", shared.settings.receive_timeout),
            Ok(Err(e)) => {
                error!("Video receive failed: {}", e);
                shared.health.flag_restart();
                break;
            }
            Ok(Ok(0)) => {}
            Ok(Ok(n)) => {
                accept_unit_blocking(&shared, EncodedCodec::Uvlc, Bytes::copy_from_slice(&buf[..n])).await;
            }
        }
    }
}

#[async_trait]
impl Supervised for VideoChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Video
    }

    fn health(&self) -> &ChannelHealth {
        &self.shared.health
    }

    async fn init(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let endpoint = &self.shared.endpoint;

        let worker = match self.shared.settings.transport {
            VideoTransport::TcpPave => {
                let connect = TcpStream::connect(endpoint.remote());
                let stream = tokio::time::timeout(self.shared.settings.connect_timeout, connect)
                    .await
                    .map_err(|_| DroneLinkError::Timeout(format!("video connect to {}", endpoint.remote())))?
                    .map_err(|source| DroneLinkError::Connect { endpoint: endpoint.remote(), source })?;
                stream.set_nodelay(true)?;

                self.shared.health.mark_started(self.shared.clock.now_ms());
                Worker::spawn("video-tcp", move |cancel| run_tcp(shared, stream, cancel))
            }
            VideoTransport::UdpUvlc => {
                let socket = open_udp(endpoint).await?;

                self.shared.health.mark_started(self.shared.clock.now_ms());
                Worker::spawn("video-udp", move |cancel| run_udp(shared, socket, cancel))
            }
        };

        if let Some(previous) = self.worker.lock().await.replace(worker) {
            previous.stop(self.shared.settings.join_timeout).await;
        }

        info!("Video channel open to {} ({:?})", endpoint.remote(), self.shared.settings.transport);
        Ok(())
    }

    async fn finalize(&self) {
        self.shared.health.mark_stopped();
        if let Some(worker) = self.worker.lock().await.take() {
            worker.stop(self.shared.settings.join_timeout).await;
        }
        info!("Video channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::command::{CommandChannel, CommandSettings};
    use crate::clock::{ManualClock, MonotonicClock};
    use crate::protocol::video::test_frames::pave_unit;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, UdpSocket};

    fn image(width: u32, height: u32) -> DecodedImage {
        DecodedImage { pixels: vec![7u8; 12], width, height }
    }

    fn fast_settings(transport: VideoTransport) -> VideoSettings {
        VideoSettings {
            receive_timeout: Duration::from_millis(100),
            join_timeout: Duration::from_millis(500),
            ..VideoSettings::new(transport)
        }
    }

    fn channel_with(decoder: MockFrameDecoder, port: u16, transport: VideoTransport, clock: SharedClock) -> VideoChannel {
        VideoChannel::new(
            PeerEndpoint::new("127.0.0.1", port, false),
            fast_settings(transport),
            Box::new(decoder),
            clock,
        )
    }

    #[test]
    fn test_accept_unit_publishes_frame() {
        let mut decoder = MockFrameDecoder::new();
        decoder
            .expect_decode()
            .withf(|codec, data| *codec == EncodedCodec::H264 && data == b"unit")
            .times(1)
            .returning(|_, _| Ok(image(640, 368)));

        let clock = ManualClock::new();
        clock.advance_ms(77);
        let channel = channel_with(decoder, 5555, VideoTransport::TcpPave, Arc::new(clock));

        assert!(channel.shared.accept_unit(EncodedCodec::H264, b"unit"));
        let frame = channel.latest_frame().expect("frame published");
        assert_eq!(frame.width, 640);
        assert_eq!(frame.display_height(), 360);
        assert_eq!(frame.generation, 1);
        assert_eq!(channel.health().snapshot().last_update_ms, 77);
    }

    #[test]
    fn test_unexpected_size_rejected() {
        let mut decoder = MockFrameDecoder::new();
        decoder.expect_decode().returning(|_, _| Ok(image(123, 45)));

        let channel = channel_with(decoder, 5555, VideoTransport::TcpPave, MonotonicClock::shared());
        assert!(!channel.shared.accept_unit(EncodedCodec::H264, b"x"));
        assert!(channel.latest_frame().is_none(), "Corrupt frame must not replace state");
        assert!(!channel.health().snapshot().running);
    }

    #[test]
    fn test_decode_failure_skipped() {
        let mut decoder = MockFrameDecoder::new();
        let mut calls = 0;
        decoder.expect_decode().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(DroneLinkError::Video("bad slice".to_string()))
            } else {
                Ok(image(1280, 720))
            }
        });

        let channel = channel_with(decoder, 5555, VideoTransport::TcpPave, MonotonicClock::shared());
        assert!(!channel.shared.accept_unit(EncodedCodec::H264, b"a"));
        assert!(channel.shared.accept_unit(EncodedCodec::H264, b"b"));
        assert_eq!(channel.latest_frame().unwrap().generation, 1);
    }

    #[test]
    fn test_default_resolutions() {
        assert!(VideoTransport::TcpPave.default_resolutions().contains(&(1280, 720)));
        assert!(VideoTransport::UdpUvlc.default_resolutions().contains(&(320, 240)));
    }

    #[tokio::test]
    async fn test_tcp_stream_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(&pave_unit(640, 368, 1, b"frame-one")).await.unwrap();
            conn.write_all(&pave_unit(640, 368, 2, b"frame-two")).await.unwrap();
            // Keep the connection open
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut decoder = MockFrameDecoder::new();
        decoder.expect_decode().returning(|_, _| Ok(image(640, 368)));
        let channel = channel_with(decoder, port, VideoTransport::TcpPave, MonotonicClock::shared());
        let mut frames = channel.subscribe();

        channel.init().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                frames.changed().await.unwrap();
                if frames.borrow().as_ref().map(|f| f.generation) == Some(2) {
                    break;
                }
            }
        })
        .await
        .expect("two frames decoded");

        assert!(channel.health().snapshot().running);
        channel.finalize().await;
    }

    #[tokio::test]
    async fn test_tcp_stream_close_flags_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            drop(conn);
        });

        let decoder = MockFrameDecoder::new();
        let channel = channel_with(decoder, port, VideoTransport::TcpPave, MonotonicClock::shared());
        channel.init().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !channel.health().snapshot().needs_restart {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("closed stream should flag a restart");

        channel.finalize().await;
    }

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let channel = channel_with(MockFrameDecoder::new(), port, VideoTransport::TcpPave, MonotonicClock::shared());
        assert!(channel.init().await.is_err());
    }

    #[tokio::test]
    async fn test_udp_legacy_stream() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let mut decoder = MockFrameDecoder::new();
        decoder
            .expect_decode()
            .withf(|codec, data| *codec == EncodedCodec::Uvlc && data == b"uvlc-picture")
            .returning(|_, _| Ok(image(320, 240)));
        let channel = channel_with(decoder, port, VideoTransport::UdpUvlc, MonotonicClock::shared());
        let mut frames = channel.subscribe();
        channel.init().await.unwrap();

        let mut buf = [0u8; 16];
        let (n, client) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &STREAM_TRIGGER);
        peer.send_to(b"uvlc-picture", client).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), frames.changed())
            .await
            .expect("frame published")
            .unwrap();
        assert_eq!(channel.latest_frame().unwrap().width, 320);

        channel.finalize().await;
    }

    #[tokio::test]
    async fn test_slow_decode_does_not_delay_keepalive() {
        let command_peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let command_port = command_peer.local_addr().unwrap().port();
        let keepalives = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&keepalives);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = command_peer.recv(&mut buf).await {
                if buf[..n].starts_with(b"AT*COMWDG=") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let video_peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let video_port = video_peer.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            while let Ok((_, client)) = video_peer.recv_from(&mut buf).await {
                let _ = video_peer.send_to(b"uvlc-picture", client).await;
            }
        });

        let mut decoder = MockFrameDecoder::new();
        decoder.expect_decode().returning(|_, _| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(image(320, 240))
        });

        let commands = CommandChannel::new(
            PeerEndpoint::new("127.0.0.1", command_port, false),
            CommandSettings {
                keepalive_interval: Duration::from_millis(50),
                keepalive_check: Duration::from_millis(10),
                join_timeout: Duration::from_millis(500),
            },
            false,
            MonotonicClock::shared(),
        );
        commands.init().await.unwrap();

        // Single-threaded test runtime: an inline decode would starve the keep-alive
        let video = channel_with(decoder, video_port, VideoTransport::UdpUvlc, MonotonicClock::shared());
        let mut frames = video.subscribe();
        video.init().await.unwrap();
        tokio::time::timeout(Duration::from_secs(3), frames.changed())
            .await
            .expect("first frame decoded")
            .unwrap();

        keepalives.store(0, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let sent = keepalives.load(Ordering::SeqCst);
        assert!(sent >= 8, "Keep-alive should keep its 50 ms cadence during decodes, got {} in 1 s", sent);

        video.finalize().await;
        commands.finalize().await;
    }
}
