//! # Command Channel
//!
//! Sends AT commands to the peer's command port over UDP.
//!
//! All sends go through one async mutex that owns both the socket and the
//! sequence counter, so frames leave in sequence order with no gaps or
//! duplicates. The counter starts at 1 and survives channel restarts.
//!
//! A keep-alive worker sends `AT*COMWDG` whenever nothing was sent for the
//! configured interval; without it the peer assumes the link is lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::worker::Worker;
use super::{open_udp, ChannelHealth, ChannelKind, PeerEndpoint, Supervised};
use crate::clock::SharedClock;
use crate::error::{DroneLinkError, Result};
use crate::protocol::command::{encode_command, AtCommand, CommandArg};

/// Keep-alive and shutdown timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSettings {
    /// Idle time after which a keep-alive is sent
    pub keepalive_interval: Duration,
    /// How often the keep-alive worker checks for idleness
    pub keepalive_check: Duration,
    /// Bound for joining the keep-alive worker
    pub join_timeout: Duration,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_millis(200),
            keepalive_check: Duration::from_millis(30),
            join_timeout: Duration::from_millis(2500),
        }
    }
}

/// Highest sequence number the peer parses; the next frame restarts at 1
pub const MAX_SEQUENCE: u32 = i32::MAX as u32;

/// Sequence number that makes the peer reset its expected counter
const RESET_SEQUENCE: u32 = 1;

/// Socket and sequence counter, guarded together
#[derive(Debug)]
struct CommandLink {
    socket: Option<UdpSocket>,
    next_sequence: u32,
    last_send_ms: u64,
}

/// State shared between callers and the keep-alive worker
struct CommandShared {
    endpoint: PeerEndpoint,
    settings: CommandSettings,
    multiconfig: bool,
    clock: SharedClock,
    health: ChannelHealth,
    link: Mutex<CommandLink>,
}

impl CommandShared {
    async fn send_locked(&self, link: &mut CommandLink, verb: &str, args: &[CommandArg]) -> Result<u32> {
        let sequence = link.next_sequence;
        let frame = encode_command(sequence, verb, args)?;
        let socket = link.socket.as_ref().ok_or(DroneLinkError::ChannelClosed(ChannelKind::Command))?;

        socket.send(frame.as_bytes()).await?;

        link.next_sequence = match sequence.checked_add(1) {
            Some(next) if next <= MAX_SEQUENCE => next,
            _ => {
                warn!("Command sequence exhausted at {}, restarting at {}", sequence, RESET_SEQUENCE);
                RESET_SEQUENCE
            }
        };
        let now = self.clock.now_ms();
        link.last_send_ms = now;
        self.health.mark_update(now);
        debug!("Sent {}", frame.trim_end());
        Ok(sequence)
    }

    async fn send_command(&self, link: &mut CommandLink, command: &AtCommand) -> Result<u32> {
        self.send_locked(link, command.verb(), &command.args()).await
    }

    /// Send a keep-alive if the link has been idle long enough
    async fn keepalive_tick(&self) -> Result<bool> {
        let mut link = self.link.lock().await;
        let idle = self.clock.now_ms().saturating_sub(link.last_send_ms);
        if idle < self.settings.keepalive_interval.as_millis() as u64 {
            return Ok(false);
        }
        self.send_command(&mut link, &AtCommand::ComWdg).await?;
        Ok(true)
    }
}

/// Serialized AT command sender
pub struct CommandChannel {
    shared: Arc<CommandShared>,
    keepalive: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("endpoint", &self.shared.endpoint)
            .field("multiconfig", &self.shared.multiconfig)
            .finish_non_exhaustive()
    }
}

impl CommandChannel {
    /// Create a closed channel
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Peer command port
    /// * `settings` - Keep-alive timing
    /// * `multiconfig` - Precede every config write with `AT*CONFIG_IDS`
    /// * `clock` - Shared monotonic clock
    pub fn new(
        endpoint: PeerEndpoint,
        settings: CommandSettings,
        multiconfig: bool,
        clock: SharedClock,
    ) -> Self {
        let shared = CommandShared {
            endpoint,
            settings,
            multiconfig,
            clock,
            health: ChannelHealth::new(ChannelKind::Command),
            link: Mutex::new(CommandLink { socket: None, next_sequence: 1, last_send_ms: 0 }),
        };
        Self { shared: Arc::new(shared), keepalive: Mutex::new(None) }
    }

    /// Send a typed command
    ///
    /// # Returns
    ///
    /// * `Result<u32>` - Sequence number the frame was sent with
    ///
    /// # Errors
    ///
    /// Returns error if the channel is closed, the command cannot be encoded,
    /// or the socket write fails. The sequence number is only consumed when
    /// the frame was written.
    pub async fn send(&self, command: &AtCommand) -> Result<u32> {
        let mut link = self.shared.link.lock().await;
        self.shared.send_command(&mut link, command).await
    }

    /// Send a frame built from a raw verb and arguments
    pub async fn send_raw(&self, verb: &str, args: &[CommandArg]) -> Result<u32> {
        let mut link = self.shared.link.lock().await;
        self.shared.send_locked(&mut link, verb, args).await
    }

    /// Write a configuration key
    ///
    /// On multi-config peers `AT*CONFIG_IDS` and `AT*CONFIG` are sent back to
    /// back under the same lock so no other frame slips between them.
    pub async fn send_config(&self, key: &str, value: &str) -> Result<u32> {
        let mut link = self.shared.link.lock().await;
        if self.shared.multiconfig {
            self.shared.send_command(&mut link, &AtCommand::ConfigIds).await?;
        }
        self.shared.send_command(&mut link, &AtCommand::config(key, value)).await
    }

    /// Sequence number the next frame will carry
    pub async fn next_sequence(&self) -> u32 {
        self.shared.link.lock().await.next_sequence
    }

    /// Socket is open
    pub async fn is_open(&self) -> bool {
        self.shared.link.lock().await.socket.is_some()
    }
}

/// Keep-alive loop; exits on cancellation
async fn run_keepalive(shared: Arc<CommandShared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.settings.keepalive_check);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match shared.keepalive_tick().await {
                    Ok(_) => {}
                    Err(DroneLinkError::ChannelClosed(_)) => break,
                    // Stays silent; the supervisor notices the stale timestamp
                    Err(e) => warn!("Keep-alive failed: {}", e),
                }
            }
        }
    }
}

#[async_trait]
impl Supervised for CommandChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Command
    }

    fn health(&self) -> &ChannelHealth {
        &self.shared.health
    }

    async fn init(&self) -> Result<()> {
        let socket = open_udp(&self.shared.endpoint).await?;
        {
            let mut link = self.shared.link.lock().await;
            link.socket = Some(socket);
            link.last_send_ms = 0;
        }
        self.shared.health.mark_started(self.shared.clock.now_ms());

        let shared = Arc::clone(&self.shared);
        let worker = Worker::spawn("command-keepalive", move |cancel| run_keepalive(shared, cancel));
        if let Some(previous) = self.keepalive.lock().await.replace(worker) {
            previous.stop(self.shared.settings.join_timeout).await;
        }

        info!("Command channel open to {}", self.shared.endpoint.remote());
        Ok(())
    }

    async fn finalize(&self) {
        self.shared.health.mark_stopped();
        if let Some(worker) = self.keepalive.lock().await.take() {
            worker.stop(self.shared.settings.join_timeout).await;
        }
        self.shared.link.lock().await.socket = None;
        info!("Command channel closed");
    }
}
