//! # Supervisor
//!
//! Watchdog over the peer channels. Every poll tick each channel's health is
//! checked on its own and a channel that stalled, flagged itself, or never
//! confirmed its first update is restarted with `finalize` then `init`.
//!
//! A failed `init` leaves the channel flagged so the next tick retries it.
//! Channels are evaluated concurrently, so one slow restart never delays the
//! others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::worker::Worker;
use crate::channel::{ChannelKind, HealthSnapshot, Supervised};
use crate::clock::SharedClock;

/// Supervisor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Time between health checks
    pub poll_interval: Duration,
    /// Age of the last update after which a channel is considered stalled
    pub stall_threshold: Duration,
    /// Bound for joining the supervisor loop
    pub join_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stall_threshold: Duration::from_millis(3000),
            join_timeout: Duration::from_millis(2500),
        }
    }
}

/// Why a channel was restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    /// Loop running but silent for longer than the stall threshold
    Stalled,
    /// Loop exited on a transport error, or a previous restart failed
    Flagged,
    /// Loop never produced an update within the stall threshold
    NeverConfirmed,
}

/// Decide whether a channel needs a restart
///
/// Intentionally stopped channels (`active == false`) are never restarted.
pub fn assess(health: &HealthSnapshot, now_ms: u64, stall_threshold_ms: u64) -> Option<RestartReason> {
    if !health.active {
        return None;
    }

    let stale = health.age_ms(now_ms) > stall_threshold_ms;
    if health.running && stale {
        Some(RestartReason::Stalled)
    } else if health.needs_restart {
        Some(RestartReason::Flagged)
    } else if !health.running && stale {
        Some(RestartReason::NeverConfirmed)
    } else {
        None
    }
}

/// Outcome of one restart attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartEvent {
    pub kind: ChannelKind,
    pub reason: RestartReason,
    pub succeeded: bool,
}

/// Watchdog over a set of channels
pub struct Supervisor {
    channels: Vec<Arc<dyn Supervised>>,
    settings: SupervisorSettings,
    clock: SharedClock,
    worker: Mutex<Option<Worker>>,
}

impl Supervisor {
    pub fn new(channels: Vec<Arc<dyn Supervised>>, settings: SupervisorSettings, clock: SharedClock) -> Self {
        Self { channels, settings, clock, worker: Mutex::new(None) }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Run one health check over every channel
    ///
    /// # Returns
    ///
    /// * `Vec<RestartEvent>` - One entry per channel that was restarted
    pub async fn tick(&self) -> Vec<RestartEvent> {
        let now_ms = self.clock.now_ms();
        let threshold_ms = self.settings.stall_threshold.as_millis() as u64;

        let checks = self.channels.iter().map(|channel| async move {
            let health = channel.health().snapshot();
            let reason = assess(&health, now_ms, threshold_ms)?;
            Some(restart(channel.as_ref(), reason, health.age_ms(now_ms)).await)
        });

        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Start the poll loop in the background
    pub async fn start(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let worker = Worker::spawn("supervisor", move |cancel| supervisor.run(cancel));

        if let Some(previous) = self.worker.lock().await.replace(worker) {
            previous.stop(self.settings.join_timeout).await;
        }
        info!(
            "Supervisor watching {} channels (poll {} ms, stall {} ms)",
            self.channels.len(),
            self.settings.poll_interval.as_millis(),
            self.settings.stall_threshold.as_millis()
        );
    }

    /// Stop the poll loop
    ///
    /// Must be called before the channels are finalized on shutdown.
    pub async fn stop(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.stop(self.settings.join_timeout).await;
            info!("Supervisor stopped");
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll.tick() => {
                    let events = self.tick().await;
                    if !events.is_empty() {
                        debug!("Supervisor tick restarted {} channel(s)", events.len());
                    }
                }
            }
        }
    }
}

async fn restart(channel: &dyn Supervised, reason: RestartReason, age_ms: u64) -> RestartEvent {
    let kind = channel.kind();
    match reason {
        RestartReason::Stalled => error!("{} channel stalled, no update for {} ms, restarting", kind, age_ms),
        RestartReason::Flagged => warn!("{} channel requested a restart", kind),
        RestartReason::NeverConfirmed => {
            warn!("{} channel produced no update within {} ms, restarting", kind, age_ms)
        }
    }

    channel.finalize().await;
    let succeeded = match channel.init().await {
        Ok(()) => {
            info!("{} channel restarted", kind);
            true
        }
        Err(e) => {
            channel.health().restart_failed();
            error!("{} channel restart failed, retrying next tick: {}", kind, e);
            false
        }
    };

    RestartEvent { kind, reason, succeeded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelHealth;
    use crate::clock::{Clock, ManualClock};
    use crate::error::{DroneLinkError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Channel stub that counts lifecycle calls
    struct FakeChannel {
        kind: ChannelKind,
        health: ChannelHealth,
        inits: AtomicUsize,
        finalizes: AtomicUsize,
        fail_init: AtomicBool,
        clock: Arc<ManualClock>,
    }

    impl FakeChannel {
        fn new(kind: ChannelKind, clock: Arc<ManualClock>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                health: ChannelHealth::new(kind),
                inits: AtomicUsize::new(0),
                finalizes: AtomicUsize::new(0),
                fail_init: AtomicBool::new(false),
                clock,
            })
        }

        fn cycles(&self) -> (usize, usize) {
            (self.finalizes.load(Ordering::SeqCst), self.inits.load(Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl Supervised for FakeChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn health(&self) -> &ChannelHealth {
            &self.health
        }

        async fn init(&self) -> Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init.load(Ordering::SeqCst) {
                return Err(DroneLinkError::Timeout("peer unreachable".to_string()));
            }
            self.health.mark_started(self.clock.now_ms());
            Ok(())
        }

        async fn finalize(&self) {
            self.finalizes.fetch_add(1, Ordering::SeqCst);
            self.health.mark_stopped();
        }
    }

    fn supervisor(channels: &[Arc<FakeChannel>], clock: Arc<ManualClock>) -> Supervisor {
        let list = channels.iter().map(|c| Arc::clone(c) as Arc<dyn Supervised>).collect();
        Supervisor::new(list, SupervisorSettings::default(), clock)
    }

    #[test]
    fn test_assess_rules() {
        let running = HealthSnapshot { active: true, running: true, last_update_ms: 1000, needs_restart: false };
        assert_eq!(assess(&running, 3500, 3000), None);
        assert_eq!(assess(&running, 4001, 3000), Some(RestartReason::Stalled));

        let flagged = HealthSnapshot { running: false, needs_restart: true, ..running };
        assert_eq!(assess(&flagged, 1001, 3000), Some(RestartReason::Flagged));

        let unconfirmed = HealthSnapshot { running: false, ..running };
        assert_eq!(assess(&unconfirmed, 2000, 3000), None);
        assert_eq!(assess(&unconfirmed, 5000, 3000), Some(RestartReason::NeverConfirmed));

        let stopped = HealthSnapshot { active: false, needs_restart: true, ..running };
        assert_eq!(assess(&stopped, 100_000, 3000), None, "Stopped channels are never restarted");
    }

    #[tokio::test]
    async fn test_stall_triggers_single_restart() {
        let clock = Arc::new(ManualClock::new());
        clock.set_ms(10_000);

        let stalled = FakeChannel::new(ChannelKind::Telemetry, clock.clone());
        let healthy = FakeChannel::new(ChannelKind::Video, clock.clone());
        stalled.health.mark_started(0);
        stalled.health.mark_update(5_000);
        healthy.health.mark_started(0);
        healthy.health.mark_update(9_500);

        let supervisor = supervisor(&[stalled.clone(), healthy.clone()], clock.clone());
        let events = supervisor.tick().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChannelKind::Telemetry);
        assert_eq!(events[0].reason, RestartReason::Stalled);
        assert!(events[0].succeeded);
        assert_eq!(stalled.cycles(), (1, 1), "Exactly one finalize+init on the stalled channel");
        assert_eq!(healthy.cycles(), (0, 0), "Healthy channel must not be touched");

        // Restart reset the stall timer
        assert!(supervisor.tick().await.is_empty());
        assert_eq!(stalled.cycles(), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_init_retried_next_tick() {
        let clock = Arc::new(ManualClock::new());
        let channel = FakeChannel::new(ChannelKind::Command, clock.clone());
        channel.health.mark_started(0);
        channel.health.flag_restart();
        channel.fail_init.store(true, Ordering::SeqCst);

        let supervisor = supervisor(&[channel.clone()], clock.clone());

        let events = supervisor.tick().await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].succeeded);
        let health = channel.health.snapshot();
        assert!(health.active && health.needs_restart, "Failed restart must stay eligible");

        let events = supervisor.tick().await;
        assert_eq!(events.len(), 1, "Supervisor keeps retrying");
        assert_eq!(channel.cycles(), (2, 2));

        channel.fail_init.store(false, Ordering::SeqCst);
        let events = supervisor.tick().await;
        assert!(events[0].succeeded);
        assert!(supervisor.tick().await.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_channel_left_alone() {
        let clock = Arc::new(ManualClock::new());
        clock.set_ms(60_000);
        let channel = FakeChannel::new(ChannelKind::Video, clock.clone());

        let supervisor = supervisor(&[channel.clone()], clock);
        assert!(supervisor.tick().await.is_empty());
        assert_eq!(channel.cycles(), (0, 0));
    }

    #[tokio::test]
    async fn test_background_loop_restarts_flagged_channel() {
        let clock = Arc::new(ManualClock::new());
        let channel = FakeChannel::new(ChannelKind::Telemetry, clock.clone());
        channel.health.mark_started(0);
        channel.health.flag_restart();

        let settings = SupervisorSettings { poll_interval: Duration::from_millis(10), ..Default::default() };
        let supervisor = Arc::new(Supervisor::new(
            vec![channel.clone() as Arc<dyn Supervised>],
            settings,
            clock,
        ));
        supervisor.start().await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.cycles().1 == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("flagged channel restarted by the background loop");

        supervisor.stop().await;
        assert!(!channel.health.snapshot().needs_restart);
    }
}
