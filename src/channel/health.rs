//! # Channel Health
//!
//! Liveness record of one channel. Written by the channel's own loop, read by
//! the supervisor. Each channel has its own lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::ChannelKind;

/// Copy of a channel's health at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Channel is expected to be running (not intentionally stopped)
    pub active: bool,
    /// Current loop has confirmed at least one successful update
    pub running: bool,
    /// Monotonic time of the last successful update, in ms
    pub last_update_ms: u64,
    /// Loop exited on a transport error or a restart attempt failed
    pub needs_restart: bool,
}

impl HealthSnapshot {
    /// Milliseconds since the last update
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_update_ms)
    }
}

/// Lock-protected health record of one channel
#[derive(Debug)]
pub struct ChannelHealth {
    kind: ChannelKind,
    inner: Mutex<HealthSnapshot>,
}

impl ChannelHealth {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind, inner: Mutex::new(HealthSnapshot::default()) }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        *self.lock()
    }

    /// A new loop was started
    ///
    /// Resets `running` until the loop confirms its first update and restarts
    /// the stall timer from `now_ms`.
    pub fn mark_started(&self, now_ms: u64) {
        let mut health = self.lock();
        health.active = true;
        health.running = false;
        health.needs_restart = false;
        health.last_update_ms = now_ms;
    }

    /// The loop completed a successful unit of work
    pub fn mark_update(&self, now_ms: u64) {
        let mut health = self.lock();
        health.running = true;
        health.last_update_ms = health.last_update_ms.max(now_ms);
    }

    /// The loop stopped on its own and wants the supervisor to restart it
    pub fn flag_restart(&self) {
        let mut health = self.lock();
        health.running = false;
        health.needs_restart = true;
    }

    /// A restart attempt failed; keep the channel expected so it is retried
    pub fn restart_failed(&self) {
        let mut health = self.lock();
        health.active = true;
        health.running = false;
        health.needs_restart = true;
    }

    /// The channel was stopped on purpose
    pub fn mark_stopped(&self) {
        let mut health = self.lock();
        health.active = false;
        health.running = false;
        health.needs_restart = false;
    }

    fn lock(&self) -> MutexGuard<'_, HealthSnapshot> {
        // Every write leaves a complete record behind
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_health_is_inactive() {
        let health = ChannelHealth::new(ChannelKind::Video);
        assert_eq!(health.kind(), ChannelKind::Video);
        assert_eq!(health.snapshot(), HealthSnapshot::default());
    }

    #[test]
    fn test_started_waits_for_first_update() {
        let health = ChannelHealth::new(ChannelKind::Telemetry);
        health.mark_started(1000);

        let snap = health.snapshot();
        assert!(snap.active);
        assert!(!snap.running, "Loop is not running until it reports an update");
        assert_eq!(snap.last_update_ms, 1000);

        health.mark_update(1200);
        assert!(health.snapshot().running);
        assert_eq!(health.snapshot().last_update_ms, 1200);
    }

    #[test]
    fn test_last_update_only_advances() {
        let health = ChannelHealth::new(ChannelKind::Command);
        health.mark_started(0);
        health.mark_update(500);
        health.mark_update(300);
        assert_eq!(health.snapshot().last_update_ms, 500);
    }

    #[test]
    fn test_restart_resets_timestamp_backward() {
        let health = ChannelHealth::new(ChannelKind::Command);
        health.mark_started(0);
        health.mark_update(9000);
        health.mark_started(100);

        let snap = health.snapshot();
        assert_eq!(snap.last_update_ms, 100);
        assert!(!snap.running);
    }

    #[test]
    fn test_flag_restart_and_stop() {
        let health = ChannelHealth::new(ChannelKind::Telemetry);
        health.mark_started(0);
        health.mark_update(10);
        health.flag_restart();

        let snap = health.snapshot();
        assert!(snap.active);
        assert!(!snap.running);
        assert!(snap.needs_restart);

        health.mark_stopped();
        let snap = health.snapshot();
        assert!(!snap.active);
        assert!(!snap.needs_restart);
    }

    #[test]
    fn test_restart_failed_keeps_channel_expected() {
        let health = ChannelHealth::new(ChannelKind::Video);
        health.mark_stopped();
        health.restart_failed();

        let snap = health.snapshot();
        assert!(snap.active);
        assert!(snap.needs_restart);
    }

    #[test]
    fn test_age() {
        let snap = HealthSnapshot { last_update_ms: 1000, ..Default::default() };
        assert_eq!(snap.age_ms(4500), 3500);
        assert_eq!(snap.age_ms(500), 0);
    }
}
