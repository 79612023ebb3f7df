use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// In-process counters for the engine's hot paths, bumped from any task and
/// read as a point-in-time snapshot.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    reconnects_scheduled: AtomicU64,
    realtime_sends: AtomicU64,
    fallback_sends: AtomicU64,
    sends_failed: AtomicU64,
}

/// Point-in-time metric values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub reconnects_scheduled: u64,
    pub realtime_sends: u64,
    pub fallback_sends: u64,
    pub sends_failed: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_frame(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_realtime_send(&self) {
        self.realtime_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_send(&self) {
        self.fallback_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_send(&self) {
        self.sends_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            realtime_sends: self.realtime_sends.load(Ordering::Relaxed),
            fallback_sends: self.fallback_sends.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
        }
    }
}
