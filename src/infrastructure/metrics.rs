//! Metrics collection for feed monitoring
//!
//! Lock-free counters using atomic operations.
//! Updated by the session task, exported via API in cold path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Feed metrics collector
///
/// Thread-safe counters updated from the session task.
/// Snapshots taken for API export.
pub struct FeedMetrics {
    /// Inbound frames of any kind
    frames_received: AtomicU64,
    /// Price batches handed to the consumer
    batches_delivered: AtomicU64,
    /// Frames dropped because they did not decode
    malformed_frames: AtomicU64,
    /// Individual price entries rejected at the dispatcher boundary
    rejected_entries: AtomicU64,
    /// Liveness probes sent
    probes_sent: AtomicU64,
    /// Retries scheduled after a failure
    reconnects: AtomicU64,
    /// Last frame timestamp (Unix millis)
    last_message_time: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot for API export
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub batches_delivered: u64,
    pub malformed_frames: u64,
    pub rejected_entries: u64,
    pub probes_sent: u64,
    pub reconnects: u64,
    pub message_rate: f64, // frames per second
    pub uptime_seconds: u64,
}

impl FeedMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            rejected_entries: AtomicU64::new(0),
            probes_sent: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_message_time: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an inbound frame
    #[inline]
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.update_last_message_time();
    }

    #[inline]
    pub fn record_batch(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self, entries: u64) {
        self.rejected_entries.fetch_add(entries, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_probe(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Update last message timestamp
    #[inline]
    fn update_last_message_time(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_message_time.store(now, Ordering::Relaxed);
    }

    /// Milliseconds since the last inbound frame, capped at 10000ms
    pub fn idle_ms(&self) -> u64 {
        let last = self.last_message_time.load(Ordering::Relaxed);
        if last == 0 {
            return 10000; // No messages yet
        }

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        now.saturating_sub(last).min(10000)
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let frames = self.frames_received.load(Ordering::Relaxed);

        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            frames as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            frames_received: frames,
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            rejected_entries: self.rejected_entries.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            message_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let snapshot = FeedMetrics::new().snapshot();
        assert_eq!(snapshot.frames_received, 0);
        assert_eq!(snapshot.batches_delivered, 0);
        assert_eq!(snapshot.reconnects, 0);
    }

    #[test]
    fn test_record_counters() {
        let metrics = FeedMetrics::new();

        metrics.record_frame();
        metrics.record_frame();
        metrics.record_batch();
        metrics.record_malformed();
        metrics.record_rejected(3);
        metrics.record_probe();
        metrics.record_reconnect();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.batches_delivered, 1);
        assert_eq!(snapshot.malformed_frames, 1);
        assert_eq!(snapshot.rejected_entries, 3);
        assert_eq!(snapshot.probes_sent, 1);
        assert_eq!(snapshot.reconnects, 1);
    }

    #[test]
    fn test_idle_no_messages() {
        let metrics = FeedMetrics::new();
        assert_eq!(metrics.idle_ms(), 10000);
        metrics.record_frame();
        assert!(metrics.idle_ms() < 10000);
    }
}
