//! Heartbeat prober for liveness and latency
//!
//! Sends one application-level probe per interval while the connection is
//! open and measures round-trip time from the matching response. A probe
//! still unanswered when the next one is due means the connection is
//! silently dead. The prober only signals; the connection manager decides
//! what to do about it.

use std::time::Duration;
use tokio::time::Instant;

/// Outbound probe frame understood by the feed server
pub const PROBE_FRAME: &str = "ping";

/// One probe cycle: when it was sent and, once answered, its round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub sent_at: Instant,
    pub round_trip: Option<Duration>,
}

/// What the caller must do when the probe timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTick {
    /// Send [`PROBE_FRAME`] now
    Send,
    /// Previous probe went unanswered for a full interval
    LivenessFailure,
}

/// Heartbeat prober state
///
/// Time is passed in by the caller so the prober stays a plain state
/// machine; the session task owns the actual timer.
#[derive(Debug)]
pub struct HeartbeatProber {
    /// Probe interval, also the response deadline
    interval: Duration,
    /// When the next tick is due (None = not running)
    next_tick: Option<Instant>,
    /// Probe in flight, at most one
    outstanding: Option<LatencySample>,
    /// Last answered probe
    last_sample: Option<LatencySample>,
    /// Probes sent since start
    probes_sent: u64,
}

impl HeartbeatProber {
    /// Create stopped prober
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: None,
            outstanding: None,
            last_sample: None,
            probes_sent: 0,
        }
    }

    /// Arm the probe timer; first probe goes out one interval after `now`
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.interval);
        self.outstanding = None;
        self.probes_sent = 0;
    }

    /// Cancel the timer and forget any probe in flight
    ///
    /// Idempotent, safe when never started. The latency sample is dropped
    /// with the connection it was measured on.
    pub fn stop(&mut self) {
        self.next_tick = None;
        self.outstanding = None;
        self.last_sample = None;
    }

    /// Whether the probe timer is armed
    #[inline]
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Deadline of the next tick, if running
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Handle the probe timer firing at `now`
    pub fn on_tick(&mut self, now: Instant) -> ProbeTick {
        if self.outstanding.is_some() {
            self.next_tick = None;
            self.outstanding = None;
            return ProbeTick::LivenessFailure;
        }

        self.outstanding = Some(LatencySample {
            sent_at: now,
            round_trip: None,
        });
        self.next_tick = Some(now + self.interval);
        self.probes_sent += 1;
        ProbeTick::Send
    }

    /// Record a probe response received at `now`
    ///
    /// Returns the round trip, or None when no probe was outstanding.
    pub fn on_response(&mut self, now: Instant) -> Option<Duration> {
        let mut sample = self.outstanding.take()?;
        let round_trip = now.saturating_duration_since(sample.sent_at);
        sample.round_trip = Some(round_trip);
        self.last_sample = Some(sample);
        Some(round_trip)
    }

    /// Current latency in whole milliseconds
    pub fn latency_ms(&self) -> Option<u64> {
        self.last_sample
            .and_then(|s| s.round_trip)
            .map(|rtt| rtt.as_millis() as u64)
    }

    /// Last answered probe
    pub fn last_sample(&self) -> Option<LatencySample> {
        self.last_sample
    }

    /// Whether a probe is waiting for its response
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Probes sent since the last start
    pub fn probes_sent(&self) -> u64 {
        self.probes_sent
    }
}
