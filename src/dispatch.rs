//! Inbound frame decoding and ordered delivery
//!
//! Every inbound text frame is either a probe response
//! (`{"type":"pong",...}` or a bare `pong`) or a JSON object mapping ticker
//! symbols to prices. Probe responses go to the heartbeat prober; price
//! frames reach the consumer callback exactly once, synchronously, in the
//! order the transport delivered them. Malformed frames are dropped with a
//! diagnostic and never affect the connection.

use crate::core::{PriceBatch, PriceUpdate};
use crate::infrastructure::metrics::FeedMetrics;
use crate::ws::HeartbeatProber;
use parking_lot::Mutex;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Consumer callback receiving one batch per data frame
pub type PriceCallback = Box<dyn FnMut(PriceBatch) + Send + 'static>;

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Response to the outstanding liveness probe
    ProbeResponse,
    /// Price data; `rejected` counts entries that failed validation
    Prices { batch: PriceBatch, rejected: usize },
}

/// Frame decoding errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one raw text frame
pub fn decode_frame(raw: &str) -> Result<InboundFrame, DecodeError> {
    if raw.trim() == "pong" {
        return Ok(InboundFrame::ProbeResponse);
    }
    Ok(serde_json::from_str(raw)?)
}

impl<'de> Deserialize<'de> for InboundFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FrameVisitor)
    }
}

/// Single pass over the object, keeping wire order
struct FrameVisitor;

impl<'de> Visitor<'de> for FrameVisitor {
    type Value = InboundFrame;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object of symbol to price, or a pong")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut batch = PriceBatch::new();
        let mut rejected = 0usize;
        let mut pong = false;

        while let Some(key) = map.next_key::<String>()? {
            let value: Value = map.next_value()?;
            if key == "type" && value.as_str() == Some("pong") {
                pong = true;
                continue;
            }
            // null, strings, nested values and empty symbols stop here
            match value.as_f64().and_then(|price| PriceUpdate::new(key, price)) {
                Some(update) => batch.upsert(update),
                None => rejected += 1,
            }
        }

        if pong {
            return Ok(InboundFrame::ProbeResponse);
        }
        Ok(InboundFrame::Prices { batch, rejected })
    }
}

/// Outcome of dispatching one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Probe response; round trip if a probe was outstanding
    ProbeResponse(Option<Duration>),
    /// Batch of this many symbols handed to the consumer
    Delivered(usize),
    /// Client already stopped; consumer not invoked
    Suppressed,
    /// Malformed frame dropped
    Dropped,
}

/// Routes inbound frames to the prober or the consumer callback
pub struct MessageDispatcher {
    on_message: Arc<Mutex<PriceCallback>>,
    /// Set by `stop()`; no callback may run once it is visible
    halted: Arc<AtomicBool>,
    metrics: Arc<FeedMetrics>,
}

impl MessageDispatcher {
    pub fn new(
        on_message: Arc<Mutex<PriceCallback>>,
        halted: Arc<AtomicBool>,
        metrics: Arc<FeedMetrics>,
    ) -> Self {
        Self {
            on_message,
            halted,
            metrics,
        }
    }

    /// Handle one inbound frame received at `now`
    pub fn on_frame(&self, raw: &str, prober: &mut HeartbeatProber, now: Instant) -> Dispatch {
        self.metrics.record_frame();

        match decode_frame(raw) {
            Ok(InboundFrame::ProbeResponse) => {
                let rtt = prober.on_response(now);
                match rtt {
                    Some(rtt) => tracing::trace!(rtt_ms = rtt.as_millis() as u64, "probe answered"),
                    None => tracing::debug!("probe response with no probe outstanding"),
                }
                Dispatch::ProbeResponse(rtt)
            }
            Ok(InboundFrame::Prices { batch, rejected }) => {
                if rejected > 0 {
                    tracing::warn!(rejected, "dropped price entries without a finite numeric value");
                    self.metrics.record_rejected(rejected as u64);
                }
                if self.halted.load(Ordering::SeqCst) {
                    return Dispatch::Suppressed;
                }

                let count = batch.len();
                let mut on_message = self.on_message.lock();
                // stop() may have landed while waiting for the lock
                if self.halted.load(Ordering::SeqCst) {
                    return Dispatch::Suppressed;
                }
                (on_message)(batch);
                self.metrics.record_batch();
                Dispatch::Delivered(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = raw.len(), "dropping malformed frame");
                self.metrics.record_malformed();
                Dispatch::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(raw: &str) -> (PriceBatch, usize) {
        match decode_frame(raw).unwrap() {
            InboundFrame::Prices { batch, rejected } => (batch, rejected),
            other => panic!("expected prices, got {:?}", other),
        }
    }

    fn dispatcher() -> (MessageDispatcher, Arc<Mutex<Vec<PriceBatch>>>, Arc<AtomicBool>, Arc<FeedMetrics>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: PriceCallback = Box::new(move |batch| sink.lock().push(batch));
        let halted = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(FeedMetrics::new());
        let d = MessageDispatcher::new(Arc::new(Mutex::new(callback)), halted.clone(), metrics.clone());
        (d, received, halted, metrics)
    }

    #[test]
    fn test_decode_single_price() {
        let (batch, rejected) = prices(r#"{"NOVA": 101.25}"#);
        assert_eq!(rejected, 0);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("NOVA"), Some(101.25));
    }

    #[test]
    fn test_decode_keeps_wire_order() {
        let (batch, _) = prices(r#"{"ZETA": 1, "AURA": 58.10, "NOVA": 101.25}"#);
        let symbols: Vec<&str> = batch.iter().map(|u| u.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ZETA", "AURA", "NOVA"]);
        assert_eq!(batch.get("ZETA"), Some(1.0));
    }

    #[test]
    fn test_decode_rejects_invalid_entries() {
        let (batch, rejected) = prices(r#"{"NOVA": null, "AURA": "58.1", "": 3, "ORBT": {"p": 1}, "KEEP": 7.5}"#);
        assert_eq!(rejected, 4);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("KEEP"), Some(7.5));
    }

    #[test]
    fn test_decode_large_frame() {
        let n = 40_000;
        let mut raw = String::from("{");
        for i in 0..n {
            raw.push_str(&format!("\"S{}\": {}.5, ", i, i));
        }
        raw.push_str("\"S0\": 9.0}");

        let started = std::time::Instant::now();
        let (batch, rejected) = prices(&raw);
        let elapsed = started.elapsed();

        assert_eq!(rejected, 0);
        assert_eq!(batch.len(), n);
        assert_eq!(batch.iter().next().map(|u| u.symbol.as_str()), Some("S0"));
        assert_eq!(batch.iter().last().map(|u| u.symbol.as_str()), Some("S39999"));
        assert_eq!(batch.get("S0"), Some(9.0));
        assert_eq!(batch.get("S20000"), Some(20000.5));
        // linear decode; a quadratic one takes tens of seconds here
        assert!(elapsed < std::time::Duration::from_secs(5), "decode took {:?}", elapsed);
    }

    #[test]
    fn test_decode_empty_object() {
        let (batch, rejected) = prices("{}");
        assert!(batch.is_empty());
        assert_eq!(rejected, 0);
    }

    #[test]
    fn test_decode_pong() {
        let frame = decode_frame(r#"{"type": "pong", "timestamp": 1718000000.5}"#).unwrap();
        assert_eq!(frame, InboundFrame::ProbeResponse);
        assert_eq!(decode_frame("pong").unwrap(), InboundFrame::ProbeResponse);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame("[1, 2, 3]").is_err());
        assert!(decode_frame("42").is_err());
        assert!(decode_frame(r#"{"NOVA": 1"#).is_err());
    }

    #[test]
    fn test_dispatch_delivers_in_order() {
        let (d, received, _, metrics) = dispatcher();
        let mut prober = HeartbeatProber::new(Duration::from_secs(5));
        let now = Instant::now();

        assert_eq!(d.on_frame(r#"{"A": 1}"#, &mut prober, now), Dispatch::Delivered(1));
        assert_eq!(d.on_frame("garbage", &mut prober, now), Dispatch::Dropped);
        assert_eq!(d.on_frame(r#"{"B": 2, "C": 3}"#, &mut prober, now), Dispatch::Delivered(2));

        let got = received.lock();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].get("A"), Some(1.0));
        assert_eq!(got[1].get("C"), Some(3.0));

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_received, 3);
        assert_eq!(snap.batches_delivered, 2);
        assert_eq!(snap.malformed_frames, 1);
    }

    #[test]
    fn test_probe_response_goes_to_prober() {
        let (d, received, _, _) = dispatcher();
        let mut prober = HeartbeatProber::new(Duration::from_secs(5));
        let t0 = Instant::now();
        prober.start(t0);
        prober.on_tick(t0);

        let outcome = d.on_frame(
            r#"{"type":"pong","timestamp":1.0}"#,
            &mut prober,
            t0 + Duration::from_millis(42),
        );
        assert_eq!(outcome, Dispatch::ProbeResponse(Some(Duration::from_millis(42))));
        assert_eq!(prober.latency_ms(), Some(42));
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_halt_while_waiting_for_callback_lock() {
        let (d, received, halted, _) = dispatcher();
        let on_message = d.on_message.clone();

        let outcome = std::thread::scope(|scope| {
            let guard = on_message.lock();
            let worker = scope.spawn(|| {
                let mut prober = HeartbeatProber::new(Duration::from_secs(5));
                d.on_frame(r#"{"NOVA": 1}"#, &mut prober, Instant::now())
            });
            std::thread::sleep(Duration::from_millis(50));
            halted.store(true, Ordering::SeqCst);
            drop(guard);
            worker.join().unwrap()
        });

        assert_eq!(outcome, Dispatch::Suppressed);
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_halted_dispatcher_suppresses_callback() {
        let (d, received, halted, _) = dispatcher();
        let mut prober = HeartbeatProber::new(Duration::from_secs(5));
        halted.store(true, Ordering::SeqCst);

        assert_eq!(d.on_frame(r#"{"NOVA": 1}"#, &mut prober, Instant::now()), Dispatch::Suppressed);
        assert!(received.lock().is_empty());
    }
}
