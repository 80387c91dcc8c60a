//! Latest-price board
//!
//! Merges every delivered batch into one symbol→price view with a
//! last-updated timestamp. Written from the consumer callback, read by the
//! status API (read-heavy, so `parking_lot::RwLock`).

use super::PriceBatch;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Default)]
struct BoardInner {
    prices: BTreeMap<String, f64>,
    last_updated: Option<SystemTime>,
}

/// Latest known price per symbol
#[derive(Debug, Default)]
pub struct PriceBoard {
    inner: RwLock<BoardInner>,
}

impl PriceBoard {
    /// Create empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch; returns the number of symbols written
    pub fn apply(&self, batch: &PriceBatch) -> usize {
        let mut inner = self.inner.write();
        for update in batch.iter() {
            inner.prices.insert(update.symbol.clone(), update.price);
        }
        inner.last_updated = Some(SystemTime::now());
        batch.len()
    }

    /// Latest price for `symbol`
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.inner.read().prices.get(symbol).copied()
    }

    /// Copy of all prices, sorted by symbol
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.inner.read().prices.clone()
    }

    /// When the last batch was applied
    pub fn last_updated(&self) -> Option<SystemTime> {
        self.inner.read().last_updated
    }

    /// Number of symbols seen
    pub fn len(&self) -> usize {
        self.inner.read().prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().prices.is_empty()
    }
}
