//! Price update types
//!
//! A `PriceBatch` is everything one data frame carried: symbol→price pairs
//! in wire order, each symbol at most once, every price finite.

use std::collections::HashMap;

/// Latest price for one ticker symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    /// Ticker symbol, e.g. `NOVA`
    pub symbol: String,
    /// Price (always finite)
    pub price: f64,
}

impl PriceUpdate {
    /// Create update; None unless the symbol is non-empty and the price finite
    pub fn new(symbol: impl Into<String>, price: f64) -> Option<Self> {
        let symbol = symbol.into();
        if symbol.is_empty() || !price.is_finite() {
            return None;
        }
        Some(Self { symbol, price })
    }
}

/// Ordered symbol→price mapping decoded from a single frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBatch {
    updates: Vec<PriceUpdate>,
    /// Symbol -> position in `updates`
    index: HashMap<String, usize>,
}

impl PriceBatch {
    /// Create empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a symbol's price
    ///
    /// A repeated symbol keeps its first position and takes the newer price.
    pub fn upsert(&mut self, update: PriceUpdate) {
        match self.index.get(&update.symbol) {
            Some(&pos) => self.updates[pos].price = update.price,
            None => {
                self.index.insert(update.symbol.clone(), self.updates.len());
                self.updates.push(update);
            }
        }
    }

    /// Price for `symbol`, if present
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.index.get(symbol).map(|&pos| self.updates[pos].price)
    }

    /// Updates in wire order
    pub fn iter(&self) -> impl Iterator<Item = &PriceUpdate> {
        self.updates.iter()
    }

    /// Number of symbols
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

impl IntoIterator for PriceBatch {
    type Item = PriceUpdate;
    type IntoIter = std::vec::IntoIter<PriceUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

impl FromIterator<PriceUpdate> for PriceBatch {
    fn from_iter<I: IntoIterator<Item = PriceUpdate>>(iter: I) -> Self {
        let mut batch = PriceBatch::new();
        for update in iter {
            batch.upsert(update);
        }
        batch
    }
}
