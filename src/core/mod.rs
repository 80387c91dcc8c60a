//! Core price types
//!
//! - PriceUpdate: one symbol→price pair with a finite price
//! - PriceBatch: ordered pairs decoded from a single frame
//! - PriceBoard: latest price per symbol across batches

pub mod market_data;
pub mod price_board;

pub use market_data::{PriceBatch, PriceUpdate};
pub use price_board::PriceBoard;
