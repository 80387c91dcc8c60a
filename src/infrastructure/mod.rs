//! Infrastructure - cold path only
//!
//! This module contains code off the frame-handling path:
//! - Logging and metrics
//! - Configuration management
//! - Status API

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

pub use metrics::{FeedMetrics, MetricsSnapshot};
