//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Eviction: Trims the persistent store back under its bounds at configured intervals

mod eviction;

pub use eviction::spawn_eviction_task;
