//! # Read tracking
//!
//! Client-side read state without server read receipts. Each conversation
//! has a last-read watermark persisted per user; unread counts are derived by
//! comparing message timestamps against it on a polling schedule.

mod errors;
mod store;
mod tracker;

#[cfg(test)]
mod tracker_tests;

pub use errors::{FetchError, StorageError, StorageResult};
pub use store::{FileStore, KeyValueStore, MemoryStore, WatermarkMap, WatermarkStore, watermark_key};
pub use tracker::{
    Clock, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, MessageSource, PollingHandle, ReadTracker, SystemClock,
    TrackerOptions, UnreadSnapshot, count_unread,
};
