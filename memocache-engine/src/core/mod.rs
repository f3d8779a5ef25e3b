pub mod error;
pub mod types;

pub use error::{CacheError, Result};
pub use types::{
    BatchOperation, BatchResult, CacheEntry, CacheEvent, ChecksumAlgorithm, ChecksumResult,
    EventSink, MemoryStats, PressureLevel, now_millis,
};
