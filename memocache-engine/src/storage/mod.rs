//! On-disk storage
//!
//! Crash-safe file writes (temp-file-then-rename with backup/restore) and
//! hash-partitioned directory layout for the disk tier.

pub mod atomic;
pub mod partition;

pub use atomic::{AtomicFile, AtomicWriteConfig};
pub use partition::{PartitionInfo, PartitionedStorageConfig, PartitionedStore};
