use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Digest algorithm used for entry integrity checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Sha1,
    Md5,
}

/// Integrity digests computed over a serialized payload.
///
/// Never mutated after computation: verification recomputes a fresh
/// `ChecksumResult` and compares field by field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecksumResult {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
    pub algorithm: ChecksumAlgorithm,
    pub timestamp: u64,
    pub data_size: usize,
}

/// A single cached value with its lifecycle metadata.
///
/// Owned exclusively by the cache manager; this is also the on-disk envelope
/// (serialized as JSON, optionally compressed as a whole file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    /// Creation time (ms since epoch)
    pub timestamp: u64,
    /// Caller-supplied input hash, compared on lookup when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Serialized payload size in bytes
    pub size: usize,
    /// Whether the on-disk file for this entry is compressed
    pub compressed: bool,
    pub access_count: u64,
    pub last_accessed: u64,
    /// Time-to-live in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    pub checksum: ChecksumResult,
}

impl CacheEntry {
    /// An entry is stale once `now - timestamp` exceeds its TTL
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl {
            Some(ttl) => now_ms.saturating_sub(self.timestamp) > ttl,
            None => false,
        }
    }

    /// Compare against a caller-supplied input hash. No input hash means
    /// the entry matches unconditionally.
    pub fn matches_input_hash(&self, input_hash: Option<&str>) -> bool {
        match input_hash {
            Some(h) => self.hash.as_deref() == Some(h),
            None => true,
        }
    }

    /// Record an access for LRU/metadata purposes
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = now_millis();
    }
}

/// Point-in-time process memory snapshot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    /// Bytes tracked by the cache's own accounting
    pub heap_bytes: usize,
    /// Resident set estimate for the process
    pub rss_bytes: usize,
    /// Memory still available to the process
    pub available_bytes: usize,
    /// rss / configured ceiling, in [0, 1+]
    pub usage_percentage: f64,
    pub timestamp: u64,
}

/// Memory pressure classification, ordered by severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

/// A single operation inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOperation {
    Get {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_hash: Option<String>,
    },
    Set {
        key: String,
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_hash: Option<String>,
    },
    Delete {
        key: String,
    },
    Has {
        key: String,
    },
}

impl BatchOperation {
    pub fn key(&self) -> &str {
        match self {
            BatchOperation::Get { key, .. }
            | BatchOperation::Set { key, .. }
            | BatchOperation::Delete { key }
            | BatchOperation::Has { key } => key,
        }
    }
}

/// Per-operation outcome of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub key: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Lifecycle events published for external observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Created {
        key: String,
        size: usize,
        compressed: bool,
    },
    Evicted {
        key: String,
        bytes_freed: usize,
    },
    Invalidated {
        key: String,
        reason: String,
    },
    Expired {
        key: String,
    },
}

/// Sink for lifecycle events. The engine never depends on a sink being
/// registered; a `None` sink drops events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: CacheEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_ttl(ttl: Option<u64>) -> CacheEntry {
        CacheEntry {
            data: serde_json::json!({"v": 1}),
            timestamp: now_millis(),
            hash: Some("abc".to_string()),
            size: 8,
            compressed: false,
            access_count: 0,
            last_accessed: now_millis(),
            ttl,
            checksum: ChecksumResult {
                primary: String::new(),
                secondary: None,
                hmac: None,
                algorithm: ChecksumAlgorithm::Sha256,
                timestamp: now_millis(),
                data_size: 8,
            },
        }
    }

    #[test]
    fn test_ttl_expiry() {
        let mut entry = entry_with_ttl(Some(50));
        assert!(!entry.is_expired(entry.timestamp + 10));
        assert!(entry.is_expired(entry.timestamp + 51));

        entry.ttl = None;
        assert!(!entry.is_expired(entry.timestamp + 1_000_000));
    }

    #[test]
    fn test_input_hash_match() {
        let entry = entry_with_ttl(None);
        assert!(entry.matches_input_hash(None));
        assert!(entry.matches_input_hash(Some("abc")));
        assert!(!entry.matches_input_hash(Some("def")));
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = entry_with_ttl(Some(1000));
        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, entry.data);
        assert_eq!(back.ttl, Some(1000));
        assert_eq!(back.checksum.algorithm, ChecksumAlgorithm::Sha256);
    }
}
