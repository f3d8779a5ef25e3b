use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::core::Result;

/// Longest sanitized key kept verbatim in a filename
const MAX_STEM_LEN: usize = 96;

/// Partitioned storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionedStorageConfig {
    pub enabled: bool,
    /// Number of on-disk shard directories
    pub partitions: usize,
}

impl Default for PartitionedStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            partitions: 256,
        }
    }
}

/// Per-shard diagnostics, recomputed from the filesystem on demand
#[derive(Debug, Clone, Serialize)]
pub struct PartitionInfo {
    pub partition_id: usize,
    pub partition_dir: PathBuf,
    pub file_count: usize,
}

/// Maps cache keys to shard directories via a stable hash.
///
/// A flat directory hits filesystem directory-entry limits and serializes
/// metadata updates once entry counts grow; sharding bounds both.
pub struct PartitionedStore {
    base_dir: PathBuf,
    config: PartitionedStorageConfig,
}

impl PartitionedStore {
    pub fn new(base_dir: impl Into<PathBuf>, config: PartitionedStorageConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn partition_count(&self) -> usize {
        if self.config.enabled {
            self.config.partitions
        } else {
            1
        }
    }

    /// Pre-create every shard directory
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        if self.config.enabled {
            for id in 0..self.config.partitions {
                fs::create_dir_all(self.partition_dir(id)).await?;
            }
            info!(
                "Partitioned storage initialized: {} shards under {:?}",
                self.config.partitions, self.base_dir
            );
        }
        Ok(())
    }

    /// Deterministic shard index for a key: first four bytes of the key's
    /// SHA-256 digest reduced modulo the partition count. Stable across
    /// calls and process restarts for a fixed partition count.
    pub fn partition_of(&self, key: &str) -> usize {
        let digest = Sha256::digest(key.as_bytes());
        let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        n as usize % self.partition_count()
    }

    pub fn partition_dir(&self, partition_id: usize) -> PathBuf {
        if self.config.enabled {
            self.base_dir
                .join(format!("partition_{:02x}", partition_id))
        } else {
            self.base_dir.clone()
        }
    }

    /// Full path for a key's file inside its shard
    pub fn path_for(&self, key: &str, file_name: &str) -> PathBuf {
        self.partition_dir(self.partition_of(key)).join(file_name)
    }

    /// Filesystem-safe stem for a key. Non-portable characters become `_`;
    /// long or rewritten keys get a digest suffix to stay collision-free.
    pub fn sanitize_key(key: &str) -> String {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if sanitized == key && sanitized.len() <= MAX_STEM_LEN {
            return sanitized;
        }

        let digest = Sha256::digest(key.as_bytes());
        let tag = hex::encode(&digest[..4]);
        let truncated: String = sanitized.chars().take(MAX_STEM_LEN).collect();
        format!("{}-{}", truncated, tag)
    }

    /// Every shard directory that exists on disk
    pub fn partition_dirs(&self) -> Vec<PathBuf> {
        (0..self.partition_count())
            .map(|id| self.partition_dir(id))
            .collect()
    }

    /// Enumerate per-shard file counts for balance diagnostics
    pub async fn all_partition_info(&self) -> Result<Vec<PartitionInfo>> {
        let mut infos = Vec::with_capacity(self.partition_count());
        for id in 0..self.partition_count() {
            let dir = self.partition_dir(id);
            let mut file_count = 0;
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    while let Some(entry) = entries.next_entry().await? {
                        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                            file_count += 1;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            infos.push(PartitionInfo {
                partition_id: id,
                partition_dir: dir,
                file_count,
            });
        }
        debug!(
            "Partition scan: {} shards, {} files",
            infos.len(),
            infos.iter().map(|i| i.file_count).sum::<usize>()
        );
        Ok(infos)
    }

    /// 1 - coefficient of variation of per-shard file counts, clamped to
    /// [0, 1]. 1.0 means perfectly even spread.
    pub fn balance_score(infos: &[PartitionInfo]) -> f64 {
        if infos.is_empty() {
            return 1.0;
        }
        let counts: Vec<f64> = infos.iter().map(|i| i.file_count as f64).collect();
        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        if mean == 0.0 {
            return 1.0;
        }
        let variance =
            counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
        let cv = variance.sqrt() / mean;
        (1.0 - cv).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path, partitions: usize) -> PartitionedStore {
        PartitionedStore::new(
            dir,
            PartitionedStorageConfig {
                enabled: true,
                partitions,
            },
        )
    }

    #[test]
    fn test_partition_determinism() {
        let dir = PathBuf::from("/tmp/unused");
        let a = store(&dir, 256);
        let b = store(&dir, 256);

        for key in ["alpha", "beta", "some:longer:key:with:parts", ""] {
            assert_eq!(a.partition_of(key), b.partition_of(key));
            assert_eq!(a.partition_of(key), a.partition_of(key));
            assert!(a.partition_of(key) < 256);
        }
    }

    #[test]
    fn test_partition_bounds() {
        let dir = PathBuf::from("/tmp/unused");
        let few = store(&dir, 4);
        for i in 0..100 {
            let key = format!("key-{}", i);
            assert!(few.partition_of(&key) < 4);
        }
    }

    #[tokio::test]
    async fn test_init_creates_shards() {
        let dir = tempdir().unwrap();
        let s = store(dir.path(), 8);
        s.init().await.unwrap();

        for id in 0..8 {
            assert!(s.partition_dir(id).is_dir());
        }
        assert_eq!(
            s.partition_dir(7),
            dir.path().join("partition_07"),
            "hex2 naming"
        );
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(PartitionedStore::sanitize_key("plain-key_1.2"), "plain-key_1.2");

        let ugly = PartitionedStore::sanitize_key("config:validate/user@home");
        assert!(!ugly.contains(':') && !ugly.contains('/') && !ugly.contains('@'));
        assert!(ugly.ends_with(|c: char| c.is_ascii_hexdigit()));

        let long = "k".repeat(500);
        let stem = PartitionedStore::sanitize_key(&long);
        assert!(stem.len() <= MAX_STEM_LEN + 9);

        // Distinct ugly keys must not collide
        let a = PartitionedStore::sanitize_key("a:b");
        let b = PartitionedStore::sanitize_key("a_b");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_balance_score() {
        let dir = tempdir().unwrap();
        let s = store(dir.path(), 4);
        s.init().await.unwrap();

        // Empty shards are perfectly balanced
        let infos = s.all_partition_info().await.unwrap();
        assert_eq!(infos.len(), 4);
        assert_eq!(PartitionedStore::balance_score(&infos), 1.0);

        // Skew every file into one shard
        for i in 0..8 {
            tokio::fs::write(s.partition_dir(0).join(format!("f{}.json", i)), b"x")
                .await
                .unwrap();
        }
        let infos = s.all_partition_info().await.unwrap();
        let score = PartitionedStore::balance_score(&infos);
        assert!(score < 0.5, "skewed layout must score low, got {}", score);
    }

    #[test]
    fn test_disabled_partitioning_flattens() {
        let dir = PathBuf::from("/data/cache");
        let s = PartitionedStore::new(
            &dir,
            PartitionedStorageConfig {
                enabled: false,
                partitions: 256,
            },
        );
        assert_eq!(s.partition_count(), 1);
        assert_eq!(s.path_for("anything", "f.json"), dir.join("f.json"));
    }
}
