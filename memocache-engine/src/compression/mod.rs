//! Compression Service
//!
//! Serializes entry envelopes into compressed on-disk form. The inline
//! implementation runs on the calling task; the pooled implementation
//! offloads large payloads to a bounded blocking pool and transparently
//! falls back inline when the pool is saturated.

pub mod compressor;
pub mod pooled;

pub use compressor::{
    CompressionAlgorithm, CompressionConfig, CompressionOutcome, CompressionTotals, Compressor,
    DecompressionOutcome, InlineCompressor,
};
pub use pooled::PooledCompressor;
