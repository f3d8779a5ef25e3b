//! Checksum Validator
//!
//! Computes and verifies integrity digests over serialized payloads. Every
//! verification recomputes fresh digests and compares them; mismatches are
//! reported with the specific failing check, never as a generic failure.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;

use crate::core::{ChecksumAlgorithm, ChecksumResult, now_millis};

type HmacSha256 = Hmac<Sha256>;

/// Checksum configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    /// Primary digest algorithm
    pub algorithm: ChecksumAlgorithm,
    /// Optional secondary digest for defense in depth
    pub secondary: Option<ChecksumAlgorithm>,
    /// Key for an additional HMAC-SHA256 digest; `None` disables HMAC
    pub hmac_key: Option<String>,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            secondary: None,
            hmac_key: None,
        }
    }
}

/// Which checks ran during a validation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationDetails {
    pub primary_checked: bool,
    pub secondary_checked: bool,
    pub hmac_checked: bool,
    pub size_checked: bool,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub details: ValidationDetails,
    pub errors: Vec<String>,
}

/// Stateless digest computation and comparison
pub struct ChecksumValidator {
    config: ChecksumConfig,
}

impl ChecksumValidator {
    pub fn new(config: ChecksumConfig) -> Self {
        Self { config }
    }

    fn digest(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
        match algorithm {
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            ChecksumAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        }
    }

    fn keyed_hmac(key: &str, data: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Compute digests over `data`, optionally concatenated with serialized
    /// metadata, using the configured algorithms.
    pub fn calculate(&self, data: &[u8], metadata: Option<&[u8]>) -> ChecksumResult {
        let mut input = data.to_vec();
        if let Some(meta) = metadata {
            input.extend_from_slice(meta);
        }

        ChecksumResult {
            primary: Self::digest(self.config.algorithm, &input),
            secondary: self
                .config
                .secondary
                .map(|algo| Self::digest(algo, &input)),
            hmac: self
                .config
                .hmac_key
                .as_deref()
                .map(|key| Self::keyed_hmac(key, &input)),
            algorithm: self.config.algorithm,
            timestamp: now_millis(),
            data_size: data.len(),
        }
    }

    /// Recompute digests for `data` and compare against `expected`.
    ///
    /// The recorded algorithm is honored even when it differs from the
    /// current configuration, so entries written under older settings still
    /// verify.
    pub fn validate(&self, data: &[u8], expected: &ChecksumResult) -> ValidationReport {
        self.validate_with_metadata(data, None, expected)
    }

    pub fn validate_with_metadata(
        &self,
        data: &[u8],
        metadata: Option<&[u8]>,
        expected: &ChecksumResult,
    ) -> ValidationReport {
        let mut details = ValidationDetails::default();
        let mut errors = Vec::new();

        let mut input = data.to_vec();
        if let Some(meta) = metadata {
            input.extend_from_slice(meta);
        }

        details.size_checked = true;
        if data.len() != expected.data_size {
            errors.push(format!(
                "size mismatch: expected {} bytes, got {}",
                expected.data_size,
                data.len()
            ));
        }

        details.primary_checked = true;
        let primary = Self::digest(expected.algorithm, &input);
        if primary != expected.primary {
            errors.push(format!(
                "primary checksum mismatch: expected {}, got {}",
                expected.primary, primary
            ));
        }

        if let Some(expected_secondary) = &expected.secondary {
            if let Some(algo) = self.config.secondary {
                details.secondary_checked = true;
                let secondary = Self::digest(algo, &input);
                if &secondary != expected_secondary {
                    errors.push(format!(
                        "secondary checksum mismatch: expected {}, got {}",
                        expected_secondary, secondary
                    ));
                }
            }
        }

        if let Some(expected_hmac) = &expected.hmac {
            if let Some(key) = self.config.hmac_key.as_deref() {
                details.hmac_checked = true;
                let hmac = Self::keyed_hmac(key, &input);
                if &hmac != expected_hmac {
                    errors.push("HMAC mismatch".to_string());
                }
            }
        }

        if !errors.is_empty() {
            debug!("Checksum validation failed: {}", errors.join("; "));
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            details,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_and_validate() {
        let validator = ChecksumValidator::new(ChecksumConfig::default());
        let data = b"cached payload bytes";

        let result = validator.calculate(data, None);
        assert_eq!(result.data_size, data.len());
        assert_eq!(result.algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(result.primary.len(), 64);

        let report = validator.validate(data, &result);
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.details.primary_checked);
        assert!(report.details.size_checked);
    }

    #[test]
    fn test_primary_mismatch_reported() {
        let validator = ChecksumValidator::new(ChecksumConfig::default());
        let result = validator.calculate(b"original", None);

        let report = validator.validate(b"tampered", &result);
        assert!(!report.is_valid);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("primary checksum mismatch"))
        );
        assert!(report.errors.iter().any(|e| e.contains("size mismatch")));
    }

    #[test]
    fn test_secondary_and_hmac() {
        let config = ChecksumConfig {
            algorithm: ChecksumAlgorithm::Sha256,
            secondary: Some(ChecksumAlgorithm::Sha1),
            hmac_key: Some("secret".to_string()),
        };
        let validator = ChecksumValidator::new(config);

        let result = validator.calculate(b"payload", None);
        assert!(result.secondary.is_some());
        assert!(result.hmac.is_some());

        let report = validator.validate(b"payload", &result);
        assert!(report.is_valid);
        assert!(report.details.secondary_checked);
        assert!(report.details.hmac_checked);
    }

    #[test]
    fn test_hmac_key_change_detected() {
        let config = ChecksumConfig {
            hmac_key: Some("key-one".to_string()),
            ..Default::default()
        };
        let result = ChecksumValidator::new(config).calculate(b"payload", None);

        let other = ChecksumValidator::new(ChecksumConfig {
            hmac_key: Some("key-two".to_string()),
            ..Default::default()
        });
        let report = other.validate(b"payload", &result);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("HMAC")));
    }

    #[test]
    fn test_all_algorithms() {
        for algo in [
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Sha512,
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Md5,
        ] {
            let validator = ChecksumValidator::new(ChecksumConfig {
                algorithm: algo,
                ..Default::default()
            });
            let result = validator.calculate(b"abc", None);
            assert!(validator.validate(b"abc", &result).is_valid);
            assert!(!validator.validate(b"abd", &result).is_valid);
        }
    }

    #[test]
    fn test_metadata_affects_digest() {
        let validator = ChecksumValidator::new(ChecksumConfig::default());
        let plain = validator.calculate(b"data", None);
        let with_meta = validator.calculate(b"data", Some(b"meta"));
        assert_ne!(plain.primary, with_meta.primary);

        let report = validator.validate_with_metadata(b"data", Some(b"meta"), &with_meta);
        assert!(report.is_valid);
    }
}
