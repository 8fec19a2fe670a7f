use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{VencError, VencResult};

/// Top-level configuration (loaded from venc.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VencConfig {
    pub crypto: CryptoConfig,
    pub log: LogConfig,
    pub output: OutputConfig,
}

/// Engine parameters.
///
/// `kdf_iterations` and `chunk_size` are part of the on-disk format: files
/// written with non-default values can only be read back with the same values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iterations (default: 100000)
    pub kdf_iterations: u32,
    /// Plaintext bytes per AEAD chunk (default: 8 MiB)
    pub chunk_size: usize,
    /// Chunks sealed/opened per parallel batch (0 = rayon thread count, 1 = sequential)
    pub parallelism: usize,
    /// Bytes after the identifier searched for the integrity header magic
    pub max_header_scan: usize,
    /// Wrapped-key lengths tried when unwrapping with a password
    pub max_unwrap_attempts: usize,
    /// Offsets tried when locating the start of the ciphertext
    pub max_content_scan: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 100_000,
            chunk_size: 8 * 1024 * 1024,
            parallelism: 0,
            max_header_scan: 4096,
            max_unwrap_attempts: 50,
            max_content_scan: 64,
        }
    }
}

impl CryptoConfig {
    /// Largest accepted chunk size (1 GiB)
    pub const MAX_CHUNK_SIZE: usize = 1 << 30;

    pub fn validate(&self) -> VencResult<()> {
        if self.kdf_iterations == 0 {
            return Err(VencError::Config("kdf_iterations must be at least 1".into()));
        }
        if self.chunk_size == 0 || self.chunk_size > Self::MAX_CHUNK_SIZE {
            return Err(VencError::Config(format!(
                "chunk_size must be in 1..={} (got {})",
                Self::MAX_CHUNK_SIZE,
                self.chunk_size
            )));
        }
        if self.max_header_scan == 0
            || self.max_unwrap_attempts == 0
            || self.max_content_scan == 0
        {
            return Err(VencError::Config(
                "max_header_scan, max_unwrap_attempts and max_content_scan must be at least 1"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output directory (default: next to the input file)
    pub dir: Option<PathBuf>,
    /// Extension of recovery key files, without the dot
    pub recovery_key_extension: String,
    /// Replace existing output files instead of refusing
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            recovery_key_extension: "vkey".into(),
            overwrite: false,
        }
    }
}
