//! Key derivation: PBKDF2-HMAC-SHA256 password → key-encryption key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use venc_core::{VencError, VencResult};
use zeroize::Zeroize;

use crate::identifier::FileIdentifier;
use crate::KEY_SIZE;

/// Password substituted when none is given; the recovery key is wrapped under it.
pub const PLACEHOLDER_PASSWORD: &str = "VENCRKEY";

/// PBKDF2 iteration count used by the container format
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// A 256-bit key-encryption key. Only ever wraps or unwraps a content key.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct Kek {
    bytes: [u8; KEY_SIZE],
}

impl Kek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Kek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("bytes", &"[REDACTED]").finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 100000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

/// Derive a KEK from a password, salted with the file identifier.
///
/// An absent or empty password derives from [`PLACEHOLDER_PASSWORD`] instead,
/// which makes the result identical to [`derive_recovery_kek`].
pub fn derive_kek(
    password: Option<&SecretString>,
    salt: &FileIdentifier,
    params: &KdfParams,
) -> VencResult<Kek> {
    if params.iterations == 0 {
        return Err(VencError::Config(
            "PBKDF2 iteration count must be at least 1".into(),
        ));
    }

    let secret = password
        .map(|p| p.expose_secret())
        .filter(|p| !p.is_empty())
        .unwrap_or(PLACEHOLDER_PASSWORD);

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), params.iterations, &mut key);

    Ok(Kek::from_bytes(key))
}

/// Derive the KEK that wraps the recovery-key copy of the content key.
pub fn derive_recovery_kek(salt: &FileIdentifier, params: &KdfParams) -> VencResult<Kek> {
    derive_kek(None, salt, params)
}
