//! Content key generation and AES-256-GCM key wrapping

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use tracing::debug;
use venc_core::{VencError, VencResult};
use zeroize::Zeroize;

use crate::kdf::Kek;
use crate::{KEY_SIZE, MIN_WRAPPED_KEY_SIZE, NONCE_SIZE};

/// A per-file 256-bit content encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ContentKey::from_bytes(bytes)
}

/// Wrap (encrypt) a content key under a KEK.
///
/// Uses AES-256-GCM with a fresh random nonce and no associated data.
/// Output: `[12-byte nonce][ciphertext + 16-byte tag]`
pub fn wrap_key(kek: &Kek, key: &ContentKey) -> VencResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(kek.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, key.as_bytes().as_ref())
        .map_err(|e| anyhow::anyhow!("key wrapping failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Unwrap (decrypt) a content key with a KEK.
///
/// Input: `[12-byte nonce][ciphertext + 16-byte tag]` (output of `wrap_key`)
pub fn unwrap_key(kek: &Kek, wrapped: &[u8]) -> VencResult<ContentKey> {
    if wrapped.len() < MIN_WRAPPED_KEY_SIZE {
        return Err(VencError::FileTooSmall {
            len: wrapped.len(),
            min: MIN_WRAPPED_KEY_SIZE,
        });
    }

    let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(kek.as_bytes().into());

    let mut plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
        VencError::Authentication("key unwrapping failed: wrong password or corrupted key".into())
    })?;

    if plaintext.len() != KEY_SIZE {
        let len = plaintext.len();
        plaintext.zeroize();
        return Err(VencError::DecryptionFailed(format!(
            "unwrapped key has wrong size: {len} bytes (expected {KEY_SIZE})"
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(ContentKey::from_bytes(key_bytes))
}

/// Unwrap a content key whose wrapped length is not recorded.
///
/// `data` starts right after the file identifier. Prefixes of increasing
/// length are tried, starting at the minimum wrapped size, for at most
/// `max_attempts` lengths. Returns the key and the wrapped length that
/// authenticated.
pub fn unwrap_key_scanning(
    kek: &Kek,
    data: &[u8],
    max_attempts: usize,
) -> VencResult<(ContentKey, usize)> {
    let last = data
        .len()
        .min(MIN_WRAPPED_KEY_SIZE.saturating_add(max_attempts).saturating_sub(1));

    for len in MIN_WRAPPED_KEY_SIZE..=last {
        match unwrap_key(kek, &data[..len]) {
            Ok(key) => {
                debug!(wrapped_len = len, "content key unwrapped");
                return Ok((key, len));
            }
            Err(VencError::Authentication(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(VencError::Authentication(
        "password decryption failed: wrong password or corrupted key block".into(),
    ))
}
