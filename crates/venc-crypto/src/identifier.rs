//! 16-byte file identifier: `"VENC"` followed by 12 random bytes.
//!
//! The identifier is both the KDF salt and the link between a container and
//! its recovery key.

use rand::RngCore;
use venc_core::{VencError, VencResult};

use crate::IDENTIFIER_SIZE;

/// Magic prefix of every identifier
pub const IDENTIFIER_MAGIC: &[u8; 4] = b"VENC";

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentifier([u8; IDENTIFIER_SIZE]);

impl FileIdentifier {
    /// Generate a fresh identifier for one encryption run.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IDENTIFIER_SIZE];
        bytes[..IDENTIFIER_MAGIC.len()].copy_from_slice(IDENTIFIER_MAGIC);
        rand::thread_rng().fill_bytes(&mut bytes[IDENTIFIER_MAGIC.len()..]);
        Self(bytes)
    }

    /// Read and validate the identifier at the start of a container.
    pub fn from_prefix(data: &[u8]) -> VencResult<Self> {
        if data.len() < IDENTIFIER_SIZE {
            return Err(VencError::FileTooSmall {
                len: data.len(),
                min: IDENTIFIER_SIZE,
            });
        }
        if !data.starts_with(IDENTIFIER_MAGIC) {
            return Err(VencError::InvalidSystemIdentifier(
                "missing VENC identifier prefix".into(),
            ));
        }
        Ok(Self::from_raw(&data[..IDENTIFIER_SIZE]))
    }

    /// Copy 16 bytes without validating the magic.
    ///
    /// Panics if `bytes` is shorter than [`IDENTIFIER_SIZE`].
    pub(crate) fn from_raw(bytes: &[u8]) -> Self {
        let mut id = [0u8; IDENTIFIER_SIZE];
        id.copy_from_slice(&bytes[..IDENTIFIER_SIZE]);
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_SIZE] {
        &self.0
    }

    pub fn has_magic(&self) -> bool {
        self.0.starts_with(IDENTIFIER_MAGIC)
    }

}

impl std::fmt::Debug for FileIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FileIdentifier")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl std::fmt::Display for FileIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
