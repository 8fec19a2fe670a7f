//! Recovery key ("escrow") format
//!
//! An escrow blob lets a file be decrypted without its password:
//! ```text
//! [16 bytes: file identifier][wrapped content key under the recovery KEK]
//! ```
//! The recovery KEK is derived from the placeholder password with the file
//! identifier as salt, so the blob is only as secret as the file it sits next to.

use venc_core::{VencError, VencResult};

use crate::identifier::FileIdentifier;
use crate::{IDENTIFIER_SIZE, MIN_WRAPPED_KEY_SIZE};

#[derive(Clone, PartialEq, Eq)]
pub struct EscrowBlob {
    identifier: FileIdentifier,
    wrapped_key: Vec<u8>,
}

impl EscrowBlob {
    pub fn new(identifier: FileIdentifier, wrapped_key: Vec<u8>) -> Self {
        Self {
            identifier,
            wrapped_key,
        }
    }

    pub fn identifier(&self) -> &FileIdentifier {
        &self.identifier
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    /// Whether this blob belongs to the container with `identifier`.
    pub fn matches(&self, identifier: &FileIdentifier) -> bool {
        self.identifier == *identifier
    }

    /// Raw form, as written to `.vkey` files
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IDENTIFIER_SIZE + self.wrapped_key.len());
        out.extend_from_slice(self.identifier.as_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out
    }

    /// Parse the raw form.
    ///
    /// The identifier magic is not checked here; a blob whose identifier does
    /// not match the container is rejected at decryption time instead.
    pub fn from_bytes(data: &[u8]) -> VencResult<Self> {
        let min = IDENTIFIER_SIZE + MIN_WRAPPED_KEY_SIZE;
        if data.len() < min {
            return Err(VencError::InvalidEscrow(format!(
                "recovery key is {} bytes, need at least {min}",
                data.len()
            )));
        }
        let (identifier, wrapped) = data.split_at(IDENTIFIER_SIZE);
        Ok(Self::new(FileIdentifier::from_raw(identifier), wrapped.to_vec()))
    }

    /// Armored text form for copy/paste transport
    pub fn to_base64(&self) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(text: &str) -> VencResult<Self> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| VencError::InvalidEscrow(format!("base64 decode: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for EscrowBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowBlob")
            .field("identifier", &self.identifier)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .finish()
    }
}
