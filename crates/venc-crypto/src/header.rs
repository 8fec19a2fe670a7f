//! Integrity header: plaintext digest and original filename
//!
//! Header format (binary):
//! ```text
//! [32 bytes: "VENC_FILE_ENCRYPTION_SYSTEM_2025"]
//! [4 bytes: digest length, u32 little-endian]
//! [N bytes: SHA-256 digest of the plaintext]
//! [256 bytes: base64 of the UTF-8 filename, zero padded / truncated]
//! ```
//!
//! The header is not encrypted. The wrapped key before it has no recorded
//! length, so readers locate the header by scanning for the magic.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;
use venc_core::{VencError, VencResult};

use crate::IDENTIFIER_SIZE;

/// Magic at the start of every integrity header
pub const SYSTEM_MAGIC: &[u8; 32] = b"VENC_FILE_ENCRYPTION_SYSTEM_2025";

/// Size of the filename slot
pub const FILENAME_SLOT_SIZE: usize = 256;

/// Stored when the caller gives no filename
pub const UNNAMED_FILE: &str = "unnamed_file";

/// Returned when the stored filename is missing or cannot be decoded
pub const DEFAULT_FILENAME: &str = "decrypted_file";

const LENGTH_FIELD_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityHeader {
    digest: Vec<u8>,
    name_slot: [u8; FILENAME_SLOT_SIZE],
}

impl IntegrityHeader {
    /// Build a header for `digest` and the original filename.
    ///
    /// The filename is base64-encoded; encodings longer than the slot are
    /// truncated to its first 256 bytes.
    pub fn build(digest: &[u8], filename: Option<&str>) -> Self {
        let encoded = match filename {
            Some(name) if !name.is_empty() => STANDARD.encode(name.as_bytes()),
            _ => UNNAMED_FILE.to_string(),
        };

        let mut name_slot = [0u8; FILENAME_SLOT_SIZE];
        let n = encoded.len().min(FILENAME_SLOT_SIZE);
        name_slot[..n].copy_from_slice(&encoded.as_bytes()[..n]);

        Self {
            digest: digest.to_vec(),
            name_slot,
        }
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Raw filename slot: base64 text, NUL-padded
    pub fn name_slot(&self) -> &[u8; FILENAME_SLOT_SIZE] {
        &self.name_slot
    }

    /// Decode the stored filename, falling back to [`DEFAULT_FILENAME`].
    ///
    /// A multi-byte character cut by slot truncation is dropped.
    pub fn filename(&self) -> String {
        let end = self
            .name_slot
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_SLOT_SIZE);
        let text = match std::str::from_utf8(&self.name_slot[..end]) {
            Ok(s) => s.trim(),
            Err(_) => {
                warn!("filename slot is not ASCII; using default name");
                return DEFAULT_FILENAME.to_string();
            }
        };
        if text.is_empty() || text == UNNAMED_FILE {
            return DEFAULT_FILENAME.to_string();
        }

        let bytes = match STANDARD.decode(text) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "filename decoding failed; using default name");
                return DEFAULT_FILENAME.to_string();
            }
        };

        let name = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) if e.utf8_error().error_len().is_none() => {
                let valid = e.utf8_error().valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).unwrap_or_default()
            }
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        if name.is_empty() {
            DEFAULT_FILENAME.to_string()
        } else {
            name
        }
    }

    /// Serialized length in bytes
    pub fn encoded_len(&self) -> usize {
        SYSTEM_MAGIC.len() + LENGTH_FIELD_SIZE + self.digest.len() + FILENAME_SLOT_SIZE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(SYSTEM_MAGIC);
        out.extend_from_slice(&(self.digest.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.name_slot);
        out
    }

    /// Parse a header at the start of `buf`.
    ///
    /// Returns the header and the number of bytes it occupies.
    pub fn parse(buf: &[u8]) -> VencResult<(Self, usize)> {
        if buf.len() < SYSTEM_MAGIC.len() {
            return Err(VencError::CannotLocateHeader(format!(
                "{} bytes left, header magic needs {}",
                buf.len(),
                SYSTEM_MAGIC.len()
            )));
        }
        if &buf[..SYSTEM_MAGIC.len()] != SYSTEM_MAGIC {
            return Err(VencError::InvalidSystemIdentifier(
                "integrity header magic mismatch".into(),
            ));
        }
        let mut offset = SYSTEM_MAGIC.len();

        let length_field = buf
            .get(offset..offset + LENGTH_FIELD_SIZE)
            .ok_or_else(|| VencError::CannotLocateHeader("truncated digest length".into()))?;
        let digest_len =
            u32::from_le_bytes([length_field[0], length_field[1], length_field[2], length_field[3]])
                as usize;
        offset += LENGTH_FIELD_SIZE;

        let digest = buf
            .get(offset..offset.saturating_add(digest_len))
            .ok_or_else(|| {
                VencError::CannotLocateHeader(format!("truncated digest ({digest_len} bytes)"))
            })?
            .to_vec();
        offset += digest_len;

        let slot = buf
            .get(offset..offset + FILENAME_SLOT_SIZE)
            .ok_or_else(|| VencError::CannotLocateHeader("truncated filename slot".into()))?;
        let mut name_slot = [0u8; FILENAME_SLOT_SIZE];
        name_slot.copy_from_slice(slot);
        offset += FILENAME_SLOT_SIZE;

        Ok((Self { digest, name_slot }, offset))
    }
}

/// Where a header was found inside a container
#[derive(Debug, Clone)]
pub struct HeaderLocation {
    /// Offset of the magic within the container
    pub offset: usize,
    /// Bytes the header occupies
    pub len: usize,
    pub header: IntegrityHeader,
}

impl HeaderLocation {
    /// Offset of the first byte after the header
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Find the integrity header by scanning for its magic after the identifier.
///
/// Candidate offsets `16..=16 + max_scan` are examined; a magic match that
/// fails to parse is skipped.
pub fn locate_header(data: &[u8], max_scan: usize) -> VencResult<HeaderLocation> {
    let start = IDENTIFIER_SIZE;
    let last_possible = match data.len().checked_sub(SYSTEM_MAGIC.len()) {
        Some(last) if last >= start => last,
        _ => {
            return Err(VencError::CannotLocateHeader(format!(
                "container of {} bytes is too small to hold a header",
                data.len()
            )))
        }
    };
    let last = last_possible.min(start.saturating_add(max_scan));

    for offset in start..=last {
        if &data[offset..offset + SYSTEM_MAGIC.len()] != SYSTEM_MAGIC {
            continue;
        }
        match IntegrityHeader::parse(&data[offset..]) {
            Ok((header, len)) => return Ok(HeaderLocation { offset, len, header }),
            Err(e) => {
                warn!(offset, error = %e, "header magic found but header did not parse");
            }
        }
    }

    Err(VencError::CannotLocateHeader(format!(
        "no header magic within {} bytes after the identifier",
        last - start + 1
    )))
}
