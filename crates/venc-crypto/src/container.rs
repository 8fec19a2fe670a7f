//! Container assembly and ciphertext location
//!
//! Container format (binary):
//! ```text
//! [16 bytes: identifier][wrapped key][integrity header][12 bytes: nonce][chunks...]
//! ```

use tracing::{debug, warn};
use venc_core::{VencError, VencResult};

use crate::chunk::{probe_first_chunk, ChunkOptions};
use crate::header::{HeaderLocation, IntegrityHeader};
use crate::identifier::FileIdentifier;
use crate::keys::ContentKey;
use crate::{IDENTIFIER_SIZE, MIN_WRAPPED_KEY_SIZE, NONCE_SIZE};

/// Concatenate the parts of a container.
pub fn assemble(
    identifier: &FileIdentifier,
    wrapped_key: &[u8],
    header: &IntegrityHeader,
    content: &[u8],
) -> Vec<u8> {
    let header_bytes = header.to_bytes();
    let mut out = Vec::with_capacity(
        IDENTIFIER_SIZE + wrapped_key.len() + header_bytes.len() + content.len(),
    );
    out.extend_from_slice(identifier.as_bytes());
    out.extend_from_slice(wrapped_key);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(content);
    out
}

/// Find the offset where the encrypted content (nonce + chunks) begins.
///
/// The byte right after the header is tried first. Failing that, offsets
/// from `16 + 28 + header length` forward are tried, at most `max_scan` of
/// them; the first whose first chunk authenticates under `key` wins.
///
/// When nothing authenticates, an authentication failure at the offset right
/// after the header is reported as such (tampering or corruption); otherwise
/// the result is `DecryptionFailed`.
pub fn locate_content(
    data: &[u8],
    key: &ContentKey,
    location: &HeaderLocation,
    options: &ChunkOptions,
    max_scan: usize,
) -> VencResult<usize> {
    let exact = location.end();
    let exact_failure = match probe_first_chunk(key, &data[exact..], options) {
        Ok(()) => return Ok(exact),
        Err(e @ VencError::Authentication(_)) => Some(e),
        Err(VencError::DecryptionFailed(_)) => None,
        Err(e) => return Err(e),
    };

    // Off the canonical offset, a nonce-only region proves nothing.
    let nominal = IDENTIFIER_SIZE + MIN_WRAPPED_KEY_SIZE + location.len;
    let scan_end = data.len().saturating_sub(NONCE_SIZE);
    for offset in (nominal..scan_end).take(max_scan) {
        if offset == exact {
            continue;
        }
        if probe_first_chunk(key, &data[offset..], options).is_ok() {
            warn!(offset, expected = exact, "ciphertext found at a non-canonical offset");
            return Ok(offset);
        }
    }

    debug!(exact, nominal, max_scan, "no ciphertext offset authenticated");
    Err(exact_failure.unwrap_or_else(|| {
        VencError::DecryptionFailed(format!(
            "no ciphertext start found within {max_scan} offsets of {nominal}"
        ))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::encrypt_chunks;
    use crate::header::locate_header;
    use crate::kdf::Kek;
    use crate::keys::{generate_content_key, wrap_key};
    use tokio_util::sync::CancellationToken;

    fn options() -> ChunkOptions {
        ChunkOptions {
            chunk_size: 32,
            parallelism: 1,
        }
    }

    fn build(plaintext: &[u8], key: &ContentKey) -> (Vec<u8>, usize) {
        let identifier = FileIdentifier::generate();
        let wrapped = wrap_key(&Kek::from_bytes([1u8; 32]), key).unwrap();
        let header = IntegrityHeader::build(&[0xEE; 32], Some("x.bin"));
        let content =
            encrypt_chunks(key, plaintext, &options(), None, &CancellationToken::new()).unwrap();
        let data = assemble(&identifier, &wrapped, &header, &content);
        let content_start = data.len() - content.len();
        (data, content_start)
    }

    #[test]
    fn test_assemble_layout() {
        let key = generate_content_key();
        let (data, content_start) = build(b"hello", &key);

        assert_eq!(&data[..4], b"VENC");
        // 16 identifier + 60 wrapped key + 324 header
        assert_eq!(content_start, 16 + 60 + 324);
        assert_eq!(data.len(), content_start + 12 + 5 + 16);
    }

    #[test]
    fn test_locate_content_at_header_end() {
        let key = generate_content_key();
        let (data, content_start) = build(&[7u8; 100], &key);
        let location = locate_header(&data, 4096).unwrap();

        let offset = locate_content(&data, &key, &location, &options(), 64).unwrap();
        assert_eq!(offset, content_start);
    }

    #[test]
    fn test_locate_content_scans_forward() {
        let key = generate_content_key();
        let (mut data, content_start) = build(&[7u8; 100], &key);
        let location = locate_header(&data, 4096).unwrap();

        // padding between header and ciphertext moves the real start
        data.splice(content_start..content_start, [0u8; 3]);

        let offset = locate_content(&data, &key, &location, &options(), 64).unwrap();
        assert_eq!(offset, content_start + 3);
    }

    #[test]
    fn test_locate_content_tampered_reports_authentication() {
        let key = generate_content_key();
        let (mut data, content_start) = build(&[7u8; 100], &key);
        let location = locate_header(&data, 4096).unwrap();
        data[content_start + 12 + 3] ^= 0x80;

        let result = locate_content(&data, &key, &location, &options(), 64);
        assert!(matches!(result, Err(VencError::Authentication(_))));
    }

    #[test]
    fn test_locate_content_truncated_reports_decryption_failed() {
        let key = generate_content_key();
        let (data, content_start) = build(b"", &key);
        let location = locate_header(&data, 4096).unwrap();
        let truncated = &data[..content_start + 4];

        let result = locate_content(truncated, &key, &location, &options(), 64);
        assert!(matches!(result, Err(VencError::DecryptionFailed(_))));
    }

    #[test]
    fn test_scan_never_accepts_nonce_only_tail() {
        let key = generate_content_key();
        let (mut data, content_start) = build(b"tiny", &key);
        let location = locate_header(&data, 4096).unwrap();
        data[content_start + 12] ^= 0x01;

        // the last 12 bytes would "decrypt" to nothing if accepted
        let result = locate_content(&data, &key, &location, &options(), 64);
        assert!(matches!(result, Err(VencError::Authentication(_))));
    }
}
