//! Chunked AES-256-GCM encryption/decryption
//!
//! Encrypted content format (binary):
//! ```text
//! [12 bytes: nonce][chunk 0 ciphertext + 16-byte tag][chunk 1 ...]...
//! AAD(chunk i) = "chunk_<i>" (ASCII decimal, 0-based)
//! ```
//!
//! Every chunk of a file is sealed under the same content key and the same
//! nonce. Uniqueness of the AAD per chunk is what binds each ciphertext to
//! its position; [`ChunkAad`] is the only way this module builds AAD.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use venc_core::config::CryptoConfig;
use venc_core::{Operation, VencError, VencResult};

use crate::keys::ContentKey;
use crate::progress::{ProgressSender, ProgressTracker};
use crate::{DEFAULT_CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

/// Associated data binding a chunk ciphertext to its index within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAad {
    index: u64,
}

impl ChunkAad {
    pub fn new(index: u64) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("chunk_{}", self.index).into_bytes()
    }
}

/// Chunking parameters. `chunk_size` must match between encryption and decryption.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Plaintext bytes per chunk (default: 8 MiB)
    pub chunk_size: usize,
    /// Chunks per parallel batch (0 = rayon thread count, 1 = sequential)
    pub parallelism: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallelism: 0,
        }
    }
}

impl ChunkOptions {
    fn batch_size(&self) -> usize {
        match self.parallelism {
            0 => rayon::current_num_threads().max(1),
            n => n,
        }
    }

    fn sealed_chunk_size(&self) -> usize {
        self.chunk_size + TAG_SIZE
    }

    fn check(&self) -> VencResult<()> {
        if self.chunk_size == 0 || self.chunk_size > CryptoConfig::MAX_CHUNK_SIZE {
            return Err(VencError::Config(format!(
                "chunk_size must be in 1..={} (got {})",
                CryptoConfig::MAX_CHUNK_SIZE,
                self.chunk_size
            )));
        }
        Ok(())
    }
}

fn seal_chunk(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_SIZE],
    aad: ChunkAad,
    plaintext: &[u8],
) -> VencResult<Vec<u8>> {
    let aad_bytes = aad.to_bytes();
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: &aad_bytes,
            },
        )
        .map_err(|e| anyhow::anyhow!("chunk {} encryption failed: {e}", aad.index()).into())
}

fn open_chunk(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_SIZE],
    aad: ChunkAad,
    sealed: &[u8],
) -> VencResult<Vec<u8>> {
    let aad_bytes = aad.to_bytes();
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: &aad_bytes,
            },
        )
        .map_err(|_| {
            VencError::Authentication(format!(
                "chunk {}: corrupted data or wrong key",
                aad.index()
            ))
        })
}

/// Concatenate `parts` after `head` into a buffer of exactly `capacity` bytes.
fn merge_chunks(head: &[u8], parts: &[Vec<u8>], capacity: usize) -> VencResult<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity);
    for part in std::iter::once(head).chain(parts.iter().map(Vec::as_slice)) {
        if out.len() + part.len() > capacity {
            return Err(VencError::ArrayMergeOutOfRange {
                offset: out.len(),
                len: part.len(),
                capacity,
            });
        }
        out.extend_from_slice(part);
    }
    Ok(out)
}

/// Encrypt `plaintext` in chunks under `key`.
///
/// Returns `[12-byte nonce][sealed chunks...]`. Empty input yields the nonce alone.
pub fn encrypt_chunks(
    key: &ContentKey,
    plaintext: &[u8],
    options: &ChunkOptions,
    progress: Option<&ProgressSender>,
    cancel: &CancellationToken,
) -> VencResult<Vec<u8>> {
    options.check()?;
    if cancel.is_cancelled() {
        return Err(VencError::Cancelled);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let chunks: Vec<&[u8]> = plaintext.chunks(options.chunk_size).collect();
    let batch_size = options.batch_size();
    let mut tracker = ProgressTracker::new(progress, Operation::Encrypt);
    let mut sealed: Vec<Vec<u8>> = Vec::with_capacity(chunks.len());
    let mut done = 0u64;

    for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(VencError::Cancelled);
        }
        let first = batch_index * batch_size;
        let results: Vec<VencResult<Vec<u8>>> = batch
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| seal_chunk(&cipher, &nonce, ChunkAad::new((first + i) as u64), chunk))
            .collect();

        for result in results {
            let ciphertext = result?;
            done += (ciphertext.len() - TAG_SIZE) as u64;
            sealed.push(ciphertext);
        }
        tracker.update(done, plaintext.len() as u64);
    }
    tracker.finish_processing();

    debug!(chunks = sealed.len(), bytes = plaintext.len(), "content encrypted");

    tracker.merging(0.0);
    let capacity = NONCE_SIZE + plaintext.len() + sealed.len() * TAG_SIZE;
    let out = merge_chunks(&nonce, &sealed, capacity)?;
    tracker.merging(100.0);

    Ok(out)
}

/// Decrypt `[12-byte nonce][sealed chunks...]` produced by [`encrypt_chunks`].
///
/// Fails with `Authentication` as soon as any chunk fails to verify; no
/// partial plaintext is returned.
pub fn decrypt_chunks(
    key: &ContentKey,
    data: &[u8],
    options: &ChunkOptions,
    progress: Option<&ProgressSender>,
    cancel: &CancellationToken,
) -> VencResult<Vec<u8>> {
    options.check()?;
    if cancel.is_cancelled() {
        return Err(VencError::Cancelled);
    }
    let (nonce, body) = split_nonce(data)?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let sealed: Vec<&[u8]> = body.chunks(options.sealed_chunk_size()).collect();
    if let Some(last) = sealed.last() {
        if last.len() < TAG_SIZE {
            return Err(VencError::Authentication(format!(
                "chunk {}: truncated ({} bytes, shorter than the tag)",
                sealed.len() - 1,
                last.len()
            )));
        }
    }

    let batch_size = options.batch_size();
    let mut tracker = ProgressTracker::new(progress, Operation::Decrypt);
    let mut opened: Vec<Vec<u8>> = Vec::with_capacity(sealed.len());
    let mut position = NONCE_SIZE as u64;

    for (batch_index, batch) in sealed.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(VencError::Cancelled);
        }
        let first = batch_index * batch_size;
        let results: Vec<VencResult<Vec<u8>>> = batch
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| open_chunk(&cipher, &nonce, ChunkAad::new((first + i) as u64), chunk))
            .collect();

        for (result, chunk) in results.into_iter().zip(batch) {
            opened.push(result?);
            position += chunk.len() as u64;
        }
        tracker.update(position, data.len() as u64);
    }
    tracker.finish_processing();

    debug!(chunks = opened.len(), bytes = body.len(), "content decrypted");

    tracker.merging(0.0);
    let capacity = body.len() - sealed.len() * TAG_SIZE;
    let out = merge_chunks(&[], &opened, capacity)?;
    tracker.merging(100.0);

    Ok(out)
}

/// Authenticate only the first chunk of a candidate ciphertext region.
///
/// Used to find where the ciphertext starts without decrypting the whole file.
/// A region holding just a nonce (empty plaintext) is accepted.
pub fn probe_first_chunk(key: &ContentKey, data: &[u8], options: &ChunkOptions) -> VencResult<()> {
    options.check()?;
    let (nonce, body) = split_nonce(data)?;
    if body.is_empty() {
        return Ok(());
    }

    let first = &body[..body.len().min(options.sealed_chunk_size())];
    if first.len() < TAG_SIZE {
        return Err(VencError::Authentication(
            "chunk 0: truncated (shorter than the tag)".into(),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    open_chunk(&cipher, &nonce, ChunkAad::new(0), first).map(|_| ())
}

fn split_nonce(data: &[u8]) -> VencResult<([u8; NONCE_SIZE], &[u8])> {
    if data.len() < NONCE_SIZE {
        return Err(VencError::DecryptionFailed(format!(
            "ciphertext region too short: {} bytes (nonce alone is {NONCE_SIZE})",
            data.len()
        )));
    }
    let (nonce_bytes, body) = data.split_at(NONCE_SIZE);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);
    Ok((nonce, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_content_key;
    use proptest::prelude::*;
    use tokio::sync::mpsc::unbounded_channel;
    use venc_core::{ProgressEvent, Stage};

    fn small(chunk_size: usize, parallelism: usize) -> ChunkOptions {
        ChunkOptions {
            chunk_size,
            parallelism,
        }
    }

    fn make_data(size: usize) -> Vec<u8> {
        (0..size)
            .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
            .collect()
    }

    fn roundtrip(data: &[u8], options: &ChunkOptions) -> Vec<u8> {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let encrypted = encrypt_chunks(&key, data, options, None, &cancel).unwrap();
        decrypt_chunks(&key, &encrypted, options, None, &cancel).unwrap()
    }

    #[test]
    fn test_aad_format() {
        assert_eq!(ChunkAad::new(0).to_bytes(), b"chunk_0");
        assert_eq!(ChunkAad::new(12).to_bytes(), b"chunk_12");
        assert_eq!(ChunkAad::new(7).index(), 7);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data = make_data(1000);
        assert_eq!(roundtrip(&data, &small(64, 1)), data);
    }

    #[test]
    fn test_parallel_matches_sequential_layout() {
        let data = make_data(1000);
        assert_eq!(roundtrip(&data, &small(64, 4)), data);
        assert_eq!(roundtrip(&data, &small(64, 0)), data);
    }

    #[test]
    fn test_empty_input_is_nonce_only() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let encrypted = encrypt_chunks(&key, b"", &small(64, 1), None, &cancel).unwrap();

        assert_eq!(encrypted.len(), NONCE_SIZE);
        let decrypted = decrypt_chunks(&key, &encrypted, &small(64, 1), None, &cancel).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_encrypted_size() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let encrypted = encrypt_chunks(&key, &make_data(130), &small(64, 1), None, &cancel).unwrap();

        // nonce (12) + 3 chunks (64 + 64 + 2) + 3 tags (48)
        assert_eq!(encrypted.len(), 12 + 130 + 3 * 16);
    }

    #[test]
    fn test_chunk_boundaries() {
        let options = small(64, 1);
        for size in [63, 64, 65, 128, 129] {
            let data = make_data(size);
            assert_eq!(roundtrip(&data, &options), data, "size {size}");
        }
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let cancel = CancellationToken::new();
        let encrypted =
            encrypt_chunks(&generate_content_key(), b"secret data", &small(64, 1), None, &cancel)
                .unwrap();
        let result = decrypt_chunks(&generate_content_key(), &encrypted, &small(64, 1), None, &cancel);

        assert!(matches!(result, Err(VencError::Authentication(_))));
    }

    #[test]
    fn test_reordered_chunks_fail() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let options = small(16, 1);
        let encrypted = encrypt_chunks(&key, &make_data(32), &options, None, &cancel).unwrap();

        // swap the two sealed chunks (32 bytes each)
        let mut swapped = encrypted[..NONCE_SIZE].to_vec();
        swapped.extend_from_slice(&encrypted[NONCE_SIZE + 32..]);
        swapped.extend_from_slice(&encrypted[NONCE_SIZE..NONCE_SIZE + 32]);

        let result = decrypt_chunks(&key, &swapped, &options, None, &cancel);
        assert!(
            matches!(result, Err(VencError::Authentication(_))),
            "AAD must bind chunks to their index"
        );
    }

    #[test]
    fn test_tampered_chunk_fails_whole_operation() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let options = small(64, 1);
        let mut encrypted = encrypt_chunks(&key, &make_data(300), &options, None, &cancel).unwrap();

        // flip a byte inside the last chunk
        let last = encrypted.len() - 5;
        encrypted[last] ^= 0x01;

        let result = decrypt_chunks(&key, &encrypted, &options, None, &cancel);
        assert!(matches!(result, Err(VencError::Authentication(_))));
    }

    #[test]
    fn test_short_trailing_remainder_fails() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let options = small(64, 1);
        let mut encrypted = encrypt_chunks(&key, &make_data(64), &options, None, &cancel).unwrap();
        encrypted.extend_from_slice(&[0u8; 5]);

        let result = decrypt_chunks(&key, &encrypted, &options, None, &cancel);
        assert!(matches!(result, Err(VencError::Authentication(_))));
    }

    #[test]
    fn test_region_shorter_than_nonce() {
        let cancel = CancellationToken::new();
        let result = decrypt_chunks(&generate_content_key(), &[0u8; 5], &small(64, 1), None, &cancel);
        assert!(matches!(result, Err(VencError::DecryptionFailed(_))));
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();

        for chunk_size in [0, CryptoConfig::MAX_CHUNK_SIZE + 1, usize::MAX] {
            let options = small(chunk_size, 1);
            let result = encrypt_chunks(&key, b"data", &options, None, &cancel);
            assert!(matches!(result, Err(VencError::Config(_))), "{chunk_size}");
            let result = decrypt_chunks(&key, &[0u8; 64], &options, None, &cancel);
            assert!(matches!(result, Err(VencError::Config(_))), "{chunk_size}");
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = encrypt_chunks(&generate_content_key(), b"data", &small(64, 1), None, &cancel);
        assert!(matches!(result, Err(VencError::Cancelled)));
    }

    #[test]
    fn test_probe_first_chunk() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let options = small(64, 1);
        let encrypted = encrypt_chunks(&key, &make_data(200), &options, None, &cancel).unwrap();

        probe_first_chunk(&key, &encrypted, &options).unwrap();

        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&encrypted);
        assert!(matches!(
            probe_first_chunk(&key, &shifted, &options),
            Err(VencError::Authentication(_))
        ));
        assert!(probe_first_chunk(&key, &shifted[1..], &options).is_ok());
    }

    #[test]
    fn test_merge_out_of_range() {
        let result = merge_chunks(b"abc", &[vec![1, 2, 3]], 4);
        assert!(matches!(
            result,
            Err(VencError::ArrayMergeOutOfRange {
                offset: 3,
                len: 3,
                capacity: 4
            })
        ));
        assert_eq!(merge_chunks(b"ab", &[vec![3]], 3).unwrap(), b"ab\x03");
    }

    fn collect(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn assert_progress_shape(events: &[ProgressEvent]) {
        let processing: Vec<f64> = events
            .iter()
            .take_while(|e| e.stage == Stage::Processing)
            .map(|e| e.percent)
            .collect();
        assert!(!processing.is_empty());
        assert!(
            processing.windows(2).all(|w| w[0] <= w[1]),
            "processing progress must not decrease: {processing:?}"
        );
        assert_eq!(*processing.last().unwrap(), 100.0);

        let merging: Vec<f64> = events[processing.len()..]
            .iter()
            .map(|e| {
                assert_eq!(e.stage, Stage::Merging);
                e.percent
            })
            .collect();
        assert_eq!(merging, vec![0.0, 100.0]);
    }

    #[test]
    fn test_progress_stages() {
        let key = generate_content_key();
        let cancel = CancellationToken::new();
        let options = small(16, 2);
        let data = make_data(16 * 500);

        let (tx, mut rx) = unbounded_channel();
        let encrypted = encrypt_chunks(&key, &data, &options, Some(&tx), &cancel).unwrap();
        let events = collect(&mut rx);
        assert!(events.len() > 10, "expected incremental updates");
        assert!(events.iter().all(|e| e.operation == Operation::Encrypt));
        assert_progress_shape(&events);

        decrypt_chunks(&key, &encrypted, &options, Some(&tx), &cancel).unwrap();
        let events = collect(&mut rx);
        assert!(events.iter().all(|e| e.operation == Operation::Decrypt));
        assert_progress_shape(&events);
    }

    proptest! {
        #[test]
        fn chunked_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=2048),
            chunk_size in 1usize..=300,
            parallelism in 0usize..=4,
        ) {
            let options = small(chunk_size, parallelism);
            prop_assert_eq!(roundtrip(&data, &options), data);
        }
    }
}
