//! Encrypt and decrypt whole files into VENC containers
//!
//! Encryption: identifier + content key → SHA-256 of the plaintext → key
//! wrapped under the password KEK → chunked ciphertext → integrity header →
//! container, then the same key wrapped under the recovery KEK → escrow blob.
//!
//! Decryption reverses it. Neither the wrapped-key length nor the start of the
//! ciphertext is recorded in the container, so both are found by bounded
//! trial authentication (see [`CipherParams`]).

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use venc_core::config::CryptoConfig;
use venc_core::{VencError, VencResult};

use crate::chunk::{decrypt_chunks, encrypt_chunks, ChunkOptions};
use crate::container::{assemble, locate_content};
use crate::escrow::EscrowBlob;
use crate::header::{locate_header, IntegrityHeader};
use crate::identifier::FileIdentifier;
use crate::kdf::{derive_kek, derive_recovery_kek, KdfParams};
use crate::keys::{generate_content_key, unwrap_key, unwrap_key_scanning, wrap_key, ContentKey};
use crate::progress::ProgressSender;
use crate::{CONTAINER_EXTENSION, IDENTIFIER_SIZE};

/// Format and scanning parameters.
#[derive(Debug, Clone)]
pub struct CipherParams {
    pub kdf: KdfParams,
    pub chunks: ChunkOptions,
    /// Bytes after the identifier searched for the header magic
    pub max_header_scan: usize,
    /// Wrapped-key lengths tried with a password
    pub max_unwrap_attempts: usize,
    /// Candidate ciphertext offsets tried after the header
    pub max_content_scan: usize,
}

impl Default for CipherParams {
    fn default() -> Self {
        Self::from(&CryptoConfig::default())
    }
}

impl From<&CryptoConfig> for CipherParams {
    fn from(config: &CryptoConfig) -> Self {
        Self {
            kdf: KdfParams {
                iterations: config.kdf_iterations,
            },
            chunks: ChunkOptions {
                chunk_size: config.chunk_size,
                parallelism: config.parallelism,
            },
            max_header_scan: config.max_header_scan,
            max_unwrap_attempts: config.max_unwrap_attempts,
            max_content_scan: config.max_content_scan,
        }
    }
}

/// Per-call options: parameters, an optional progress channel, cancellation.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub params: CipherParams,
    pub progress: Option<ProgressSender>,
    pub cancel: CancellationToken,
}

impl EngineOptions {
    pub fn new(params: CipherParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of [`encrypt`]
#[derive(Debug)]
pub struct EncryptOutput {
    /// The `.venc` container
    pub container: Vec<u8>,
    /// Password-free recovery blob for the same file
    pub escrow: EscrowBlob,
}

/// How the content key of a container is recovered.
#[derive(Debug)]
pub enum Credential {
    Password(SecretString),
    Escrow(EscrowBlob),
}

impl Credential {
    /// Pick a credential from optional user inputs.
    ///
    /// An empty password counts as absent. When both are given the recovery
    /// key wins.
    pub fn from_parts(
        password: Option<SecretString>,
        escrow: Option<EscrowBlob>,
    ) -> VencResult<Self> {
        match (password, escrow) {
            (_, Some(blob)) => Ok(Self::Escrow(blob)),
            (Some(pw), None) if !pw.expose_secret().is_empty() => Ok(Self::Password(pw)),
            _ => Err(VencError::MissingCredentials),
        }
    }
}

/// Outcome of comparing the stored digest with the decrypted plaintext
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    Verified,
    Mismatch { expected: Vec<u8>, actual: Vec<u8> },
}

impl Integrity {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Result of [`decrypt`]. A digest mismatch is reported here, not as an error.
#[must_use = "check integrity() before trusting the plaintext"]
pub struct Decrypted {
    plaintext: Vec<u8>,
    filename: String,
    integrity: Integrity,
}

impl Decrypted {
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Filename stored in the container, or `decrypted_file`
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn integrity(&self) -> &Integrity {
        &self.integrity
    }

    /// Fail with `IntegrityMismatch` unless the digest verified.
    pub fn into_verified(self) -> VencResult<Self> {
        if self.integrity.is_verified() {
            Ok(self)
        } else {
            Err(VencError::IntegrityMismatch)
        }
    }

    pub fn into_parts(self) -> (Vec<u8>, String, Integrity) {
        (self.plaintext, self.filename, self.integrity)
    }
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("plaintext_len", &self.plaintext.len())
            .field("filename", &self.filename)
            .field("integrity", &self.integrity)
            .finish()
    }
}

/// Password-free metadata of a container
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub identifier: FileIdentifier,
    pub filename: String,
    pub digest: Vec<u8>,
    /// Offset of the header magic
    pub header_offset: usize,
    /// Where the ciphertext starts when nothing sits between header and nonce
    pub content_offset_hint: usize,
    pub total_len: usize,
}

/// Accept only the container extension, with or without the leading dot.
pub fn check_extension(extension: &str) -> VencResult<()> {
    let ext = extension.strip_prefix('.').unwrap_or(extension);
    if ext.eq_ignore_ascii_case(CONTAINER_EXTENSION) {
        Ok(())
    } else {
        Err(VencError::UnsupportedFileFormat(extension.to_string()))
    }
}

/// Encrypt `plaintext` under `password`.
///
/// `filename` is recorded in the integrity header (`unnamed_file` when absent).
pub fn encrypt(
    plaintext: &[u8],
    password: &SecretString,
    filename: Option<&str>,
    options: &EngineOptions,
) -> VencResult<EncryptOutput> {
    if password.expose_secret().is_empty() {
        return Err(VencError::MissingCredentials);
    }
    if options.cancel.is_cancelled() {
        return Err(VencError::Cancelled);
    }
    let params = &options.params;

    let identifier = FileIdentifier::generate();
    let key = generate_content_key();
    let digest = Sha256::digest(plaintext);
    debug!(%identifier, bytes = plaintext.len(), "encrypting");

    let kek = derive_kek(Some(password), &identifier, &params.kdf)?;
    let wrapped = wrap_key(&kek, &key)?;
    drop(kek);

    let content = encrypt_chunks(
        &key,
        plaintext,
        &params.chunks,
        options.progress.as_ref(),
        &options.cancel,
    )?;

    let header = IntegrityHeader::build(&digest, filename);
    let container = assemble(&identifier, &wrapped, &header, &content);

    let recovery_kek = derive_recovery_kek(&identifier, &params.kdf)?;
    let escrow = EscrowBlob::new(identifier, wrap_key(&recovery_kek, &key)?);

    debug!(%identifier, container_len = container.len(), "encrypted");
    Ok(EncryptOutput { container, escrow })
}

/// Decrypt a container with a password or a recovery key.
///
/// `extension`, when given, is the extension of the file the container was
/// read from and must be `venc`.
pub fn decrypt(
    container: &[u8],
    credential: &Credential,
    extension: Option<&str>,
    options: &EngineOptions,
) -> VencResult<Decrypted> {
    if let Some(ext) = extension {
        check_extension(ext)?;
    }
    if container.len() < IDENTIFIER_SIZE {
        return Err(VencError::FileTooSmall {
            len: container.len(),
            min: IDENTIFIER_SIZE,
        });
    }
    let identifier = FileIdentifier::from_prefix(container)?;
    if options.cancel.is_cancelled() {
        return Err(VencError::Cancelled);
    }
    let params = &options.params;
    debug!(%identifier, len = container.len(), "decrypting");

    let key = recover_key(container, &identifier, credential, params)?;

    let location = locate_header(container, params.max_header_scan)?;
    debug!(offset = location.offset, len = location.len, "header located");

    let content_start = locate_content(
        container,
        &key,
        &location,
        &params.chunks,
        params.max_content_scan,
    )?;

    let plaintext = decrypt_chunks(
        &key,
        &container[content_start..],
        &params.chunks,
        options.progress.as_ref(),
        &options.cancel,
    )?;

    let expected = location.header.digest();
    let actual = Sha256::digest(&plaintext);
    let integrity = if expected == actual.as_slice() {
        Integrity::Verified
    } else {
        warn!(%identifier, "stored digest does not match decrypted content");
        Integrity::Mismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    };

    Ok(Decrypted {
        plaintext,
        filename: location.header.filename(),
        integrity,
    })
}

fn recover_key(
    container: &[u8],
    identifier: &FileIdentifier,
    credential: &Credential,
    params: &CipherParams,
) -> VencResult<ContentKey> {
    match credential {
        Credential::Password(password) => {
            if password.expose_secret().is_empty() {
                return Err(VencError::MissingCredentials);
            }
            let kek = derive_kek(Some(password), identifier, &params.kdf)?;
            let (key, _) = unwrap_key_scanning(
                &kek,
                &container[IDENTIFIER_SIZE..],
                params.max_unwrap_attempts,
            )?;
            Ok(key)
        }
        Credential::Escrow(blob) => {
            if !blob.matches(identifier) {
                return Err(VencError::EscrowMismatch);
            }
            let kek = derive_recovery_kek(identifier, &params.kdf)?;
            unwrap_key(&kek, blob.wrapped_key()).map_err(|e| match e {
                VencError::FileTooSmall { len, .. } => {
                    VencError::InvalidEscrow(format!("wrapped key is only {len} bytes"))
                }
                other => other,
            })
        }
    }
}

/// Read identifier and header without any credential.
pub fn inspect(container: &[u8], params: &CipherParams) -> VencResult<ContainerInfo> {
    let identifier = FileIdentifier::from_prefix(container)?;
    let location = locate_header(container, params.max_header_scan)?;

    Ok(ContainerInfo {
        identifier,
        filename: location.header.filename(),
        digest: location.header.digest().to_vec(),
        header_offset: location.offset,
        content_offset_hint: location.end(),
        total_len: container.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::DEFAULT_FILENAME;
    use crate::WRAPPED_KEY_SIZE;

    fn fast() -> EngineOptions {
        EngineOptions::new(CipherParams {
            kdf: KdfParams { iterations: 1_000 },
            chunks: ChunkOptions {
                chunk_size: 64,
                parallelism: 0,
            },
            ..Default::default()
        })
    }

    fn password() -> SecretString {
        SecretString::from("correct horse")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let opts = fast();

        let out = encrypt(&data, &password(), Some("report.pdf"), &opts).unwrap();
        let decrypted = decrypt(
            &out.container,
            &Credential::Password(password()),
            Some("venc"),
            &opts,
        )
        .unwrap();

        assert_eq!(decrypted.plaintext(), data.as_slice());
        assert_eq!(decrypted.filename(), "report.pdf");
        assert!(decrypted.integrity().is_verified());
    }

    #[test]
    fn test_escrow_decrypts() {
        let opts = fast();
        let out = encrypt(b"escrowed", &password(), None, &opts).unwrap();
        assert_eq!(&out.container[..IDENTIFIER_SIZE], out.escrow.identifier().as_bytes());
        assert_eq!(out.escrow.wrapped_key().len(), WRAPPED_KEY_SIZE);

        let decrypted = decrypt(&out.container, &Credential::Escrow(out.escrow), None, &opts)
            .unwrap()
            .into_verified()
            .unwrap();
        assert_eq!(decrypted.plaintext(), b"escrowed");
        assert_eq!(decrypted.filename(), DEFAULT_FILENAME);
    }

    #[test]
    fn test_wrong_password() {
        let opts = fast();
        let out = encrypt(b"secret", &password(), None, &opts).unwrap();
        let result = decrypt(
            &out.container,
            &Credential::Password(SecretString::from("wrong")),
            None,
            &opts,
        );
        assert!(matches!(result, Err(VencError::Authentication(_))));
    }

    #[test]
    fn test_empty_password_rejected() {
        let result = encrypt(b"x", &SecretString::from(""), None, &fast());
        assert!(matches!(result, Err(VencError::MissingCredentials)));
    }

    #[test]
    fn test_credential_from_parts() {
        assert!(matches!(
            Credential::from_parts(None, None),
            Err(VencError::MissingCredentials)
        ));
        assert!(matches!(
            Credential::from_parts(Some(SecretString::from("")), None),
            Err(VencError::MissingCredentials)
        ));
        assert!(matches!(
            Credential::from_parts(Some(password()), None),
            Ok(Credential::Password(_))
        ));

        let out = encrypt(b"x", &password(), None, &fast()).unwrap();
        assert!(matches!(
            Credential::from_parts(Some(password()), Some(out.escrow)),
            Ok(Credential::Escrow(_))
        ));
    }

    #[test]
    fn test_escrow_from_other_file() {
        let opts = fast();
        let a = encrypt(b"a", &password(), None, &opts).unwrap();
        let b = encrypt(b"b", &password(), None, &opts).unwrap();

        let result = decrypt(&a.container, &Credential::Escrow(b.escrow), None, &opts);
        assert!(matches!(result, Err(VencError::EscrowMismatch)));
    }

    #[test]
    fn test_check_extension() {
        assert!(check_extension("venc").is_ok());
        assert!(check_extension(".VENC").is_ok());
        assert!(check_extension("Venc").is_ok());
        assert!(matches!(
            check_extension("zip"),
            Err(VencError::UnsupportedFileFormat(_))
        ));
        assert!(check_extension("").is_err());
    }

    #[test]
    fn test_extension_gate_runs_first() {
        let result = decrypt(b"", &Credential::Password(password()), Some("txt"), &fast());
        assert!(matches!(result, Err(VencError::UnsupportedFileFormat(_))));
    }

    #[test]
    fn test_too_small_and_bad_magic() {
        let opts = fast();
        let creds = Credential::Password(password());

        let result = decrypt(b"VENC", &creds, None, &opts);
        assert!(matches!(result, Err(VencError::FileTooSmall { len: 4, .. })));

        let result = decrypt(&[0u8; 500], &creds, None, &opts);
        assert!(matches!(result, Err(VencError::InvalidSystemIdentifier(_))));
    }

    #[test]
    fn test_digest_mismatch_is_not_an_error() {
        let opts = fast();
        let mut out = encrypt(b"payload", &password(), None, &opts).unwrap();
        let location = locate_header(&out.container, 4096).unwrap();
        // first digest byte: after the 32-byte magic and the 4-byte length
        out.container[location.offset + 36] ^= 0xFF;

        let decrypted = decrypt(&out.container, &Credential::Password(password()), None, &opts)
            .unwrap();
        assert_eq!(decrypted.plaintext(), b"payload");
        assert!(matches!(decrypted.integrity(), Integrity::Mismatch { .. }));
        assert!(matches!(
            decrypted.into_verified(),
            Err(VencError::IntegrityMismatch)
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let opts = fast();
        opts.cancel.cancel();
        let result = encrypt(b"x", &password(), None, &opts);
        assert!(matches!(result, Err(VencError::Cancelled)));
    }

    #[test]
    fn test_inspect() {
        let opts = fast();
        let out = encrypt(b"inspect me", &password(), Some("notes.txt"), &opts).unwrap();

        let info = inspect(&out.container, &opts.params).unwrap();
        assert_eq!(info.identifier, *out.escrow.identifier());
        assert_eq!(info.filename, "notes.txt");
        assert_eq!(info.digest, Sha256::digest(b"inspect me").to_vec());
        assert_eq!(hex::encode(&info.digest).len(), 64);
        assert_eq!(info.header_offset, IDENTIFIER_SIZE + WRAPPED_KEY_SIZE);
        assert_eq!(info.total_len, out.container.len());
    }

    #[test]
    fn test_params_from_config() {
        let config = CryptoConfig {
            chunk_size: 1024,
            max_content_scan: 8,
            ..Default::default()
        };
        let params = CipherParams::from(&config);
        assert_eq!(params.chunks.chunk_size, 1024);
        assert_eq!(params.max_content_scan, 8);
        assert_eq!(params.kdf.iterations, 100_000);
    }
}
