use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type VencResult<T> = Result<T, VencError>;

#[derive(Debug, Error)]
pub enum VencError {
    /// Identifier prefix or integrity-header magic did not match: not a VENC file.
    #[error("invalid system identifier: {0}")]
    InvalidSystemIdentifier(String),

    /// An AEAD tag failed to verify (wrong password, wrong recovery key, or corruption).
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("missing credentials: a password or a recovery key is required")]
    MissingCredentials,

    #[error("unsupported file format: expected .venc, got {0:?}")]
    UnsupportedFileFormat(String),

    #[error("file too small: {len} bytes (minimum {min})")]
    FileTooSmall { len: usize, min: usize },

    #[error("cannot locate integrity header: {0}")]
    CannotLocateHeader(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Output assembly would write past the end of the preallocated buffer.
    /// Unreachable with consistent chunk sizing.
    #[error("chunk merge out of range: {len} bytes at offset {offset} exceeds capacity {capacity}")]
    ArrayMergeOutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("recovery key does not belong to this file")]
    EscrowMismatch,

    #[error("invalid recovery key: {0}")]
    InvalidEscrow(String),

    #[error("integrity check failed: plaintext digest does not match the header")]
    IntegrityMismatch,

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Machine-readable error kind, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSystemIdentifier,
    Authentication,
    MissingCredentials,
    UnsupportedFileFormat,
    FileTooSmall,
    CannotLocateHeader,
    DecryptionFailed,
    ArrayMergeOutOfRange,
    EscrowMismatch,
    InvalidEscrow,
    IntegrityMismatch,
    Cancelled,
    Config,
    Io,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSystemIdentifier => "invalid_system_identifier",
            Self::Authentication => "authentication",
            Self::MissingCredentials => "missing_credentials",
            Self::UnsupportedFileFormat => "unsupported_file_format",
            Self::FileTooSmall => "file_too_small",
            Self::CannotLocateHeader => "cannot_locate_header",
            Self::DecryptionFailed => "decryption_failed",
            Self::ArrayMergeOutOfRange => "array_merge_out_of_range",
            Self::EscrowMismatch => "escrow_mismatch",
            Self::InvalidEscrow => "invalid_escrow",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::Cancelled => "cancelled",
            Self::Config => "config",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VencError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSystemIdentifier(_) => ErrorKind::InvalidSystemIdentifier,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::MissingCredentials => ErrorKind::MissingCredentials,
            Self::UnsupportedFileFormat(_) => ErrorKind::UnsupportedFileFormat,
            Self::FileTooSmall { .. } => ErrorKind::FileTooSmall,
            Self::CannotLocateHeader(_) => ErrorKind::CannotLocateHeader,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::ArrayMergeOutOfRange { .. } => ErrorKind::ArrayMergeOutOfRange,
            Self::EscrowMismatch => ErrorKind::EscrowMismatch,
            Self::InvalidEscrow(_) => ErrorKind::InvalidEscrow,
            Self::IntegrityMismatch => ErrorKind::IntegrityMismatch,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}
