//! venc-crypto: chunked AES-256-GCM file encryption for VENC containers
//!
//! Key hierarchy:
//! ```text
//! Password ──PBKDF2-SHA256(salt = FileIdentifier)──► KEK ──wraps──┐
//! "VENCRKEY" ─PBKDF2-SHA256(salt = FileIdentifier)──► recovery KEK ─wraps──┤
//!                                                                  ▼
//!                            Content Key (per-file, 256-bit random)
//!                              └── Chunk AEAD: AES-256-GCM (nonce = one per file,
//!                                                           AAD = "chunk_<index>")
//! ```
//!
//! Container layout:
//! ```text
//! [16: identifier "VENC"+random][wrapped key][integrity header][12: nonce][chunks...]
//! ```
//! Neither the wrapped key nor the ciphertext start is recorded; readers scan
//! for the header magic and trial-authenticate candidate offsets.

pub mod chunk;
pub mod container;
pub mod engine;
pub mod escrow;
pub mod header;
pub mod identifier;
pub mod kdf;
pub mod keys;
pub mod progress;

pub use chunk::{decrypt_chunks, encrypt_chunks, ChunkAad, ChunkOptions};
pub use engine::{
    check_extension, decrypt, encrypt, inspect, CipherParams, ContainerInfo, Credential,
    Decrypted, EncryptOutput, EngineOptions, Integrity,
};
pub use escrow::EscrowBlob;
pub use header::IntegrityHeader;
pub use identifier::FileIdentifier;
pub use kdf::{derive_kek, derive_recovery_kek, KdfParams, Kek};
pub use keys::{generate_content_key, unwrap_key, wrap_key, ContentKey};
pub use progress::ProgressSender;

/// Size of a content key / KEK in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the file identifier at the start of every container and recovery key
pub const IDENTIFIER_SIZE: usize = 16;

/// Smallest possible wrapped key: nonce plus tag around an empty payload
pub const MIN_WRAPPED_KEY_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Size of a wrapped content key as written by this crate
pub const WRAPPED_KEY_SIZE: usize = NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// Plaintext bytes per AEAD chunk (8 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Extension of container files, without the dot
pub const CONTAINER_EXTENSION: &str = "venc";
