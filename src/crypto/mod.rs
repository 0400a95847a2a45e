//! Cryptographic primitives: PIN key derivation and at-rest encryption.

pub mod aead;
pub mod kdf;

pub use kdf::{Algorithm, KdfParams};

/// Length of the per-credential salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the derived hash (32 bytes / 256 bits).
pub const HASH_LEN: usize = 32;
/// Length of the at-rest encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
