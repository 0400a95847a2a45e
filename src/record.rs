//! Credential record format.
//!
//! The single persisted entity, packed as:
//! ```text
//! MAGIC (4) | VERSION (1) | ALGORITHM (1) | ITERATIONS (4, LE) | SALT (16) | HASH (32)
//! ```
//! The record stores the parameters it was derived under so validation can
//! replay them exactly, even after the manager's defaults move on.

use crate::crypto::{Algorithm, HASH_LEN, SALT_LEN};
use crate::error::Error;

pub const VERSION_V1: u8 = 1;
pub const MAGIC: &[u8; MAGIC_LEN] = b"PINR";

const MAGIC_LEN: usize = 4;
const VER_LEN: usize = 1;
const ALG_LEN: usize = 1;
const ITER_LEN: usize = 4;

/// A derived PIN verifier. Contains no recoverable PIN material.
#[derive(Debug)]
pub struct Record {
    version: u8,
    algorithm: Algorithm,
    iterations: u32,
    salt: [u8; SALT_LEN],
    hash: [u8; HASH_LEN],
}

impl Record {
    pub const LEN: usize = MAGIC_LEN + VER_LEN + ALG_LEN + ITER_LEN + SALT_LEN + HASH_LEN;

    pub fn new(
        algorithm: Algorithm,
        iterations: u32,
        salt: [u8; SALT_LEN],
        hash: [u8; HASH_LEN],
    ) -> Self {
        Self {
            version: VERSION_V1,
            algorithm,
            iterations,
            salt,
            hash,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn hash(&self) -> &[u8; HASH_LEN] {
        &self.hash
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);

        buf.extend_from_slice(MAGIC);
        buf.push(self.version);
        buf.push(self.algorithm.tag());
        buf.extend_from_slice(&self.iterations.to_le_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.hash);

        buf
    }

    /// Parse a persisted record. The record is always the entire blob, so
    /// the length must match exactly.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() != Self::LEN {
            return Err(Error::CorruptRecord("wrong record length"));
        }

        if &data[..MAGIC_LEN] != MAGIC {
            return Err(Error::CorruptRecord("bad magic"));
        }

        let version = data[MAGIC_LEN];
        if version != VERSION_V1 {
            return Err(Error::CorruptRecord("unknown record version"));
        }

        let mut offset = MAGIC_LEN + VER_LEN;
        let algorithm = Algorithm::from_tag(data[offset])?;
        offset += ALG_LEN;

        let iterations = u32::from_le_bytes(
            data[offset..offset + ITER_LEN]
                .try_into()
                .map_err(|_| Error::CorruptRecord("truncated iterations"))?,
        );
        offset += ITER_LEN;

        let salt: [u8; SALT_LEN] = data[offset..offset + SALT_LEN]
            .try_into()
            .map_err(|_| Error::CorruptRecord("truncated salt"))?;
        offset += SALT_LEN;

        let hash: [u8; HASH_LEN] = data[offset..offset + HASH_LEN]
            .try_into()
            .map_err(|_| Error::CorruptRecord("truncated hash"))?;

        Ok(Record {
            version,
            algorithm,
            iterations,
            salt,
            hash,
        })
    }
}
