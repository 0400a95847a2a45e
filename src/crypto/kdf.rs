use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha1::Sha1;
use sha2::Sha256;

use super::{HASH_LEN, SALT_LEN};
use crate::error::Error;
use getrandom::fill;

/// Lowest iteration count accepted for any derivation. Anything below is a
/// configuration error, never a silently weaker hash.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Iteration count used for newly written credentials.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Key-derivation function applied to the PIN.
///
/// The tag is what gets persisted in the credential record; an unknown tag
/// on read fails closed with [`Error::UnsupportedAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// PBKDF2 with HMAC-SHA256. The default for new credentials.
    Pbkdf2HmacSha256,
    /// PBKDF2 with HMAC-SHA1. Kept so records written on platforms that
    /// only had SHA1 keep verifying; never chosen for new credentials.
    Pbkdf2HmacSha1,
}

impl Algorithm {
    pub fn tag(self) -> u8 {
        match self {
            Algorithm::Pbkdf2HmacSha256 => 1,
            Algorithm::Pbkdf2HmacSha1 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            1 => Ok(Algorithm::Pbkdf2HmacSha256),
            2 => Ok(Algorithm::Pbkdf2HmacSha1),
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }
}

/// Algorithm and work factor a manager uses for newly written credentials.
///
/// Validation of stored credentials always uses the parameters persisted in
/// the record, not these.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    algorithm: Algorithm,
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Pbkdf2HmacSha256,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(algorithm: Algorithm, iterations: u32) -> Result<Self, Error> {
        let params = Self {
            algorithm,
            iterations,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.iterations < MIN_ITERATIONS {
            return Err(Error::InvalidParams("iteration count below minimum"));
        }
        Ok(())
    }
}

/// Generate a fresh per-credential salt from the OS CSPRNG.
pub fn generate_salt() -> Result<[u8; SALT_LEN], Error> {
    let mut salt = [0u8; SALT_LEN];
    fill(&mut salt).map_err(|_| Error::Rng)?;
    Ok(salt)
}

/// Derive the credential hash from a PIN and salt.
///
/// Pure and deterministic; safe to call from any thread. Deliberately slow:
/// a call runs the full iteration count and can take a noticeable fraction
/// of a second.
pub fn derive(pin: &str, salt: &[u8; SALT_LEN], params: KdfParams) -> Result<[u8; HASH_LEN], Error> {
    if pin.is_empty() {
        return Err(Error::InvalidParams("PIN must not be empty"));
    }
    params.validate()?;

    let mut hash = [0u8; HASH_LEN];
    let result = match params.algorithm {
        Algorithm::Pbkdf2HmacSha256 => {
            pbkdf2::<Hmac<Sha256>>(pin.as_bytes(), salt, params.iterations, &mut hash)
        }
        Algorithm::Pbkdf2HmacSha1 => {
            pbkdf2::<Hmac<Sha1>>(pin.as_bytes(), salt, params.iterations, &mut hash)
        }
    };
    result.map_err(|_| Error::InvalidParams("PBKDF2 output length invalid"))?;

    Ok(hash)
}
