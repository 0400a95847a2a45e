use std::fmt;
use std::io;

/// Every distinguishable outcome of a credential operation.
///
/// Callers are expected to match on the variant: a blacklisted PIN, a wrong
/// PIN, and a corrupt record all call for different reactions.
#[derive(Debug)]
pub enum Error {
    /// The candidate PIN is on the configured blacklist.
    BlacklistedPin,
    /// A credential already exists and `force` was not set.
    AlreadyExists,
    /// The operation needs an existing credential, but none is set.
    NotSet,
    /// The presented PIN does not match the stored credential.
    InvalidCredential,
    /// The stored record names a key-derivation algorithm this build
    /// does not know. Never falls back to a weaker derivation.
    UnsupportedAlgorithm(u8),
    /// The stored record is unreadable or malformed. Recovery is
    /// re-creating the PIN, never repairing the record.
    CorruptRecord(&'static str),
    /// Key-derivation parameters outside the accepted range.
    InvalidParams(&'static str),
    /// No blob exists at the storage location.
    NotFound,
    /// I/O failure in the storage backend.
    Storage(io::Error),
    /// The OS random generator is unavailable.
    Rng,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BlacklistedPin => write!(f, "PIN is blacklisted"),
            Error::AlreadyExists => write!(f, "a PIN is already set"),
            Error::NotSet => write!(f, "no PIN is set"),
            Error::InvalidCredential => write!(f, "PIN does not match"),
            Error::UnsupportedAlgorithm(tag) => {
                write!(f, "unsupported key-derivation algorithm: {tag}")
            }
            Error::CorruptRecord(why) => write!(f, "credential record corrupt: {why}"),
            Error::InvalidParams(why) => write!(f, "invalid derivation parameters: {why}"),
            Error::NotFound => write!(f, "storage blob not found"),
            Error::Storage(e) => write!(f, "storage failure: {e}"),
            Error::Rng => write!(f, "OS random generator unavailable"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage(e)
    }
}
