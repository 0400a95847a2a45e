//! Local PIN credential manager.
//!
//! Stores a salted, work-factored PBKDF2 verifier of a short PIN — never
//! the PIN itself — in a single encrypted, atomically replaced storage
//! slot, and checks candidates against it in constant time.
//!
//! ```no_run
//! use pinlock::{EncryptedFileStore, PinManager, StaticKey, default_store_path};
//!
//! let path = default_store_path("app.pin")?;
//! let store = EncryptedFileStore::new(path, StaticKey::new([0u8; 32]));
//! let manager = PinManager::new(store).with_blacklist(pinlock::DEFAULT_BLACKLIST);
//!
//! manager.create_pin("4071", false)?;
//! assert!(manager.is_valid_pin("4071")?);
//! # Ok::<(), pinlock::Error>(())
//! ```

mod crypto;
mod error;
mod record;
mod storage;

pub use crate::crypto::kdf::{DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub use crate::crypto::{Algorithm, HASH_LEN, KEY_LEN, KdfParams, SALT_LEN};
pub use crate::error::Error;
pub use crate::record::Record;
pub use crate::storage::{
    BlobStore, EncryptedFileStore, KeySource, StaticKey, default_store_path,
};

use crate::crypto::kdf;
use std::sync::Mutex;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// The four most common 4-digit PINs, together roughly a fifth of all PINs
/// observed in leaked datasets.
pub const DEFAULT_BLACKLIST: [&str; 4] = [
    "1234", // Freq: 10.713%
    "1111", // Freq: 6.016%
    "0000", // Freq: 1.881%
    "1212", // Freq: 1.197%
];

/// Owns the lifecycle of the single persisted credential record.
///
/// Storage is the single source of truth: there is no in-memory credential
/// cache, every operation re-reads or re-writes the slot. An internal mutex
/// serializes the read-modify-write window, so one manager shared across
/// threads is safe; two managers (or processes) pointed at the same storage
/// location must be serialized by the caller.
///
/// Derivation is deliberately slow (hundreds of milliseconds at the default
/// work factor). Callers on a responsive path should move these calls off
/// their interactive thread; the manager exposes no async surface of its
/// own.
pub struct PinManager<S: BlobStore> {
    store: S,
    blacklist: Vec<String>,
    params: KdfParams,
    lock: Mutex<()>,
}

impl<S: BlobStore> PinManager<S> {
    /// A manager over `store` with default derivation parameters and no
    /// blacklist.
    pub fn new(store: S) -> Self {
        Self {
            store,
            blacklist: Vec::new(),
            params: KdfParams::default(),
            lock: Mutex::new(()),
        }
    }

    /// Reject the given PINs (exact match) on every create/change. The
    /// blacklist is fixed for the lifetime of the manager.
    pub fn with_blacklist<I, T>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.blacklist = pins.into_iter().map(Into::into).collect();
        self
    }

    /// Derivation parameters for newly written credentials. Existing
    /// records keep verifying under their stored parameters.
    pub fn with_params(mut self, params: KdfParams) -> Self {
        self.params = params;
        self
    }

    /// Create the credential from `new_pin`.
    ///
    /// With `force` unset this fails with [`Error::AlreadyExists`] when a
    /// credential is present; with `force` set the record is replaced
    /// wholesale. Either way the write is a single atomic replacement — a
    /// half-written record is never observable.
    pub fn create_pin(&self, new_pin: &str, force: bool) -> Result<(), Error> {
        self.check_blacklisted(new_pin)?;

        let _guard = self.guard();

        if !force && self.store.exists() {
            return Err(Error::AlreadyExists);
        }

        self.write_record(new_pin)
    }

    /// Delete the credential. Returns whether one existed; removing twice
    /// is not an error.
    pub fn remove_pin(&self) -> Result<bool, Error> {
        let _guard = self.guard();
        self.store.delete()
    }

    /// Replace the credential after proving knowledge of the current PIN.
    ///
    /// Fails with [`Error::NotSet`] when no credential exists, with
    /// [`Error::BlacklistedPin`] when `new_pin` is blacklisted (checked
    /// before the old PIN is validated), and with
    /// [`Error::InvalidCredential`] when `old_pin` is wrong — in which
    /// case nothing is written and the old record stays intact.
    pub fn change_pin(&self, old_pin: &str, new_pin: &str) -> Result<(), Error> {
        let _guard = self.guard();

        if !self.store.exists() {
            return Err(Error::NotSet);
        }

        self.check_blacklisted(new_pin)?;

        if !self.validate(old_pin)? {
            return Err(Error::InvalidCredential);
        }

        self.write_record(new_pin)
    }

    /// Whether `candidate` matches the stored credential.
    ///
    /// Re-derives with the record's own stored algorithm, iterations, and
    /// salt — never the manager's current defaults — so records written
    /// under older parameters keep verifying until the next change
    /// upgrades them. Fails with [`Error::NotSet`] when no credential
    /// exists.
    pub fn is_valid_pin(&self, candidate: &str) -> Result<bool, Error> {
        let _guard = self.guard();
        self.validate(candidate)
    }

    /// Whether a usable credential is set. Absence is a normal state, not
    /// an error; a corrupt or unsupported record also reports `false`.
    pub fn is_pin_set(&self) -> Result<bool, Error> {
        let _guard = self.guard();

        match self.load_record() {
            Ok(_) => Ok(true),
            Err(Error::NotSet | Error::CorruptRecord(_) | Error::UnsupportedAlgorithm(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // a poisoned lock only means another thread panicked mid-call;
        // storage itself is still consistent thanks to atomic writes
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_blacklisted(&self, pin: &str) -> Result<(), Error> {
        if self.blacklist.iter().any(|b| b == pin) {
            return Err(Error::BlacklistedPin);
        }
        Ok(())
    }

    fn load_record(&self) -> Result<Record, Error> {
        let blob = match self.store.read() {
            Ok(blob) => blob,
            Err(Error::NotFound) => return Err(Error::NotSet),
            Err(e) => return Err(e),
        };

        Record::from_bytes(&blob)
    }

    /// Caller must hold the lock.
    fn validate(&self, candidate: &str) -> Result<bool, Error> {
        let record = self.load_record()?;

        let params = KdfParams::new(record.algorithm(), record.iterations())?;
        let candidate_hash = Zeroizing::new(kdf::derive(candidate, record.salt(), params)?);

        Ok(candidate_hash[..].ct_eq(&record.hash()[..]).into())
    }

    /// Caller must hold the lock. Fresh salt on every write; the previous
    /// record (if any) is replaced in one atomic step.
    fn write_record(&self, pin: &str) -> Result<(), Error> {
        let salt = kdf::generate_salt()?;
        let hash = kdf::derive(pin, &salt, self.params)?;

        let record = Record::new(self.params.algorithm(), self.params.iterations(), salt, hash);
        self.store.write(&record.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_params() -> KdfParams {
        KdfParams::new(Algorithm::Pbkdf2HmacSha256, MIN_ITERATIONS).unwrap()
    }

    fn store_at(path: std::path::PathBuf) -> EncryptedFileStore<StaticKey> {
        EncryptedFileStore::new(path, StaticKey::new([3u8; KEY_LEN]))
    }

    fn manager_at(path: std::path::PathBuf) -> PinManager<EncryptedFileStore<StaticKey>> {
        PinManager::new(store_at(path)).with_params(fast_params())
    }

    #[test]
    fn create_then_validate() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("4071", false).unwrap();
        assert!(manager.is_valid_pin("4071").unwrap());
        assert!(!manager.is_valid_pin("4072").unwrap());
    }

    #[test]
    fn create_without_force_fails_on_existing() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("4071", false).unwrap();
        match manager.create_pin("9999", false) {
            Err(Error::AlreadyExists) => {}
            other => panic!("expected AlreadyExists, got: {other:?}"),
        }

        // the original credential is untouched
        assert!(manager.is_valid_pin("4071").unwrap());
    }

    #[test]
    fn create_with_force_replaces() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("4071", false).unwrap();
        manager.create_pin("9999", true).unwrap();

        assert!(manager.is_valid_pin("9999").unwrap());
        assert!(!manager.is_valid_pin("4071").unwrap());
    }

    #[test]
    fn blacklisted_pin_rejected_on_create() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin")).with_blacklist(DEFAULT_BLACKLIST);

        match manager.create_pin("1234", false) {
            Err(Error::BlacklistedPin) => {}
            other => panic!("expected BlacklistedPin, got: {other:?}"),
        }
        assert!(!manager.is_pin_set().unwrap());
    }

    #[test]
    fn blacklist_rejection_leaves_prior_record() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin")).with_blacklist(DEFAULT_BLACKLIST);

        manager.create_pin("4071", false).unwrap();
        assert!(matches!(
            manager.create_pin("1111", true),
            Err(Error::BlacklistedPin)
        ));
        assert!(manager.is_valid_pin("4071").unwrap());
    }

    #[test]
    fn blacklist_not_consulted_on_validation() {
        let dir = tempdir().unwrap();
        // blacklist added after the fact, e.g. by a policy update
        let manager = manager_at(dir.path().join("pin")).with_blacklist(["4071"]);

        let setup = manager_at(dir.path().join("pin"));
        setup.create_pin("4071", false).unwrap();

        assert!(manager.is_valid_pin("4071").unwrap());
    }

    #[test]
    fn change_pin_happy_path() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("1111", false).unwrap();
        manager.change_pin("1111", "2222").unwrap();

        assert!(manager.is_valid_pin("2222").unwrap());
        assert!(!manager.is_valid_pin("1111").unwrap());
    }

    #[test]
    fn change_with_wrong_old_pin_keeps_record() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("1111", false).unwrap();
        match manager.change_pin("9999", "2222") {
            Err(Error::InvalidCredential) => {}
            other => panic!("expected InvalidCredential, got: {other:?}"),
        }

        assert!(manager.is_valid_pin("1111").unwrap());
        assert!(!manager.is_valid_pin("2222").unwrap());
    }

    #[test]
    fn change_checks_blacklist_before_old_pin() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin")).with_blacklist(DEFAULT_BLACKLIST);

        manager.create_pin("4071", false).unwrap();

        // wrong old PIN, blacklisted new PIN: the blacklist answer wins
        match manager.change_pin("0000", "1234") {
            Err(Error::BlacklistedPin) => {}
            other => panic!("expected BlacklistedPin, got: {other:?}"),
        }
    }

    #[test]
    fn operations_on_fresh_slot() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        assert!(!manager.is_pin_set().unwrap());
        assert!(matches!(manager.is_valid_pin("1111"), Err(Error::NotSet)));
        assert!(matches!(
            manager.change_pin("1111", "2222"),
            Err(Error::NotSet)
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        manager.create_pin("4071", false).unwrap();
        assert!(manager.remove_pin().unwrap());
        assert!(!manager.remove_pin().unwrap());
        assert!(!manager.is_pin_set().unwrap());
    }

    #[test]
    fn is_pin_set_tracks_lifecycle() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        assert!(!manager.is_pin_set().unwrap());
        manager.create_pin("4071", false).unwrap();
        assert!(manager.is_pin_set().unwrap());
        manager.remove_pin().unwrap();
        assert!(!manager.is_pin_set().unwrap());
    }

    #[test]
    fn is_pin_set_reports_false_for_corrupt_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pin");
        let manager = manager_at(path.clone());

        manager.create_pin("4071", false).unwrap();

        // flip a ciphertext bit behind the manager's back
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        std::fs::write(&path, &raw).unwrap();

        assert!(!manager.is_pin_set().unwrap());
        assert!(matches!(
            manager.is_valid_pin("4071"),
            Err(Error::CorruptRecord(_))
        ));
    }

    #[test]
    fn recreating_same_pin_uses_fresh_salt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pin");
        let manager = manager_at(path.clone());

        manager.create_pin("5555", false).unwrap();
        let first = Record::from_bytes(&store_at(path.clone()).read().unwrap()).unwrap();
        assert!(manager.is_valid_pin("5555").unwrap());

        manager.create_pin("5555", true).unwrap();
        let second = Record::from_bytes(&store_at(path).read().unwrap()).unwrap();
        assert!(manager.is_valid_pin("5555").unwrap());

        assert_ne!(first.salt(), second.salt());
        assert_ne!(first.hash(), second.hash());
    }

    #[test]
    fn validation_uses_stored_parameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pin");

        let legacy = KdfParams::new(Algorithm::Pbkdf2HmacSha1, 150_000).unwrap();
        let writer = manager_at(path.clone()).with_params(legacy);
        writer.create_pin("4071", false).unwrap();

        // a manager with different defaults still verifies the old record
        let reader = PinManager::new(store_at(path.clone()));
        assert!(reader.is_valid_pin("4071").unwrap());
        assert!(!reader.is_valid_pin("4072").unwrap());

        // ...until a change upgrades it to the reader's parameters
        reader.change_pin("4071", "8092").unwrap();
        let record = Record::from_bytes(&store_at(path).read().unwrap()).unwrap();
        assert_eq!(record.algorithm(), Algorithm::Pbkdf2HmacSha256);
        assert_eq!(record.iterations(), DEFAULT_ITERATIONS);
    }

    #[test]
    fn separate_slots_do_not_interfere() {
        let dir = tempdir().unwrap();
        let a = manager_at(dir.path().join("a.pin"));
        let b = manager_at(dir.path().join("b.pin"));

        a.create_pin("1111", false).unwrap();
        b.create_pin("2222", false).unwrap();

        assert!(a.is_valid_pin("1111").unwrap());
        assert!(b.is_valid_pin("2222").unwrap());

        a.remove_pin().unwrap();
        assert!(!a.is_pin_set().unwrap());
        assert!(b.is_pin_set().unwrap());
    }

    #[test]
    fn empty_pin_is_invalid_params() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path().join("pin"));

        assert!(matches!(
            manager.create_pin("", false),
            Err(Error::InvalidParams(_))
        ));
        assert!(!manager.is_pin_set().unwrap());
    }
}
