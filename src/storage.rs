//! Storage backends for the persisted credential blob.
//!
//! The credential manager only sees [`BlobStore`]: an opaque, atomically
//! replaceable, encrypted-at-rest slot for a single blob. The shipped
//! implementation is [`EncryptedFileStore`]; platforms with their own
//! secure storage implement the trait instead.

use crate::crypto::{KEY_LEN, NONCE_LEN, aead};
use crate::error::Error;
use directories::ProjectDirs;
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, Zeroizing};

/// A single-slot store for the credential blob.
///
/// An implementation is scoped to one storage location at construction.
/// Required contract:
/// - `write` replaces the slot atomically: a concurrent or subsequent
///   reader sees the fully-old or fully-new blob, never a partial write.
/// - the blob is encrypted at rest, and `read` fails with
///   [`Error::CorruptRecord`] if its integrity check fails; garbage is
///   never returned as data.
pub trait BlobStore {
    /// Replace the slot's content with `data`, all-or-nothing.
    fn write(&self, data: &[u8]) -> Result<(), Error>;

    /// Read and decrypt the slot. Fails with [`Error::NotFound`] when the
    /// slot is empty.
    fn read(&self) -> Result<Zeroizing<Vec<u8>>, Error>;

    /// Delete the slot's content. Returns whether anything existed.
    fn delete(&self) -> Result<bool, Error>;

    /// Whether the slot currently holds a blob.
    fn exists(&self) -> bool;
}

/// A source of the 256-bit at-rest encryption key.
///
/// This is the boundary to platform key custody (keystore, enclave, OS
/// keychain): the store never holds key material of its own, it asks the
/// source at each use. A source may fail when the device is not in an
/// acceptable security state.
pub trait KeySource {
    fn key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, Error>;
}

/// A fixed in-process key, zeroized on drop.
///
/// Suitable for tests and for callers that already unwrap their platform
/// key elsewhere.
pub struct StaticKey([u8; KEY_LEN]);

impl StaticKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self(key)
    }
}

impl Drop for StaticKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl KeySource for StaticKey {
    fn key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, Error> {
        Ok(Zeroizing::new(self.0))
    }
}

/// File-backed [`BlobStore`]: XChaCha20-Poly1305 at rest, crash-safe
/// atomic replacement on write.
///
/// On-disk layout is `NONCE (24) | CIPHERTEXT`, a fresh nonce per write.
pub struct EncryptedFileStore<K: KeySource> {
    path: PathBuf,
    key_source: K,
}

impl<K: KeySource> EncryptedFileStore<K> {
    pub fn new(path: PathBuf, key_source: K) -> Self {
        Self { path, key_source }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf, Error> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|_| Error::Rng)?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Storage(io::Error::other("storage path has no file name")))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` so the
    /// swap is atomic and persisted.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), Error> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        // ReplaceFileW fails if the target does not exist yet
        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(Error::Storage(io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same
    /// filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), Error> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

impl<K: KeySource> BlobStore for EncryptedFileStore<K> {
    /// Encrypts and writes the blob crash-safely:
    /// 1. encrypt under a fresh nonce
    /// 2. write to a temporary file with a random name, fsync it
    /// 3. atomically replace the old file
    /// 4. fsync the parent directory so the rename is persisted
    ///
    /// A crash mid-write leaves either the old or the new file, never a
    /// corrupted partial one.
    fn write(&self, data: &[u8]) -> Result<(), Error> {
        let key = self.key_source.key()?;
        let (ciphertext, nonce) = aead::encrypt(&*key, data)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        let write_result = tmp_file
            .write_all(&blob)
            .and_then(|_| tmp_file.sync_all());
        drop(tmp_file);

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // fsync directory
        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    fn read(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        };

        if blob.len() < NONCE_LEN {
            return Err(Error::CorruptRecord("blob shorter than nonce"));
        }

        let key = self.key_source.key()?;
        aead::decrypt(&*key, &blob[..NONCE_LEN], &blob[NONCE_LEN..])
    }

    fn delete(&self) -> Result<bool, Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Resolve the conventional per-user path for a named credential slot.
pub fn default_store_path(name: &str) -> Result<PathBuf, Error> {
    let project_dirs = ProjectDirs::from("", "", "pinlock").ok_or_else(|| {
        Error::Storage(io::Error::other("could not determine platform directories"))
    })?;

    Ok(project_dirs.data_dir().join(name))
}
