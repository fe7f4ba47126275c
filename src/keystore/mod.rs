//! Key-store binding for the AS2 transport.
//!
//! The store itself (PKCS#12 by default) is opened and used by the AS2
//! transport implementation; this crate only carries the binding (type,
//! location or bytes, password, and the write-back flag) and the
//! file-level safety checks around it. When partner certificates learned
//! from inbound traffic are persisted, the rewrite is atomic and a
//! concurrent replacement of the file is detected via its mtime.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::handlers::MessageHandler;

/// Container format of the key store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStoreType {
    /// PKCS#12 container. The Peppol default.
    #[default]
    Pkcs12,
    /// PEM bundle (private key plus certificates).
    Pem,
}

/// Where the key store lives. Exactly one source exists per config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreSource {
    /// A store file on disk; required when changes are to be saved.
    File(PathBuf),
    /// An in-memory store; changes are never persisted.
    Bytes(Vec<u8>),
}

/// The complete key-store binding handed to the AS2 transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStoreConfig {
    /// Container format.
    pub store_type: KeyStoreType,
    /// File or bytes.
    pub source: KeyStoreSource,
    /// Store password. May be empty, but must be set deliberately.
    pub password: String,
    /// Whether newly learned partner certificates are written back.
    pub save_changes_to_file: bool,
}

impl KeyStoreConfig {
    /// A file-backed store.
    pub fn from_file(
        store_type: KeyStoreType,
        path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            store_type,
            source: KeyStoreSource::File(path.into()),
            password: password.into(),
            save_changes_to_file: true,
        }
    }

    /// An in-memory store. Changes are never saved.
    pub fn from_bytes(
        store_type: KeyStoreType,
        bytes: Vec<u8>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            store_type,
            source: KeyStoreSource::Bytes(bytes),
            password: password.into(),
            save_changes_to_file: false,
        }
    }

    /// Set the write-back flag.
    pub fn save_changes(mut self, save: bool) -> Self {
        self.save_changes_to_file = save;
        self
    }

    /// Verify the binding, recording every problem on the handler.
    ///
    /// File stores must exist and be regular files; when changes are to
    /// be saved the file must also be writable (probed by opening it
    /// read-write). Byte stores must be non-empty.
    pub fn verify(&self, messages: &mut dyn MessageHandler) {
        match &self.source {
            KeyStoreSource::File(path) => {
                if !path.exists() {
                    messages.error(format!(
                        "the AS2 key store file '{}' does not exist",
                        path.display()
                    ));
                } else if !path.is_file() {
                    messages.error(format!(
                        "the AS2 key store path '{}' is not a file",
                        path.display()
                    ));
                } else if self.save_changes_to_file && !is_writable(path) {
                    messages.error(format!(
                        "the AS2 key store file '{}' is not writable, but changes are to be \
                         saved back to it",
                        path.display()
                    ));
                }
            }
            KeyStoreSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    messages.error("the AS2 key store bytes are empty".to_string());
                }
            }
        }
    }
}

fn is_writable(path: &Path) -> bool {
    OpenOptions::new().read(true).write(true).open(path).is_ok()
}

/// Error saving the key store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyStoreError {
    /// Reading or writing the store file failed.
    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file changed on disk since the guard was acquired.
    #[error("the key store file '{path}' was modified concurrently")]
    ConcurrentModification {
        /// The store file.
        path: PathBuf,
    },

    /// The guard points at something that is not a regular file.
    #[error("the key store path '{path}' is not a file")]
    NotAFile {
        /// The offending path.
        path: PathBuf,
    },
}

/// Guard for rewriting a key-store file.
///
/// Records the file's mtime at acquisition; [`KeyStoreSaveGuard::save_atomic`]
/// refuses to overwrite a file whose mtime moved in between. The write
/// itself goes through a temporary file in the same directory followed by
/// a rename, so readers never observe a half-written store.
#[derive(Debug)]
pub struct KeyStoreSaveGuard {
    path: PathBuf,
    observed_mtime: SystemTime,
}

impl KeyStoreSaveGuard {
    /// Acquire a guard for the given store file.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(KeyStoreError::NotAFile { path });
        }
        let observed_mtime = metadata.modified()?;
        Ok(Self {
            path,
            observed_mtime,
        })
    }

    /// The guarded store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the store content.
    pub fn save_atomic(&mut self, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let current_mtime = std::fs::metadata(&self.path)?.modified()?;
        if current_mtime != self.observed_mtime {
            return Err(KeyStoreError::ConcurrentModification {
                path: self.path.clone(),
            });
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut temp, bytes)?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        self.observed_mtime = std::fs::metadata(&self.path)?.modified()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::CollectingMessageHandler;

    #[test]
    fn missing_file_is_an_error() {
        let config = KeyStoreConfig::from_file(
            KeyStoreType::Pkcs12,
            "/definitely/not/here.p12",
            "secret",
        );
        let mut handler = CollectingMessageHandler::new();
        config.verify(&mut handler);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn empty_bytes_are_an_error() {
        let config = KeyStoreConfig::from_bytes(KeyStoreType::Pkcs12, Vec::new(), "secret");
        let mut handler = CollectingMessageHandler::new();
        config.verify(&mut handler);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn existing_file_passes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"store").unwrap();
        let config = KeyStoreConfig::from_file(KeyStoreType::Pkcs12, file.path(), "secret");
        let mut handler = CollectingMessageHandler::new();
        config.verify(&mut handler);
        assert_eq!(handler.error_count(), 0);
    }

    #[test]
    fn save_guard_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"v1").unwrap();
        let mut guard = KeyStoreSaveGuard::acquire(file.path()).unwrap();
        guard.save_atomic(b"v2").unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"v2");
        // The guard refreshed its mtime, so a second save still works.
        guard.save_atomic(b"v3").unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"v3");
    }

    #[test]
    fn concurrent_modification_is_detected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"v1").unwrap();
        let mut guard = KeyStoreSaveGuard::acquire(file.path()).unwrap();

        // Someone else rewrites the store with a clearly newer mtime.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::write(file.path(), b"other").unwrap();
        let times = std::fs::File::options()
            .write(true)
            .open(file.path())
            .unwrap();
        times.set_modified(later).unwrap();
        drop(times);

        let err = guard.save_atomic(b"v2").unwrap_err();
        assert!(matches!(err, KeyStoreError::ConcurrentModification { .. }));
    }
}
