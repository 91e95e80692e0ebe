//! Disk-backed response cache.
//!
//! Each entry is a JSON envelope named after the SHA-256 of its key. Entries
//! are written to a temporary file and renamed into place, so readers see
//! either the previous envelope or the new one, never a partial write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::warn;

use super::error::CacheError;
use super::keys::CacheKey;
use super::response::CachedResponse;
use super::store::Cache;

const ENTRY_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct Envelope {
    key: CacheKey,
    response: CachedResponse,
}

pub struct DiskCache {
    directory: PathBuf,
}

impl DiskCache {
    /// Open (and create if needed) a cache rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.key().as_bytes());
        hasher.update([0, u8::from(key.is_complete())]);
        self.directory
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(hasher.finalize())))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(cache = "disk", directory = %self.directory.display(), error = %err, "failed to list cache directory");
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|extension| extension == ENTRY_EXTENSION)
            })
            .collect()
    }

    fn read_envelope(&self, path: &Path) -> Option<Envelope> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(cache = "disk", path = %path.display(), error = %err, "failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                warn!(
                    cache = "disk",
                    path = %path.display(),
                    error = %err,
                    "discarding corrupt cache entry"
                );
                let _ = fs::remove_file(path);
                None
            }
        }
    }
}

impl Cache for DiskCache {
    fn store(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError> {
        let path = self.entry_path(&key);
        let encoded = serde_json::to_vec(&Envelope { key, response })?;

        let mut staged = NamedTempFile::new_in(&self.directory)?;
        staged.write_all(&encoded)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&path)
            .map_err(|err| CacheError::Persist(err.error.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let envelope = self.read_envelope(&self.entry_path(key))?;
        // Digest collisions are not worth handling beyond refusing the entry.
        (envelope.key == *key).then_some(envelope.response)
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    fn clear(&self) -> Result<(), CacheError> {
        for path in self.entry_files() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.entry_files()
            .iter()
            .filter_map(|path| self.read_envelope(path))
            .map(|envelope| envelope.key)
            .collect()
    }
}
