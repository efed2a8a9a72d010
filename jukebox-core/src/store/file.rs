//! JSON file store
//!
//! One pretty-printed JSON file per key inside a data directory. Writes go
//! to a temporary file first and are renamed into place, so a crash never
//! leaves a half-written record behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{KeyValueStore, StoreError};

const RECORD_EXTENSION: &str = "json";

/// Longest encoded key used as a file name as is. Keeps the name plus the
/// temporary suffix well under the usual 255 byte limit.
const MAX_PLAIN_NAME: usize = 200;

/// Encoded bytes kept in front of the hash for longer keys
const HASHED_PREFIX: usize = 64;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        debug!("File store opened at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys may contain anything, file names may not
    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = urlencoding::encode(key);
        if encoded.len() <= MAX_PLAIN_NAME {
            return self.dir.join(format!("{}.{}", encoded, RECORD_EXTENSION));
        }

        // Encoded keys are ASCII, so any byte offset is a char boundary
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!(
            "{}-{:x}.{}",
            &encoded[..HASHED_PREFIX],
            hasher.finalize(),
            RECORD_EXTENSION
        ))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));

        let bytes = serde_json::to_vec_pretty(&value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;

        fs::write(&tmp, bytes)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }
}
