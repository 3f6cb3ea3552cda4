/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable versioned file storage.
//!
//! A replica applies every decided [value](crate::types::value::Value) to its [`Storage`]. Files are
//! named byte strings with a [`Version`] that changes on every mutation. Writers may pass the version
//! they last observed as `expected`; the write then fails if the file changed in between. Passing
//! `None` writes unconditionally.
//!
//! [`MemStorage`] is an in-memory implementation that can be shared between a node and the code
//! that observes it.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::types::data_types::Version;

pub trait Storage: Send + 'static {
    /// Create an empty file if it does not exist yet. Returns the file's version.
    fn create(&mut self, filename: &str) -> Version;

    fn exists(&self, filename: &str) -> bool;

    /// Get the content and version of a file, or None if the file does not exist.
    fn read(&self, filename: &str) -> Option<(Vec<u8>, Version)>;

    fn append(
        &mut self,
        filename: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Version, StorageError>;

    fn overwrite(
        &mut self,
        filename: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Version, StorageError>;

    /// Delete a file. Returns whether the file existed.
    fn delete(&mut self, filename: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    FileNotFound {
        filename: String,
    },

    /// The file was modified after the writer last observed it.
    VersionMismatch {
        filename: String,
        expected: Version,
        current: Version,
    },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound { filename } => write!(f, "file {} not found", filename),
            StorageError::VersionMismatch {
                filename,
                expected,
                current,
            } => write!(
                f,
                "file {} is at version {}, expected {}",
                filename, current, expected
            ),
        }
    }
}

/// In-memory [`Storage`]. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemStorage(Arc<Mutex<MemFiles>>);

#[derive(Default)]
struct MemFiles {
    files: HashMap<String, (Vec<u8>, Version)>,
    clock: u64,
}

impl MemFiles {
    fn tick(&mut self) -> Version {
        self.clock += 1;
        Version::new(self.clock)
    }

    fn write(
        &mut self,
        filename: &str,
        expected: Option<Version>,
        mutate: impl FnOnce(&mut Vec<u8>),
    ) -> Result<Version, StorageError> {
        let current = match self.files.get(filename) {
            Some((_, version)) => *version,
            None => {
                return Err(StorageError::FileNotFound {
                    filename: filename.to_string(),
                })
            }
        };
        if let Some(expected) = expected {
            if expected != current {
                return Err(StorageError::VersionMismatch {
                    filename: filename.to_string(),
                    expected,
                    current,
                });
            }
        }

        let version = self.tick();
        if let Some((content, file_version)) = self.files.get_mut(filename) {
            mutate(content);
            *file_version = version;
        }
        Ok(version)
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a file's content, ignoring its version.
    pub fn content(&self, filename: &str) -> Option<Vec<u8>> {
        self.read(filename).map(|(content, _)| content)
    }

    fn files(&self) -> MutexGuard<'_, MemFiles> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemStorage {
    fn create(&mut self, filename: &str) -> Version {
        let mut files = self.files();
        if let Some((_, version)) = files.files.get(filename) {
            return *version;
        }
        let version = files.tick();
        files.files.insert(filename.to_string(), (Vec::new(), version));
        version
    }

    fn exists(&self, filename: &str) -> bool {
        self.files().files.contains_key(filename)
    }

    fn read(&self, filename: &str) -> Option<(Vec<u8>, Version)> {
        self.files().files.get(filename).cloned()
    }

    fn append(
        &mut self,
        filename: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Version, StorageError> {
        self.files()
            .write(filename, expected, |content| content.extend_from_slice(data))
    }

    fn overwrite(
        &mut self,
        filename: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Version, StorageError> {
        self.files().write(filename, expected, |content| {
            content.clear();
            content.extend_from_slice(data)
        })
    }

    fn delete(&mut self, filename: &str) -> bool {
        self.files().files.remove(filename).is_some()
    }
}
