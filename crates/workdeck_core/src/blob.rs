//! Blob store seam for attachment payloads.
//!
//! # Responsibility
//! - Define the narrow store/delete/exists contract the core depends on.
//! - Provide the filesystem implementation used in production and tests.
//!
//! # Invariants
//! - The core never inspects blob contents; size/mime metadata comes from
//!   the caller.
//! - Stored paths are relative to the store root and use a short random
//!   prefix so repeated uploads of one file name do not collide.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug)]
pub enum BlobError {
    Io(io::Error),
    /// Destination hint or path escapes the store root or is empty.
    InvalidPath(String),
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::InvalidPath(value) => write!(f, "invalid blob path: `{value}`"),
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidPath(_) => None,
        }
    }
}

impl From<io::Error> for BlobError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Blob store contract.
pub trait BlobStore {
    /// Writes bytes under the destination hint. Returns the stored path.
    fn store(&self, bytes: &[u8], destination_hint: &str, file_name: &str)
        -> BlobResult<String>;
    /// Removes one stored blob. Removing an absent path is not an error.
    fn delete(&self, path: &str) -> BlobResult<()>;
    /// Whether a stored path currently exists.
    fn exists(&self, path: &str) -> bool;
}

/// Filesystem-backed blob store rooted at one directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|component| {
            matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if path.is_empty() || escapes {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn store(
        &self,
        bytes: &[u8],
        destination_hint: &str,
        file_name: &str,
    ) -> BlobResult<String> {
        if destination_hint.is_empty() || file_name.is_empty() {
            return Err(BlobError::InvalidPath(format!(
                "{destination_hint}/{file_name}"
            )));
        }
        let prefix: String = Uuid::new_v4().simple().to_string().chars().take(5).collect();
        let stored = format!("{destination_hint}/{prefix}{file_name}");
        let full_path = self.resolve(&stored)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, bytes)?;
        Ok(stored)
    }

    fn delete(&self, path: &str) -> BlobResult<()> {
        let full_path = self.resolve(path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|full_path| full_path.exists())
            .unwrap_or(false)
    }
}
