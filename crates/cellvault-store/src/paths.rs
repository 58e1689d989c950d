//! Workbook path identity and change detection.

use std::fs;
use std::path::{Component, Path, PathBuf};

use cellvault_core::content_hash;

use crate::error::{Result, StoreError};

/// Resolve a workbook path to the absolute form used as its identity.
///
/// The longest existing prefix of the path is canonicalized (symlinks and
/// `..` resolved on disk) and the rest is cleaned lexically, so a path keeps
/// the same key before and after its file is created.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath("empty path".to_string()));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let components: Vec<Component<'_>> = absolute.components().collect();
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = fs::canonicalize(&prefix) {
            push_clean(&mut resolved, &components[split..]);
            return Ok(resolved);
        }
    }

    let mut clean = PathBuf::new();
    push_clean(&mut clean, &components);
    Ok(clean)
}

fn push_clean(base: &mut PathBuf, components: &[Component<'_>]) {
    for component in components {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
}

/// Normalized path as the string key stored in the database
pub(crate) fn path_key(path: &Path) -> Result<String> {
    let normalized = normalize_path(path)?;
    normalized
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidPath(normalized.display().to_string()))
}

/// Size and content hash of a workbook file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub hash: String,
}

impl FileFingerprint {
    /// Fingerprint the file at `path`, or `None` if it does not exist
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(Self {
            size: bytes.len() as u64,
            hash: content_hash(&bytes),
        }))
    }
}
