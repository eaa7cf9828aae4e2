//! Object key validation for the storage service.
//!
//! Keeps keys relative and free of traversal so every backend can map them
//! onto its own namespace safely.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes an object key to prevent directory traversal.
///
/// # Security
/// Rejects keys that:
/// - Are absolute (start with `/` or drive letter)
/// - Contain `..` components
/// - Contain special components like root or prefix
/// - Are empty
pub(crate) fn validate_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Object path cannot be empty");
    }

    let path = Path::new(path);

    if path.is_absolute() {
        bail!("Object path cannot be absolute: {}", path.display());
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {},
            Component::ParentDir => {
                bail!("Object path cannot contain '..': {}", path.display())
            },
            Component::RootDir | Component::Prefix(_) => {
                bail!(
                    "Object path cannot contain root or prefix: {}",
                    path.display()
                )
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Object path normalized to empty path");
    }

    Ok(normalized)
}

/// Normalized object key with forward slashes.
///
/// A trailing `/` on the input is kept so directory markers stay
/// distinguishable from objects.
pub(crate) fn object_key(path: &str) -> Result<String> {
    let normalized = validate_path(path)?;
    let mut key = normalized.to_string_lossy().replace('\\', "/");
    if path.ends_with('/') {
        key.push('/');
    }
    Ok(key)
}

/// Returns the filesystem path for an object given a base directory and object key.
pub(crate) fn object_path(base_dir: &Path, path: &str) -> Result<PathBuf> {
    let normalized = validate_path(path)?;
    Ok(base_dir.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_normalizes() {
        assert_eq!(object_key("./raw_data/a.csv").unwrap(), "raw_data/a.csv");
        assert_eq!(object_key("raw_data//2024-01/").unwrap(), "raw_data/2024-01/");
    }

    #[test]
    fn test_traversal_rejected() {
        for path in ["", "../etc/passwd", "raw/../../x", "/etc/passwd", "."] {
            assert!(object_key(path).is_err(), "{path}");
        }
    }
}
