//! On-disk certificate cache.
//!
//! One file per key inside a single directory. Keys are hostnames (PEM
//! bundle: private key followed by the chain) or `acme_account.json`.
//! Writes go to a temporary file first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::acme::error::{AcmeError, AcmeResult};

/// Cache key of the ACME account credentials.
pub const ACCOUNT_KEY: &str = "acme_account.json";

#[derive(Debug, Clone)]
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a cached entry. A missing entry is `Ok(None)`.
    pub async fn get(&self, key: &str) -> AcmeResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AcmeError::Cache(e)),
        }
    }

    /// Store an entry, replacing any previous value.
    pub async fn put(&self, key: &str, data: &[u8]) -> AcmeResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, data).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(key, path = ?path, "Cache entry written");
        Ok(())
    }

    /// Remove an entry. Removing a missing entry is not an error.
    pub async fn delete(&self, key: &str) -> AcmeResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AcmeError::Cache(e)),
        }
    }

    fn path_for(&self, key: &str) -> AcmeResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'));
        if !valid {
            return Err(AcmeError::Cache(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid cache key: {key:?}"),
            )));
        }
        Ok(self.dir.join(key))
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
