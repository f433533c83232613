use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::StorageError;

/// Durable home of one client's session data
#[async_trait::async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load the stored session, `None` when nothing has been written yet
    async fn load_session(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the stored session
    async fn store_session(&self, data: Vec<u8>) -> Result<(), StorageError>;

    /// Delete the stored session; missing data is not an error
    async fn remove_session(&self) -> Result<(), StorageError>;
}

/// File-based session storage, one file per client
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage backed by a freshly named file inside `dir`.
    ///
    /// Names combine the creation time in nanoseconds with a random UUID so
    /// concurrent creations never collide.
    pub fn unique_in(dir: &Path) -> Self {
        Self::new(dir.join(unique_session_name()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Blocking removal used from `Drop`
    pub(crate) fn remove_now(&self) {
        for path in [self.path.clone(), self.staging_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed session file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove session file {}: {}", path.display(), e),
            }
        }
    }
}

pub fn unique_session_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("session_{}_{}.json", nanos, uuid::Uuid::new_v4().simple())
}

#[async_trait::async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load_session(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(content) if content.is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn store_session(&self, data: Vec<u8>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers never observe a half-written file
        let staging = self.staging_path();
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn remove_session(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}
