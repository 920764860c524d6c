use std::io;
use std::path::Path;

use async_trait::async_trait;

/// File access used when collecting result files.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Removes a file. A missing file is not an error.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
