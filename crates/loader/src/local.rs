//! Local filesystem loader.
//!
//! Reads manifests and assets from a directory on disk, for development
//! servers and for packaging apps that are checked out next to the service.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_suffix;
use crate::util::ensure_parent_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Loads content from a directory on the local filesystem.
///
/// All suffixes are relative to the prefix directory.
///
/// # Examples
///
/// ```no_run
/// use packd_loader::LocalLoader;
///
/// # fn example() -> packd_loader::error::Result<()> {
/// // Relative prefixes are resolved against the current working directory.
/// let loader = LocalLoader::new(Some("apps/hello"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalLoader {
    prefix: PathBuf,
}
impl LocalLoader {
    /// Create a loader rooted at `prefix`, or at the current working
    /// directory when no prefix is given.
    pub fn new(prefix: Option<impl AsRef<Path>>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(ErrorKind::Io)?;
        let prefix = match prefix {
            // `join` keeps absolute prefixes as they are.
            Some(prefix) => cwd.join(prefix.as_ref()),
            None => cwd,
        };
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn source_path(&self, suffix: &str) -> Result<PathBuf> {
        Ok(self.prefix.join(validate_suffix(suffix)?))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Read the full contents of `prefix/suffix`.
    #[instrument(level = "debug", skip(self), fields(prefix = %self.prefix.display()))]
    pub async fn load(&self, suffix: &str) -> Result<Vec<u8>> {
        let source = self.source_path(suffix)?;
        Ok(fs::read(&source).await.map_err(|e| Self::map_io_error(e, &source))?)
    }

    /// Copy `prefix/suffix` to `destination`, creating parent directories of
    /// the destination as needed.
    #[instrument(level = "debug", skip(self), fields(prefix = %self.prefix.display()))]
    pub async fn copy(&self, suffix: &str, destination: &Path) -> Result<()> {
        let source = self.source_path(suffix)?;
        ensure_parent_dir(destination).await?;
        fs::copy(&source, destination).await.map_err(|e| Self::map_io_error(e, &source))?;
        Ok(())
    }
}
