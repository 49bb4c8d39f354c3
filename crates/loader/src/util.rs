use crate::error::{ErrorKind, Result};
use std::path::Path;
use tokio::fs;

/// Create the parent directory of `file` (and its ancestors) if missing.
pub(crate) async fn ensure_parent_dir(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
    }
    Ok(())
}
