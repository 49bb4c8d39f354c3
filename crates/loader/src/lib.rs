//! Content loading for manifests and their assets.
//!
//! Apps are packaged either from a local checkout or from wherever they are
//! hosted. [`ContentLoader`] hides that difference behind two operations,
//! [`load`](ContentLoader::load) and [`copy`](ContentLoader::copy). The
//! variant is picked once, from the shape of the prefix, when the loader is
//! constructed.

pub mod error;
mod local;
mod path;
mod remote;
mod util;

pub use crate::local::LocalLoader;
pub use crate::path::validate as validate_suffix;
pub use crate::remote::RemoteLoader;
use crate::error::Result;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static REMOTE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+://").unwrap());

/// Loader for manifest and asset bytes.
///
/// # Examples
///
/// ```no_run
/// use packd_loader::ContentLoader;
///
/// # async fn example() -> packd_loader::error::Result<()> {
/// let hosted = ContentLoader::new(Some("https://example.com/app/"))?;
/// assert!(hosted.is_remote());
/// let manifest = hosted.load("manifest.webapp").await?;
///
/// let checkout = ContentLoader::new(Some("./apps/hello"))?;
/// checkout.copy("icons/128.png", "build/res/drawable/icon.png".as_ref()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum ContentLoader {
    Local(LocalLoader),
    Remote(RemoteLoader),
}
impl ContentLoader {
    /// Pick the loader variant for `prefix`.
    ///
    /// Anything that starts with a URL scheme (`^\w+://`) is remote;
    /// everything else, including no prefix at all, is a local directory.
    pub fn new(prefix: Option<&str>) -> Result<Self> {
        match prefix {
            Some(prefix) if REMOTE_PREFIX.is_match(prefix) => Ok(Self::Remote(RemoteLoader::new(prefix)?)),
            prefix => Ok(Self::Local(LocalLoader::new(prefix)?)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Read the content at `suffix` in full.
    pub async fn load(&self, suffix: &str) -> Result<Vec<u8>> {
        match self {
            Self::Local(loader) => loader.load(suffix).await,
            Self::Remote(loader) => loader.load(suffix).await,
        }
    }

    /// Copy the content at `suffix` into the file at `destination`.
    pub async fn copy(&self, suffix: &str, destination: &Path) -> Result<()> {
        match self {
            Self::Local(loader) => loader.copy(suffix, destination).await,
            Self::Remote(loader) => loader.copy(suffix, destination).await,
        }
    }
}

/// Hex-encoded BLAKE3 digest of manifest (or asset) content.
///
/// This is the `manifest_hash` recorded alongside each build.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    blake3::hash(bytes.as_ref()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("https://example.com/app/"), true)]
    #[case(Some("http://localhost:8080"), true)]
    #[case(Some("ftp_2://weird"), true)]
    #[case(Some("apps/hello"), false)]
    #[case(Some("/srv/apps/hello"), false)]
    #[case(Some("example.com/app"), false)]
    #[case(None, false)]
    fn test_variant_selection(#[case] prefix: Option<&str>, #[case] remote: bool) {
        let loader = ContentLoader::new(prefix).unwrap();
        assert_eq!(loader.is_remote(), remote);
    }

    #[tokio::test]
    async fn test_local_variant_dispatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("manifest.webapp"), b"{}").unwrap();
        let loader = ContentLoader::new(temp_dir.path().to_str()).unwrap();
        assert_eq!(loader.load("manifest.webapp").await.unwrap(), b"{}");
        let destination = temp_dir.path().join("out/manifest.json");
        loader.copy("manifest.webapp", &destination).await.unwrap();
        assert!(destination.exists());
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let hash = content_hash(b"{\"name\":\"Hello\"}");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash(b"{\"name\":\"Hello\"}"));
        assert_ne!(hash, content_hash(b"{\"name\":\"Hello!\"}"));
    }
}
