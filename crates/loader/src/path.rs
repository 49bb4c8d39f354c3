//! Suffix validation for local loads.
//!
//! Manifests name their assets with relative paths (`package_path`, icons,
//! launch paths). Those suffixes are joined onto the loader prefix, so they
//! must never climb out of it.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a suffix and returns it normalized.
///
/// `.` components and repeated separators are dropped, `..` is resolved
/// against the components seen so far, and anything that would end up
/// outside the prefix is rejected with [`InvalidPath`](ErrorKind::InvalidPath).
/// A leading `/` is treated as relative to the prefix.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use packd_loader::validate_suffix;
/// assert!(validate_suffix("manifest.webapp").is_ok());
/// assert!(validate_suffix("/icons/128.png").is_ok());
/// assert!(validate_suffix("icons/../manifest.webapp").is_ok());
/// assert!(validate_suffix("../secrets.json").is_err());
/// assert_eq!(
///     validate_suffix("./app//icons/./128.png").unwrap(),
///     Path::new("app/icons/128.png")
/// );
/// ```
pub fn validate(suffix: impl AsRef<Path>) -> Result<PathBuf> {
    let suffix = suffix.as_ref();
    // `None` as soon as a component would leave the prefix or is unusable.
    let normalized = suffix.components().try_fold(PathBuf::new(), |mut path, component| match component {
        Component::CurDir | Component::RootDir => Some(path),
        // Null bytes survive Path::components() on Unix but truncate paths
        // in the underlying syscalls.
        Component::Normal(name) if !name.as_encoded_bytes().contains(&0) => {
            path.push(name);
            Some(path)
        },
        Component::ParentDir => path.pop().then_some(path),
        Component::Normal(_) | Component::Prefix(_) => None,
    });
    match normalized {
        // A suffix has to name something below the prefix, not the prefix itself.
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => exn::bail!(ErrorKind::InvalidPath(suffix.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("manifest.webapp", "manifest.webapp")]
    #[case("/manifest.webapp", "manifest.webapp")]
    #[case("app//icons/./128.png", "app/icons/128.png")]
    #[case("app/icons/..", "app")]
    #[case("package/", "package")]
    fn test_valid_suffixes(#[case] suffix: &str, #[case] expected: &str) {
        assert_eq!(validate(suffix).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("..")]
    #[case("../manifest.webapp")]
    #[case("app/../../manifest.webapp")]
    #[case("app\0.zip")]
    #[case("icons/../..")]
    #[case("./icons/..")]
    fn test_invalid_suffixes(#[case] suffix: &str) {
        let err = validate(suffix).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
