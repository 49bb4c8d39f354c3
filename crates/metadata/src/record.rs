//! Build metadata records.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Derive the stable identifier for a manifest URL.
///
/// The identifier is the hex BLAKE3 digest of the URL exactly as given, so
/// the same URL always maps to the same record.
pub fn manifest_id(manifest_url: impl AsRef<str>) -> String {
    blake3::hash(manifest_url.as_ref().as_bytes()).to_hex().to_string()
}

/// Everything recorded about the latest build of one manifest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Derived from `manifest_url` with [`manifest_id`]; never changes.
    pub id: String,
    /// Starts at `1` and goes up by exactly one per rebuild.
    pub version: u64,
    pub manifest_url: String,
    /// Content hash of the manifest that produced `version`.
    pub manifest_hash: String,
    /// Packaging toolchain version used for the build.
    pub library_version: String,
}

impl MetadataRecord {
    /// Record for the first build of a manifest.
    pub fn new(
        manifest_url: impl Into<String>,
        manifest_hash: impl Into<String>,
        library_version: impl Into<String>,
    ) -> Self {
        let manifest_url = manifest_url.into();
        Self {
            id: manifest_id(&manifest_url),
            version: 1,
            manifest_url,
            manifest_hash: manifest_hash.into(),
            library_version: library_version.into(),
        }
    }

    /// Successor record for a content-only rebuild.
    ///
    /// The library version is carried over unchanged.
    pub fn rebuilt(&self, manifest_hash: impl Into<String>) -> Self {
        Self {
            version: self.version + 1,
            manifest_hash: manifest_hash.into(),
            ..self.clone()
        }
    }

    /// Successor record for a rebuild that may also have switched toolchain.
    pub fn rebuilt_with_library(&self, manifest_hash: impl Into<String>, library_version: impl Into<String>) -> Self {
        Self {
            library_version: library_version.into(),
            ..self.rebuilt(manifest_hash)
        }
    }

    /// Reject records with missing attributes before they reach the store.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("id", self.id.is_empty()),
            ("version", self.version == 0),
            ("manifest_url", self.manifest_url.is_empty()),
            ("manifest_hash", self.manifest_hash.is_empty()),
            ("library_version", self.library_version.is_empty()),
        ];
        match missing.into_iter().find(|(_, missing)| *missing) {
            Some((field, _)) => exn::bail!(ErrorKind::MalformedRecord(field)),
            None => Ok(()),
        }
    }
}

/// The slice of a record the staleness check needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionEntry {
    pub id: String,
    pub version: u64,
    pub manifest_url: String,
}

impl From<&MetadataRecord> for VersionEntry {
    fn from(record: &MetadataRecord) -> Self {
        Self {
            id: record.id.clone(),
            version: record.version,
            manifest_url: record.manifest_url.clone(),
        }
    }
}
