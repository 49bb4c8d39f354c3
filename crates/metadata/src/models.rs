use crate::error::{Error, ErrorKind};
use crate::record::{MetadataRecord, VersionEntry};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub(crate) struct MetadataRow {
    pub(crate) id: String,
    pub(crate) version: i64,
    pub(crate) manifest_url: String,
    pub(crate) manifest_hash: String,
    pub(crate) library_version: String,
}
impl TryFrom<&MetadataRecord> for MetadataRow {
    type Error = Error;
    fn try_from(record: &MetadataRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.clone(),
            version: i64::try_from(record.version).or_raise(|| ErrorKind::InvalidData("version"))?,
            manifest_url: record.manifest_url.clone(),
            manifest_hash: record.manifest_hash.clone(),
            library_version: record.library_version.clone(),
        })
    }
}
impl TryFrom<MetadataRow> for MetadataRecord {
    type Error = Error;
    fn try_from(row: MetadataRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            version: u64::try_from(row.version).or_raise(|| ErrorKind::InvalidData("version"))?,
            manifest_url: row.manifest_url,
            manifest_hash: row.manifest_hash,
            library_version: row.library_version,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionRow {
    id: String,
    version: i64,
    manifest_url: String,
}
impl TryFrom<VersionRow> for VersionEntry {
    type Error = Error;
    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            version: u64::try_from(row.version).or_raise(|| ErrorKind::InvalidData("version"))?,
            manifest_url: row.manifest_url,
        })
    }
}
