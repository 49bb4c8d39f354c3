use exn::ResultExt;
use packd_loader::{ContentLoader, content_hash};
use packd_metadata::{BuildPlan, InstalledRequest, MetadataService, StalenessDetector, manifest_id};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::Failure;

type Result<T> = std::result::Result<T, exn::Exn<Failure>>;

pub async fn show(service: &MetadataService, manifest_url: &str) -> Result<()> {
    let id = manifest_id(manifest_url);
    match service.get_metadata(&id).await.or_raise(|| Failure::Metadata)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record).or_raise(|| Failure::Output)?),
        None => tracing::info!(manifest_url, "No build recorded"),
    }
    Ok(())
}

pub async fn record(
    service: &MetadataService,
    manifest_url: &str,
    library_version: &str,
    source: Option<&str>,
    manifest: Option<&str>,
) -> Result<()> {
    let (loader, suffix) = manifest_source(manifest_url, source, manifest).or_raise(|| Failure::Load)?;
    let bytes = loader.load(&suffix).await.or_raise(|| Failure::Load)?;
    let hash = content_hash(&bytes);
    let plan = service
        .plan_build(manifest_url, &hash, library_version)
        .await
        .or_raise(|| Failure::Metadata)?;
    match &plan {
        BuildPlan::Create(_) => tracing::info!(manifest_url, "First build"),
        BuildPlan::Rebuild { previous, next } => {
            tracing::info!(manifest_url, from = previous.version, to = next.version, "Rebuild")
        },
        BuildPlan::UpToDate(current) => tracing::info!(manifest_url, version = current.version, "Already up to date"),
    }
    let current = service.record_build(plan).await.or_raise(|| Failure::Metadata)?;
    println!("{}", serde_json::to_string_pretty(&current).or_raise(|| Failure::Output)?);
    Ok(())
}

pub async fn outdated(detector: &StalenessDetector, input: Option<&Path>) -> Result<()> {
    let body = match input {
        Some(path) if path != Path::new("-") => tokio::fs::read(path).await.or_raise(|| Failure::Input)?,
        _ => {
            let mut body = Vec::new();
            tokio::io::stdin().read_to_end(&mut body).await.or_raise(|| Failure::Input)?;
            body
        },
    };
    let request: InstalledRequest = serde_json::from_slice(&body).or_raise(|| Failure::Input)?;
    let response = detector.respond(&request).await.or_raise(|| Failure::Metadata)?;
    println!("{}", serde_json::to_string(&response).or_raise(|| Failure::Output)?);
    Ok(())
}

/// Choose where the manifest bytes come from.
///
/// With `--manifest`, it is loaded relative to `source` (or the working
/// directory). Without it, the manifest URL itself is the location: fetched
/// whole if remote, otherwise read as a file path.
fn manifest_source(
    manifest_url: &str,
    source: Option<&str>,
    manifest: Option<&str>,
) -> packd_loader::error::Result<(ContentLoader, String)> {
    if let Some(manifest) = manifest {
        return Ok((ContentLoader::new(source)?, manifest.to_string()));
    }
    let loader = ContentLoader::new(Some(manifest_url))?;
    if loader.is_remote() {
        return Ok((loader, String::new()));
    }
    let path = PathBuf::from(manifest_url);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().and_then(Path::to_str).filter(|p| !p.is_empty());
    Ok((ContentLoader::new(parent)?, file_name))
}
