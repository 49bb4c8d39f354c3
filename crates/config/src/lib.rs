//! Layered configuration for packd.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults.
//! 2. `packd.toml`, `packd.yaml`/`packd.yml` or `packd.json` in the platform
//!    configuration directory, *or* the single file passed explicitly.
//! 3. `PACKD_*` environment variables (`PACKD_TTL_SECONDS=30`).
//!
//! Keys may be spelled in camelCase (`ttlSeconds`) or snake_case
//! (`ttl_seconds`); both spellings name the same setting.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::{Dict, Map};
use figment::{Figment, Metadata, Profile, Provider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "PACKD_";
const FILE_STEM: &str = "packd";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Lifetime of a cached metadata record, in seconds.
    pub ttl_seconds: u64,
    /// Capacity of the metadata cache.
    pub max_cache_entries: usize,
    /// SQLite database: a file path, an `sqlite:` URL or `:memory:`.
    pub store_connection: String,
    /// Default prefix for loading manifests (directory or URL).
    pub source: Option<String>,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let store_connection = project_dirs()
            .map(|dirs| dirs.data_dir().join("packd.db"))
            .unwrap_or_else(|| PathBuf::from("packd.db"));
        Self {
            ttl_seconds: 60,
            max_cache_entries: 5000,
            store_connection: store_connection.to_string_lossy().into_owned(),
            source: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from every source, using `explicit` instead of the platform
    /// configuration files when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match explicit {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment.merge(file_provider(path)?)
            },
            None => match project_dirs() {
                Some(dirs) => discovered(figment, dirs.config_dir()),
                None => figment,
            },
        };
        Self::extract(figment.merge(SnakeKeys(Env::prefixed(ENV_PREFIX))))
    }

    /// Extract and validate from an already layered figment.
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            exn::bail!(ErrorKind::Invalid("ttlSeconds"));
        }
        if self.max_cache_entries == 0 {
            exn::bail!(ErrorKind::Invalid("maxCacheEntries"));
        }
        if self.store_connection.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("storeConnection"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", FILE_STEM)
}

/// Merge whichever of the well-known configuration files exist in `dir`.
fn discovered(mut figment: Figment, dir: &Path) -> Figment {
    for extension in ["toml", "yaml", "yml", "json"] {
        let path = dir.join(FILE_STEM).with_extension(extension);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "Found configuration file");
            // Extension is known to be supported at this point.
            if let Ok(provider) = file_provider(&path) {
                figment = figment.merge(provider);
            }
        }
    }
    figment
}

fn file_provider(path: &Path) -> Result<SnakeKeys<Figment>> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => Figment::from(Toml::file_exact(path)),
        Some("yaml" | "yml") => Figment::from(Yaml::file_exact(path)),
        Some("json") => Figment::from(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(SnakeKeys(figment))
}

/// Rewrites top-level camelCase keys of the wrapped provider to snake_case.
struct SnakeKeys<P>(P);

impl<P: Provider> Provider for SnakeKeys<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        Ok(self
            .0
            .data()?
            .into_iter()
            .map(|(profile, dict)| (profile, dict.into_iter().map(|(key, value)| (snake_case(&key), value)).collect()))
            .collect())
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
