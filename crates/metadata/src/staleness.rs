//! Which installed apps are behind their latest build.

use crate::error::Result;
use crate::store::StoreHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// Request body: installed version per manifest URL.
///
/// Clients only know the URLs they installed from, never record identifiers.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstalledRequest {
    pub installed: HashMap<String, u64>,
}

/// Response body: manifest URLs with a newer build available, sorted.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutdatedResponse {
    pub outdated: Vec<String>,
}

/// Compares installed versions against the store.
///
/// Always scans the store directly. The TTL cache is for point lookups and is
/// never consulted here, so results reflect every completed write.
#[derive(Clone)]
pub struct StalenessDetector {
    store: StoreHandle,
}

impl StalenessDetector {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Manifest URLs of every record that `installed` reports at a version
    /// strictly lower than the stored one.
    ///
    /// URLs unknown to the store, and stored records not mentioned in
    /// `installed`, are ignored. An empty map short-circuits without touching
    /// the store.
    #[instrument(level = "debug", skip_all, fields(store = self.store.name(), installed = installed.len()))]
    pub async fn find_outdated(&self, installed: &HashMap<String, u64>) -> Result<BTreeSet<String>> {
        if installed.is_empty() {
            return Ok(BTreeSet::new());
        }
        let outdated: BTreeSet<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|entry| installed.get(&entry.manifest_url).is_some_and(|v| *v < entry.version))
            .map(|entry| entry.manifest_url)
            .collect();
        tracing::debug!(outdated = outdated.len(), "Compared installed versions");
        Ok(outdated)
    }

    pub async fn respond(&self, request: &InstalledRequest) -> Result<OutdatedResponse> {
        let outdated = self.find_outdated(&request.installed).await?;
        Ok(OutdatedResponse {
            outdated: outdated.into_iter().collect(),
        })
    }
}
