//! Media asset records and the id -> path registry.
//!
//! The persistent library store is owned elsewhere; this module only models the
//! fields the pipeline reads and writes (`absolute_path` and `duration`) and
//! provides an in-memory implementation used by the daemon and by tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::duration::DurationResolver;
use crate::error::{MediaError, MediaResult};

/// One importable/playable media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    pub absolute_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Seconds; unset until first computed
    pub duration: Option<f64>,
}

impl MediaAsset {
    /// Stable id for a file: the same absolute path always maps to the same id
    pub fn id_for_path(path: &Path) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string()
    }
}

/// Writable side of the external library store
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Create (or return the existing) record for `path`
    async fn register(&self, path: &Path) -> MediaResult<MediaAsset>;

    async fn set_duration(&self, id: &str, secs: f64) -> MediaResult<()>;

    async fn get(&self, id: &str) -> Option<MediaAsset>;
}

/// Read-only lookup used by the delivery server
pub trait MediaIdRegistry: Send + Sync {
    fn resolve(&self, id: &str) -> Option<PathBuf>;
}

/// In-memory library implementing both the store and the registry
#[derive(Default)]
pub struct MediaLibrary {
    assets: RwLock<HashMap<String, MediaAsset>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }

    /// Point an explicit id at a path, as the library-scanning collaborator does
    pub fn insert_mapping(&self, id: &str, path: PathBuf) {
        let mut assets = self.assets.write();
        let asset = assets.entry(id.to_string()).or_insert_with(|| MediaAsset {
            id: id.to_string(),
            absolute_path: path.clone(),
            created_at: Utc::now(),
            duration: None,
        });
        asset.absolute_path = path;
    }
}

#[async_trait]
impl AssetStore for MediaLibrary {
    async fn register(&self, path: &Path) -> MediaResult<MediaAsset> {
        let absolute_path = std::path::absolute(path)?;
        let id = MediaAsset::id_for_path(&absolute_path);

        let mut assets = self.assets.write();
        let asset = assets.entry(id.clone()).or_insert_with(|| MediaAsset {
            id,
            absolute_path,
            created_at: Utc::now(),
            duration: None,
        });
        Ok(asset.clone())
    }

    async fn set_duration(&self, id: &str, secs: f64) -> MediaResult<()> {
        let mut assets = self.assets.write();
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| MediaError::AssetNotFound(id.to_string()))?;
        asset.duration = Some(secs);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<MediaAsset> {
        self.assets.read().get(id).cloned()
    }
}

impl MediaIdRegistry for MediaLibrary {
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        self.assets.read().get(id).map(|a| a.absolute_path.clone())
    }
}

/// The single registration path for finalized and recovered recordings
pub struct AssetCatalog {
    store: Arc<dyn AssetStore>,
    resolver: Arc<DurationResolver>,
}

impl AssetCatalog {
    pub fn new(store: Arc<dyn AssetStore>, resolver: Arc<DurationResolver>) -> Self {
        AssetCatalog { store, resolver }
    }

    /// Register `path` and record its duration when one can be determined
    pub async fn register(&self, path: &Path) -> MediaResult<MediaAsset> {
        let mut asset = self.store.register(path).await?;
        info!("📼 Registered media {} -> {}", asset.id, asset.absolute_path.display());

        if asset.duration.is_some() {
            return Ok(asset);
        }

        match self.resolver.resolve_duration(&asset.absolute_path).await {
            Ok(secs) if secs > 0.0 => {
                self.store.set_duration(&asset.id, secs).await?;
                asset.duration = Some(secs);
            }
            Ok(_) => {}
            Err(e) => warn!("Duration unavailable for {}: {}", asset.absolute_path.display(), e),
        }

        Ok(asset)
    }
}
