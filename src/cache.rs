//! On-disk manifest store, laid out like Steam's `depotcache`.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;

pub struct FileCache {
    root: PathBuf,
    seed_dirs: Vec<PathBuf>,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileCache {
            root: root.into(),
            seed_dirs: Vec::new(),
        }
    }

    /// Adds a directory of previously saved manifests to adopt before
    /// downloading.
    pub fn with_seed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.seed_dirs.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(depot_id: &str, manifest_id: &str) -> String {
        format!("{}_{}.manifest", depot_id, manifest_id)
    }

    pub fn path(&self, depot_id: &str, manifest_id: &str) -> PathBuf {
        self.root.join(Self::file_name(depot_id, manifest_id))
    }

    pub async fn exists(&self, depot_id: &str, manifest_id: &str) -> bool {
        fs::try_exists(self.path(depot_id, manifest_id))
            .await
            .unwrap_or(false)
    }

    /// Returns the cached file if present. A copy found in a seed directory
    /// is moved into the cache first.
    pub async fn lookup(&self, depot_id: &str, manifest_id: &str) -> Result<Option<PathBuf>> {
        let target = self.path(depot_id, manifest_id);
        if fs::try_exists(&target).await? {
            return Ok(Some(target));
        }

        let name = Self::file_name(depot_id, manifest_id);
        for dir in &self.seed_dirs {
            let candidate = dir.join(&name);
            if !fs::try_exists(&candidate).await? {
                continue;
            }
            fs::create_dir_all(&self.root).await?;
            if fs::rename(&candidate, &target).await.is_err() {
                // Different filesystem.
                fs::copy(&candidate, &target).await?;
                fs::remove_file(&candidate).await?;
            }
            tracing::info!("adopted saved manifest {}", candidate.display());
            return Ok(Some(target));
        }
        Ok(None)
    }

    /// Writes through a temporary file so a failed write never leaves a
    /// truncated manifest under the final name.
    pub async fn write(&self, depot_id: &str, manifest_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        let target = self.path(depot_id, manifest_id);
        let partial = target.with_extension("manifest.part");
        fs::write(&partial, bytes).await?;
        fs::rename(&partial, &target).await?;
        Ok(target)
    }
}
