use super::ImagePuller;
use super::{relative_cache_path, sanitize_cache_path};
use crate::assets::Asset;
use crate::portal::{CommandRunner, shell_quote};
use kubelite_shared::constants::remote::IMAGE_LOAD_DIR;
use kubelite_shared::errors::{ImageFailure, KubeliteError, KubeliteResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Host-side cache of image archives, keyed by sanitized reference.
///
/// A plain file at [`ImageCache::cache_path`] is a hit. Writes go to a
/// temporary file in the same directory and are renamed into place, so a
/// present file is always a complete archive.
#[derive(Clone)]
pub struct ImageCache {
    cache_root: PathBuf,
    puller: Arc<dyn ImagePuller>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("cache_root", &self.cache_root)
            .finish()
    }
}

impl ImageCache {
    pub fn new(cache_root: impl Into<PathBuf>, puller: Arc<dyn ImagePuller>) -> Self {
        Self {
            cache_root: cache_root.into(),
            puller,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache location of `image`. References that would leave the cache
    /// root (`..` segments, absolute paths) are rejected.
    pub fn cache_path(&self, image: &str) -> KubeliteResult<PathBuf> {
        let relative = relative_cache_path(&sanitize_cache_path(image)).ok_or_else(|| {
            KubeliteError::Config(format!("invalid image reference '{}'", image))
        })?;
        Ok(self.cache_root.join(relative))
    }

    /// Make sure `image` is in the cache, pulling it on a miss.
    pub async fn cache_image(&self, image: &str) -> KubeliteResult<PathBuf> {
        let path = self.cache_path(image)?;
        if path.is_file() {
            tracing::debug!(image, path = %path.display(), "Image cache hit");
            return Ok(path);
        }

        let parent = path
            .parent()
            .ok_or_else(|| KubeliteError::Internal(format!("no parent for {}", path.display())))?;
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            KubeliteError::Storage(format!("creating {}: {}", parent.display(), e))
        })?;

        let staged = tempfile::Builder::new()
            .prefix(".pull-")
            .suffix(".partial")
            .tempfile_in(parent)
            .map_err(|e| {
                KubeliteError::Storage(format!("staging in {}: {}", parent.display(), e))
            })?
            .into_temp_path();

        tracing::info!(image, "Pulling image into cache");
        // Dropping `staged` on error removes the partial archive.
        self.puller.pull(image, &staged).await?;

        staged.persist(&path).map_err(|e| {
            KubeliteError::Storage(format!("committing {}: {}", path.display(), e))
        })?;
        tracing::debug!(image, path = %path.display(), "Image cached");
        Ok(path)
    }

    /// Transfer a cached archive to the machine and load it into the engine.
    pub async fn load_from_cache(
        &self,
        runner: &dyn CommandRunner,
        archive: &Path,
    ) -> KubeliteResult<()> {
        // Mirror the cache layout under the load dir, so distinct archives
        // never share a remote path.
        let relative = archive
            .strip_prefix(&self.cache_root)
            .ok()
            .map(Path::to_path_buf)
            .or_else(|| archive.file_name().map(PathBuf::from))
            .filter(|p| p.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| {
                KubeliteError::Config(format!("invalid archive path {}", archive.display()))
            })?;
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                KubeliteError::Config(format!("invalid archive path {}", archive.display()))
            })?;
        let target_dir = match relative.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                format!("{}/{}", IMAGE_LOAD_DIR, parent.to_string_lossy())
            }
            _ => IMAGE_LOAD_DIR.to_string(),
        };

        let asset = Asset::from_file(archive, target_dir, file_name, "0777");
        runner.copy(&asset).await?;
        runner
            .run(&format!("docker load -i {}", shell_quote(&asset.target_path())))
            .await?;
        tracing::debug!(archive = %archive.display(), "Loaded image");
        Ok(())
    }

    /// Cache and load every image concurrently.
    ///
    /// All tasks run to completion. Failures are collected and reported
    /// together, one entry per failing image; successful images stay cached
    /// and loaded.
    pub async fn cache_and_load(
        &self,
        runner: Arc<dyn CommandRunner>,
        images: &[String],
    ) -> KubeliteResult<()> {
        tracing::info!(count = images.len(), cache_root = %self.cache_root.display(), "Caching images");

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        for image in images {
            let cache = self.clone();
            let session = runner.open_session();
            let image_ref = image.clone();
            let handle = tasks.spawn(async move {
                let archive = cache.cache_image(&image_ref).await?;
                cache.load_from_cache(session.as_ref(), &archive).await
            });
            pending.insert(handle.id(), image.clone());
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
                Err(e) => (e.id(), Err(format!("task failed: {}", e))),
            };
            let image = pending.remove(&id).unwrap_or_default();
            if let Err(message) = outcome {
                tracing::warn!(image = %image, error = %message, "Failed to cache image");
                failures.push(ImageFailure { image, message });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by(|a, b| a.image.cmp(&b.image));
            Err(KubeliteError::ImageCache { failures })
        }
    }
}
