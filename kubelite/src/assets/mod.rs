//! Files that get placed on the cluster machine.
//!
//! An [`Asset`] pairs a source (a local file or an in-memory buffer) with a
//! destination path and octal permissions. The same asset may be transferred
//! any number of times; the target path identifies it and re-transfer
//! overwrites.

mod addons;
mod local;

pub use addons::{AddonBundle, default_addons, user_addon_assets};
pub use local::{assets_from_dir, copy_local};

use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an asset's bytes come from.
#[derive(Clone, Debug)]
pub enum AssetSource {
    /// Reopened on every read.
    File(PathBuf),
    Memory(Arc<[u8]>),
}

#[derive(Clone, Debug)]
pub struct Asset {
    source: AssetSource,
    target_dir: String,
    target_name: String,
    permissions: String,
}

impl Asset {
    pub fn from_file(
        src: impl Into<PathBuf>,
        target_dir: impl Into<String>,
        target_name: impl Into<String>,
        permissions: impl Into<String>,
    ) -> Self {
        Self {
            source: AssetSource::File(src.into()),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: permissions.into(),
        }
    }

    pub fn from_memory(
        bytes: impl Into<Vec<u8>>,
        target_dir: impl Into<String>,
        target_name: impl Into<String>,
        permissions: impl Into<String>,
    ) -> Self {
        Self {
            source: AssetSource::Memory(Arc::from(bytes.into())),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: permissions.into(),
        }
    }

    /// Read the full payload.
    ///
    /// File-backed assets fail with [`KubeliteError::AssetNotFound`] if the
    /// source disappeared since the asset was built.
    pub async fn read(&self) -> KubeliteResult<Vec<u8>> {
        match &self.source {
            AssetSource::Memory(bytes) => Ok(bytes.to_vec()),
            AssetSource::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(KubeliteError::AssetNotFound(path.clone()))
                }
                Err(e) => Err(KubeliteError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))),
            },
        }
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    /// Local path of a file-backed asset.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            AssetSource::File(path) => Some(path),
            AssetSource::Memory(_) => None,
        }
    }

    pub fn target_dir(&self) -> &str {
        &self.target_dir
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Absolute destination on the machine, e.g. `/usr/local/bin/localkube`.
    pub fn target_path(&self) -> String {
        let dir = self.target_dir.trim_end_matches('/');
        if dir.is_empty() {
            format!("/{}", self.target_name)
        } else {
            format!("{}/{}", dir, self.target_name)
        }
    }

    /// Permission string as given, e.g. `"0644"`.
    pub fn permissions(&self) -> &str {
        &self.permissions
    }

    /// Permissions parsed as an octal mode.
    pub fn mode(&self) -> KubeliteResult<u32> {
        u32::from_str_radix(&self.permissions, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .ok_or_else(|| {
                KubeliteError::Config(format!(
                    "invalid permissions {:?} for {}",
                    self.permissions,
                    self.target_path()
                ))
            })
    }

    /// Same payload and permissions, placed somewhere else.
    pub fn retarget(&self, target_dir: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source: self.source.clone(),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: self.permissions.clone(),
        }
    }
}
