//! Local cache of machine boot ISOs.

use crate::runtime::options::MachineConfig;
use crate::util::download_file;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct IsoCache {
    dir: PathBuf,
}

impl IsoCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the ISO for `url` lives locally.
    pub fn path_for(&self, url: &str) -> KubeliteResult<PathBuf> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        let name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| KubeliteError::Config(format!("cannot derive ISO file name from {}", url)))?;
        Ok(self.dir.join(name))
    }

    /// Make sure the configured ISO is available locally and return its path.
    ///
    /// `file://` ISOs are used in place. Others are downloaded once and
    /// verified against `iso_sha256` when set.
    pub async fn ensure(&self, machine: &MachineConfig) -> KubeliteResult<PathBuf> {
        let path = self.path_for(&machine.iso_url)?;
        if machine.iso_url.starts_with("file://") {
            if !path.is_file() {
                return Err(KubeliteError::AssetNotFound(path));
            }
            return Ok(path);
        }
        if path.is_file() {
            tracing::debug!(path = %path.display(), "ISO already cached");
            return Ok(path);
        }
        download_file(&machine.iso_url, &path, machine.iso_sha256.as_deref()).await?;
        Ok(path)
    }
}
