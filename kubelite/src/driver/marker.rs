//! Creation marker kept in the machine directory by drivers that have no
//! hypervisor to ask whether the machine exists.

use super::DriverKind;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::path::{Path, PathBuf};

const MARKER_FILE: &str = "created";

#[derive(Clone, Debug)]
pub(crate) struct MachineMarker {
    path: PathBuf,
}

impl MachineMarker {
    pub fn new(machine_dir: &Path) -> Self {
        Self {
            path: machine_dir.join(MARKER_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Record creation by `kind`.
    pub async fn write(&self, kind: DriverKind) -> KubeliteResult<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                KubeliteError::Storage(format!("creating {}: {}", dir.display(), e))
            })?;
        }
        tokio::fs::write(&self.path, kind.as_str())
            .await
            .map_err(|e| KubeliteError::Storage(format!("writing {}: {}", self.path.display(), e)))
    }

    pub async fn remove(&self) -> KubeliteResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KubeliteError::Storage(format!(
                "removing {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
