use kubelite_shared::constants::files;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::path::{Path, PathBuf};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for kubelite data
    pub const KUBELITE_DIR: &str = ".kubelite";

    pub const CACHE_DIR: &str = "cache";

    /// Subdirectory of the cache holding image archives
    pub const IMAGES_DIR: &str = "images";

    pub const ISO_DIR: &str = "iso";

    /// Subdirectory of the cache holding downloaded localkube binaries
    pub const LOCALKUBE_DIR: &str = "localkube";

    pub const MACHINES_DIR: &str = "machines";

    /// User supplied addon manifests
    pub const ADDONS_DIR: &str = "addons";

    /// Bundled manifests (addons and kubeadm unit files)
    pub const DEPLOY_DIR: &str = "deploy";

    /// Locally built binaries
    pub const OUT_DIR: &str = "out";

    pub const LOGS_DIR: &str = "logs";

    pub const KUBEADM_DIR: &str = "kubeadm";

    pub const BIN_DIR: &str = "bin";
}

// ============================================================================
// FILESYSTEM LAYOUT (home directory)
// ============================================================================

/// Paths under the kubelite home.
///
/// ```text
/// ~/.kubelite/
/// ├── ca.crt ca.key apiserver.crt apiserver.key
/// ├── config.json
/// ├── addons/
/// ├── deploy/
/// ├── out/{localkube, kubeadm/bin/}
/// ├── logs/
/// ├── machines/<name>/
/// └── cache/{images, iso, localkube}/
/// ```
#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Certificates are kept directly in the home directory.
    pub fn certs_dir(&self) -> PathBuf {
        self.home_dir.clone()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::CACHE_DIR)
    }

    /// Image archives: ~/.kubelite/cache/images
    pub fn image_cache_dir(&self) -> PathBuf {
        self.cache_dir().join(dirs::IMAGES_DIR)
    }

    pub fn iso_cache_dir(&self) -> PathBuf {
        self.cache_dir().join(dirs::ISO_DIR)
    }

    pub fn localkube_cache_dir(&self) -> PathBuf {
        self.cache_dir().join(dirs::LOCALKUBE_DIR)
    }

    pub fn machines_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::MACHINES_DIR)
    }

    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.machines_dir().join(name)
    }

    pub fn addons_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::ADDONS_DIR)
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::DEPLOY_DIR)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::OUT_DIR)
    }

    /// Locally built localkube binary: ~/.kubelite/out/localkube
    pub fn localkube_build_path(&self) -> PathBuf {
        self.out_dir().join("localkube")
    }

    /// Kubeadm bundle binaries: ~/.kubelite/out/kubeadm/bin
    pub fn kubeadm_bin_dir(&self) -> PathBuf {
        self.out_dir().join(dirs::KUBEADM_DIR).join(dirs::BIN_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.home_dir.join(files::CONFIG_FILE)
    }

    /// Create the directories the orchestrator writes into.
    pub fn prepare(&self) -> KubeliteResult<()> {
        for dir in [
            self.home_dir.clone(),
            self.image_cache_dir(),
            self.iso_cache_dir(),
            self.localkube_cache_dir(),
            self.machines_dir(),
            self.addons_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                KubeliteError::Storage(format!(
                    "failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
