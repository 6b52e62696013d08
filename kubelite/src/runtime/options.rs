//! Configuration for kubelite.

use crate::bootstrap::{BootstrapperKind, KubernetesConfig};
use crate::driver::DriverKind;
use crate::runtime::constants::{envs as const_envs, ssh as const_ssh, vm_defaults};
use crate::runtime::layout::{FilesystemLayout, dirs as const_dirs};
use dirs::home_dir;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Runtime Options
// ============================================================================

#[derive(Clone, Debug)]
pub struct KubeliteOptions {
    pub home_dir: PathBuf,
}

impl Default for KubeliteOptions {
    fn default() -> Self {
        let home_dir = std::env::var(const_envs::KUBELITE_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
                path.push(const_dirs::KUBELITE_DIR);
                path
            });

        Self { home_dir }
    }
}

impl KubeliteOptions {
    pub fn layout(&self) -> FilesystemLayout {
        FilesystemLayout::new(self.home_dir.clone())
    }
}

// ============================================================================
// Machine Options
// ============================================================================

/// How to reach a machine over SSH.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshEndpoint {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    /// Private key passed to `ssh -i`. Falls back to the agent / default keys.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

impl SshEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            user: default_ssh_user(),
            identity_file: None,
        }
    }
}

fn default_ssh_port() -> u16 {
    const_ssh::DEFAULT_PORT
}

fn default_ssh_user() -> String {
    const_ssh::DEFAULT_USER.to_string()
}

/// Parameters of the virtual machine.
///
/// Fixed once the machine exists; changing any of them means deleting and
/// recreating the machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub iso_url: String,
    /// Expected SHA-256 of the ISO, hex encoded. Verified after download.
    pub iso_sha256: Option<String>,
    pub memory_mib: u32,
    pub cpus: u32,
    pub disk_size_mb: u64,
    pub vm_driver: DriverKind,
    /// `KEY=VALUE` entries for the container engine environment.
    pub docker_env: Vec<String>,
    pub insecure_registry: Vec<String>,
    pub registry_mirror: Vec<String>,
    pub host_only_cidr: String,
    pub hyperv_virtual_switch: String,
    pub kvm_network: String,
    /// Endpoint for the `generic` driver.
    pub ssh: Option<SshEndpoint>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            iso_url: vm_defaults::DEFAULT_ISO_URL.to_string(),
            iso_sha256: None,
            memory_mib: vm_defaults::DEFAULT_MEMORY_MIB,
            cpus: vm_defaults::DEFAULT_CPUS,
            disk_size_mb: vm_defaults::DEFAULT_DISK_SIZE_MB,
            vm_driver: DriverKind::default(),
            docker_env: Vec::new(),
            insecure_registry: Vec::new(),
            registry_mirror: Vec::new(),
            host_only_cidr: vm_defaults::DEFAULT_HOST_ONLY_CIDR.to_string(),
            hyperv_virtual_switch: String::new(),
            kvm_network: vm_defaults::DEFAULT_KVM_NETWORK.to_string(),
            ssh: None,
        }
    }
}

impl MachineConfig {
    /// True when the container engine needs a configuration drop-in.
    pub fn has_engine_options(&self) -> bool {
        !self.docker_env.is_empty()
            || !self.insecure_registry.is_empty()
            || !self.registry_mirror.is_empty()
    }
}

/// Convert a human readable disk size ("20g", "512m", "20000mb") to MB.
///
/// Units are decimal. A bare number is taken as MB.
pub fn parse_disk_size_mb(size: &str) -> KubeliteResult<u64> {
    let lower = size.trim().to_ascii_lowercase();
    let digits_end = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(digits_end);

    let value: u64 = number
        .parse()
        .map_err(|_| KubeliteError::Config(format!("invalid disk size: {:?}", size)))?;

    let bytes_per_unit: u64 = match unit.trim_end_matches('b') {
        "" if unit.is_empty() => return Ok(value),
        "" => 1,
        "k" => 1_000,
        "m" => 1_000_000,
        "g" => 1_000_000_000,
        "t" => 1_000_000_000_000,
        _ => {
            return Err(KubeliteError::Config(format!(
                "invalid disk size unit in {:?}",
                size
            )));
        }
    };

    Ok(value.saturating_mul(bytes_per_unit) / 1_000_000)
}

// ============================================================================
// Cluster Options
// ============================================================================

/// Everything needed to bring a cluster up, as stored in `config.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub machine: MachineConfig,
    pub kubernetes: KubernetesConfig,
    pub bootstrapper: BootstrapperKind,
    /// Pre-load images into the machine before starting the control plane.
    pub cache_images: bool,
    /// Images to cache. Empty means the localkube default set.
    pub images: Vec<String>,
    /// Addon name → enabled, overriding bundle defaults.
    pub addons: HashMap<String, bool>,
}

impl ClusterOptions {
    /// Load options from `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> KubeliteResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            KubeliteError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            KubeliteError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> KubeliteResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KubeliteError::Internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            KubeliteError::Storage(format!("failed to write {}: {}", path.display(), e))
        })
    }
}
