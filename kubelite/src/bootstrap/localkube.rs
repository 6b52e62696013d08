//! localkube: the whole control plane as one systemd-managed binary.

use super::config::{KubernetesConfig, LocalkubeSource};
use super::templates::{self, TemplateData};
use super::{Bootstrapper, ClusterStatus, unit_logs, unit_status};
use crate::assets::{Asset, default_addons, user_addon_assets};
use crate::portal::CommandRunner;
use crate::runtime::layout::FilesystemLayout;
use crate::util::download_file;
use async_trait::async_trait;
use kubelite_shared::constants::remote::LOCALKUBE_BIN_DIR;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const UNIT: &str = "localkube";
const UNIT_PATH: &str = "/lib/systemd/system/localkube.service";
const BINARY_NAME: &str = "localkube";
const BINARY_PERMISSIONS: &str = "0777";

pub struct LocalkubeBootstrapper {
    runner: Arc<dyn CommandRunner>,
    layout: FilesystemLayout,
    addons: HashMap<String, bool>,
}

impl LocalkubeBootstrapper {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        layout: FilesystemLayout,
        addons: HashMap<String, bool>,
    ) -> Self {
        Self {
            runner,
            layout,
            addons,
        }
    }

    /// Local path of the binary for this version, downloading it when needed.
    async fn localkube_binary(&self, config: &KubernetesConfig) -> KubeliteResult<PathBuf> {
        match config.localkube_source() {
            LocalkubeSource::Bundled => Ok(self.layout.localkube_build_path()),
            LocalkubeSource::File(path) => Ok(path),
            LocalkubeSource::Remote(url) => {
                let dest = self
                    .layout
                    .localkube_cache_dir()
                    .join(cached_binary_name(&config.kubernetes_version));
                if dest.is_file() {
                    tracing::debug!(path = %dest.display(), "Using cached localkube");
                } else {
                    download_file(&url, &dest, None).await?;
                }
                Ok(dest)
            }
        }
    }

    async fn files(&self, config: &KubernetesConfig) -> KubeliteResult<Vec<Asset>> {
        let binary = self.localkube_binary(config).await?;
        let mut files = vec![Asset::from_file(
            binary,
            LOCALKUBE_BIN_DIR,
            BINARY_NAME,
            BINARY_PERMISSIONS,
        )];

        files.extend(user_addon_assets(&self.layout.addons_dir())?);
        for bundle in default_addons(&self.layout.deploy_dir()) {
            if !bundle.is_enabled(&self.addons) {
                tracing::debug!(addon = %bundle.name, "Addon disabled");
                continue;
            }
            let missing = bundle
                .assets
                .iter()
                .filter_map(|a| a.source_path())
                .find(|p| !p.is_file());
            if let Some(path) = missing {
                // Only addons the user asked for must be present.
                if self.addons.get(&bundle.name) == Some(&true) {
                    return Err(KubeliteError::AssetNotFound(path.to_path_buf()));
                }
                tracing::warn!(addon = %bundle.name, path = %path.display(), "Addon manifests not found, skipping");
                continue;
            }
            files.extend(bundle.assets);
        }
        Ok(files)
    }
}

#[async_trait]
impl Bootstrapper for LocalkubeBootstrapper {
    async fn update_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        let files = self.files(config).await?;
        tracing::info!(files = files.len(), "Transferring localkube files");
        for file in &files {
            self.runner.copy(file).await?;
        }
        Ok(())
    }

    async fn start_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        let script = start_script(config)?;
        tracing::info!(version = %config.kubernetes_version, "Starting localkube");
        self.runner.run(&script).await?;
        Ok(())
    }

    async fn restart_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        self.start_cluster(config).await
    }

    async fn cluster_status(&self) -> KubeliteResult<ClusterStatus> {
        unit_status(self.runner.as_ref(), UNIT).await
    }

    async fn cluster_logs(&self, follow: bool) -> KubeliteResult<String> {
        unit_logs(self.runner.as_ref(), UNIT, follow).await
    }
}

/// Cache file name for a downloaded binary. URIs are hashed since they may
/// contain characters that are not valid in file names.
fn cached_binary_name(version: &str) -> String {
    let version = version.trim();
    if version.contains("://") {
        let digest = hex::encode(Sha256::digest(version.as_bytes()));
        format!("localkube-{}", &digest[..16])
    } else {
        format!("localkube-{}", version)
    }
}

/// Command line of the localkube service.
fn exec_start(config: &KubernetesConfig) -> String {
    let mut flags = vec![
        format!("{}/{}", LOCALKUBE_BIN_DIR, BINARY_NAME),
        format!("--dns-domain={}", config.dns_domain),
        format!("--node-ip={}", config.node_ip),
    ];
    if !config.container_runtime.is_empty() {
        flags.push(format!("--container-runtime={}", config.container_runtime));
    }
    if !config.network_plugin.is_empty() {
        flags.push(format!("--network-plugin={}", config.network_plugin));
    }
    if !config.feature_gates.is_empty() {
        flags.push(format!("--feature-gates={}", config.feature_gates));
    }
    for option in &config.extra_options {
        flags.push(format!("--extra-config={}", option));
    }
    flags.extend(version_flags(config));
    flags.join(" ")
}

fn version_flags(config: &KubernetesConfig) -> Vec<String> {
    let mut flags = vec![
        "--generate-certs=false".to_string(),
        "--logtostderr=true".to_string(),
        "--enable-dns=false".to_string(),
    ];
    if config.semantic_version().is_some_and(|v| v >= (1, 8, 0)) {
        flags.push(format!("--apiserver-name={}", config.api_server_name));
    }
    flags
}

fn start_script(config: &KubernetesConfig) -> KubeliteResult<String> {
    let service = templates::render(
        "localkube service",
        templates::LOCALKUBE_SERVICE_TEMPLATE,
        TemplateData::new().set("ExecStart", exec_start(config)),
    )?;
    templates::render(
        "localkube start",
        templates::LOCALKUBE_START_TEMPLATE,
        TemplateData::new()
            .set("UnitPath", UNIT_PATH)
            .set("Service", service),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KubernetesConfig {
        KubernetesConfig {
            node_ip: "192.168.99.100".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exec_start_defaults() {
        assert_eq!(
            exec_start(&config()),
            "/usr/local/bin/localkube --dns-domain=cluster.local --node-ip=192.168.99.100 \
             --generate-certs=false --logtostderr=true --enable-dns=false"
        );
    }

    #[test]
    fn test_exec_start_optional_flags() {
        let mut config = config();
        config.container_runtime = "cri-o".into();
        config.network_plugin = "cni".into();
        config.feature_gates = "Foo=true".into();
        config.extra_options = vec![
            "kubelet.max-pods=5".parse().unwrap(),
            "apiserver.v=2".parse().unwrap(),
        ];
        let line = exec_start(&config);
        assert!(line.contains("--container-runtime=cri-o"));
        assert!(line.contains("--network-plugin=cni"));
        assert!(line.contains("--feature-gates=Foo=true"));
        assert!(line.contains("--extra-config=kubelet.max-pods=5 --extra-config=apiserver.v=2"));
    }

    #[test]
    fn test_apiserver_name_from_1_8() {
        let mut config = config();
        assert!(!exec_start(&config).contains("--apiserver-name"));

        config.kubernetes_version = "v1.8.0".into();
        assert!(exec_start(&config).contains("--apiserver-name=kubeliteCA"));

        config.kubernetes_version = "file:///tmp/localkube".into();
        assert!(!exec_start(&config).contains("--apiserver-name"));
    }

    #[test]
    fn test_start_script_installs_and_restarts() {
        let script = start_script(&config()).unwrap();
        assert!(script.starts_with("sudo tee /lib/systemd/system/localkube.service"));
        assert!(script.contains("ExecStart=/usr/local/bin/localkube --dns-domain=cluster.local"));
        assert!(script.contains("$MAINPID"));
        assert!(script.ends_with("sudo systemctl restart localkube.service"));
    }

    #[test]
    fn test_cached_binary_name() {
        assert_eq!(cached_binary_name("v1.8.0"), "localkube-v1.8.0");
        let name = cached_binary_name("https://mirror.local/localkube");
        assert!(name.starts_with("localkube-"));
        assert_eq!(name.len(), "localkube-".len() + 16);
    }
}
