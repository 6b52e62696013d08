//! kubeadm: kubelet under systemd, control plane brought up by `kubeadm init`.

use super::config::KubernetesConfig;
use super::templates::{self, TemplateData};
use super::{Bootstrapper, ClusterStatus, unit_logs, unit_status};
use crate::assets::{Asset, assets_from_dir};
use crate::portal::CommandRunner;
use crate::runtime::layout::FilesystemLayout;
use async_trait::async_trait;
use kubelite_shared::constants::kubernetes::{API_SERVER_PORT, DEFAULT_SERVICE_CIDR};
use kubelite_shared::constants::remote::{CERT_DIR, KUBEADM_STAGING_DIR, KUBERNETES_CONFIG_DIR};
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::sync::Arc;

const UNIT: &str = "kubelet";
const BIN_PERMISSIONS: &str = "0641";
const DEPLOY_PERMISSIONS: &str = "0640";
const SERVICE_NAME: &str = "kubelet.service";
const DROPIN_NAME: &str = "10-kubeadm.conf";
const DROPIN_DIR: &str = "/etc/systemd/system/kubelet.service.d";
const CLIENT_CERT_TMP: &str = "/tmp/cert.conf";
/// Written by `kubeadm init`; its presence marks an initialized control plane.
const ADMIN_KUBECONFIG: &str = "admin.conf";

/// Kubeconfigs rewritten with fresh client certificates on restart.
const KUBECONFIG_FILES: &[&str] = &[
    "admin.conf",
    "controller-manager.conf",
    "kubelet.conf",
    "scheduler.conf",
];

pub struct KubeadmBootstrapper {
    runner: Arc<dyn CommandRunner>,
    layout: FilesystemLayout,
}

impl KubeadmBootstrapper {
    pub fn new(runner: Arc<dyn CommandRunner>, layout: FilesystemLayout) -> Self {
        Self { runner, layout }
    }

    fn files(&self, config: &KubernetesConfig) -> KubeliteResult<Vec<Asset>> {
        let mut files = assets_from_dir(
            &self.layout.kubeadm_bin_dir(),
            KUBEADM_STAGING_DIR,
            BIN_PERMISSIONS,
        )?;
        files.extend(assets_from_dir(
            &self.layout.deploy_dir(),
            KUBEADM_STAGING_DIR,
            DEPLOY_PERMISSIONS,
        )?);
        files.push(Asset::from_memory(
            templates::KUBELET_SERVICE.as_bytes(),
            KUBEADM_STAGING_DIR,
            SERVICE_NAME,
            DEPLOY_PERMISSIONS,
        ));
        files.push(Asset::from_memory(
            kubelet_dropin(config)?.into_bytes(),
            KUBEADM_STAGING_DIR,
            DROPIN_NAME,
            DEPLOY_PERMISSIONS,
        ));
        Ok(files)
    }

    /// Run `commands` one at a time, stopping at the first failure.
    async fn run_all(&self, commands: &[String]) -> KubeliteResult<()> {
        for command in commands {
            self.runner.run(command).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Bootstrapper for KubeadmBootstrapper {
    async fn update_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        let files = self.files(config)?;
        tracing::info!(files = files.len(), "Transferring kubeadm files");
        for file in &files {
            self.runner.copy(file).await?;
        }
        self.run_all(&install_commands()).await
    }

    async fn start_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        let command = templates::render(
            "kubeadm init",
            templates::KUBEADM_INIT_TEMPLATE,
            TemplateData::new()
                .set("CertDir", CERT_DIR)
                .set("ServiceCIDR", DEFAULT_SERVICE_CIDR)
                .set("AdvertiseAddress", config.node_ip.as_str())
                .set("APIServerPort", i64::from(API_SERVER_PORT)),
        )?;
        tracing::info!(node_ip = %config.node_ip, "Running kubeadm init");
        self.runner.run(&command).await?;
        Ok(())
    }

    /// Re-issues client certificates and rewrites every control-plane
    /// kubeconfig with them.
    async fn restart_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        let issue = templates::render(
            "kubeadm restart",
            templates::KUBEADM_RESTART_TEMPLATE,
            TemplateData::new()
                .set("CertDir", CERT_DIR)
                .set("IP", config.node_ip.as_str())
                .set("MachineName", config.node_name.as_str())
                .set("TmpFile", CLIENT_CERT_TMP),
        )?;
        let mut commands = vec![issue];
        commands.extend(KUBECONFIG_FILES.iter().map(|file| {
            format!(
                "sudo cp {} {}/{}",
                CLIENT_CERT_TMP, KUBERNETES_CONFIG_DIR, file
            )
        }));
        self.run_all(&commands).await
    }

    async fn control_plane_initialized(&self) -> KubeliteResult<bool> {
        let command = init_check_command();
        let output = self.runner.run(&command).await?;
        parse_init_check(&command, &output)
    }

    async fn cluster_status(&self) -> KubeliteResult<ClusterStatus> {
        unit_status(self.runner.as_ref(), UNIT).await
    }

    async fn cluster_logs(&self, follow: bool) -> KubeliteResult<String> {
        unit_logs(self.runner.as_ref(), UNIT, follow).await
    }
}

fn init_check_command() -> String {
    format!(
        "sudo test -f {}/{} && echo Initialized || echo Uninitialized",
        KUBERNETES_CONFIG_DIR, ADMIN_KUBECONFIG
    )
}

fn parse_init_check(command: &str, output: &str) -> KubeliteResult<bool> {
    match output.trim() {
        "Initialized" => Ok(true),
        "Uninitialized" => Ok(false),
        other => Err(KubeliteError::UnrecognizedOutput {
            command: command.to_string(),
            output: other.to_string(),
        }),
    }
}

fn kubelet_dropin(config: &KubernetesConfig) -> KubeliteResult<String> {
    let extra = config
        .options_for("kubelet")
        .map(|o| o.as_flag())
        .collect::<Vec<_>>()
        .join(" ");
    templates::render(
        "kubelet drop-in",
        templates::KUBELET_SYSTEMD_TEMPLATE,
        TemplateData::new()
            .set("DNSDomain", config.dns_domain.as_str())
            .set("ExtraOptions", extra),
    )
}

fn install_commands() -> Vec<String> {
    vec![
        format!("sudo cp {}/kubelet /usr/bin/kubelet", KUBEADM_STAGING_DIR),
        format!("sudo cp {}/kubeadm /usr/bin/kubeadm", KUBEADM_STAGING_DIR),
        format!(
            "sudo cp {}/{} /lib/systemd/system/{}",
            KUBEADM_STAGING_DIR, SERVICE_NAME, SERVICE_NAME
        ),
        format!("sudo mkdir -p {}", DROPIN_DIR),
        format!(
            "sudo cp {}/{} {}/{}",
            KUBEADM_STAGING_DIR, DROPIN_NAME, DROPIN_DIR, DROPIN_NAME
        ),
        "sudo systemctl daemon-reload".to_string(),
        "sudo systemctl enable kubelet".to_string(),
        "sudo systemctl start kubelet".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_order() {
        let commands = install_commands();
        assert_eq!(commands.len(), 8);
        assert_eq!(commands[0], "sudo cp /kubeadm/kubelet /usr/bin/kubelet");
        assert_eq!(commands[3], "sudo mkdir -p /etc/systemd/system/kubelet.service.d");
        assert_eq!(commands[7], "sudo systemctl start kubelet");
    }

    #[test]
    fn test_dropin_carries_only_kubelet_options() {
        let config = KubernetesConfig {
            extra_options: vec![
                "kubelet.max-pods=5".parse().unwrap(),
                "apiserver.v=2".parse().unwrap(),
                "kubelet.image-gc-high-threshold=90".parse().unwrap(),
            ],
            ..Default::default()
        };
        let dropin = kubelet_dropin(&config).unwrap();
        assert!(dropin.contains("--cluster-domain=cluster.local"));
        assert!(dropin.contains("--max-pods=5 --image-gc-high-threshold=90"));
        assert!(!dropin.contains("--v=2"));
    }

    #[test]
    fn test_init_check() {
        let command = init_check_command();
        assert_eq!(
            command,
            "sudo test -f /etc/kubernetes/admin.conf && echo Initialized || echo Uninitialized"
        );
        assert!(parse_init_check(&command, "Initialized\n").unwrap());
        assert!(!parse_init_check(&command, " Uninitialized ").unwrap());
        assert!(matches!(
            parse_init_check(&command, ""),
            Err(KubeliteError::UnrecognizedOutput { .. })
        ));
    }
}
