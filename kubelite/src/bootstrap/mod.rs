//! Kubernetes bootstrappers.
//!
//! A bootstrapper places the control plane on a machine through a
//! [`CommandRunner`] and reports on it afterwards. Two strategies exist:
//! localkube (a single all-in-one binary under systemd) and kubeadm.

mod config;
mod kubeadm;
mod localkube;
mod phase;
pub mod templates;

pub use config::{DEFAULT_API_SERVER_NAME, ExtraOption, KubernetesConfig, LocalkubeSource};
pub use kubeadm::KubeadmBootstrapper;
pub use localkube::LocalkubeBootstrapper;
pub use phase::{BootstrapPhase, PhasedBootstrapper};

use crate::portal::CommandRunner;
use crate::runtime::layout::FilesystemLayout;
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Control-plane state as reported by the bootstrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Running,
    Stopped,
    /// The machine could not be asked.
    Unknown,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Running => "Running",
            ClusterStatus::Stopped => "Stopped",
            ClusterStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map the output of a status probe command.
///
/// Only `Running` and `Stopped` (surrounding whitespace ignored) are accepted.
pub fn parse_cluster_status(command: &str, output: &str) -> KubeliteResult<ClusterStatus> {
    match output.trim() {
        "Running" => Ok(ClusterStatus::Running),
        "Stopped" => Ok(ClusterStatus::Stopped),
        _ => Err(KubeliteError::UnrecognizedOutput {
            command: command.to_string(),
            output: output.to_string(),
        }),
    }
}

#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Transfer binaries, units and manifests. Safe to repeat.
    async fn update_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()>;

    async fn start_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()>;

    async fn restart_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()>;

    /// Whether a previous start already initialized the control plane on the
    /// machine, in which case `restart_cluster` applies instead of
    /// `start_cluster`.
    async fn control_plane_initialized(&self) -> KubeliteResult<bool> {
        Ok(false)
    }

    async fn cluster_status(&self) -> KubeliteResult<ClusterStatus>;

    /// Control-plane logs. With `follow`, logs stream to the terminal until
    /// interrupted and the returned string is empty.
    async fn cluster_logs(&self, follow: bool) -> KubeliteResult<String>;
}

// ============================================================================
// Strategy selection
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapperKind {
    #[default]
    Localkube,
    Kubeadm,
}

impl BootstrapperKind {
    pub const ALL: [BootstrapperKind; 2] = [BootstrapperKind::Localkube, BootstrapperKind::Kubeadm];

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapperKind::Localkube => "localkube",
            BootstrapperKind::Kubeadm => "kubeadm",
        }
    }
}

impl fmt::Display for BootstrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BootstrapperKind {
    type Err = KubeliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "localkube" => Ok(BootstrapperKind::Localkube),
            "kubeadm" => Ok(BootstrapperKind::Kubeadm),
            other => Err(KubeliteError::Config(format!(
                "unknown bootstrapper '{}'. Supported: localkube, kubeadm",
                other
            ))),
        }
    }
}

/// Build the strategy for `kind`, wrapped in phase tracking.
pub fn new_bootstrapper(
    kind: BootstrapperKind,
    runner: Arc<dyn CommandRunner>,
    layout: &FilesystemLayout,
    addons: HashMap<String, bool>,
) -> Box<dyn Bootstrapper> {
    let inner: Box<dyn Bootstrapper> = match kind {
        BootstrapperKind::Localkube => {
            Box::new(LocalkubeBootstrapper::new(runner, layout.clone(), addons))
        }
        BootstrapperKind::Kubeadm => Box::new(KubeadmBootstrapper::new(runner, layout.clone())),
    };
    tracing::debug!(bootstrapper = %kind, "Bootstrapper selected");
    Box::new(PhasedBootstrapper::new(inner))
}

/// `sudo journalctl -u <unit>`, following when asked.
async fn unit_logs(
    runner: &dyn CommandRunner,
    unit: &str,
    follow: bool,
) -> KubeliteResult<String> {
    let command = format!("sudo journalctl -u {}", unit);
    if follow {
        runner.run_interactive(&format!("{} -f", command)).await?;
        Ok(String::new())
    } else {
        runner.run(&command).await
    }
}

/// Probe a systemd unit, echoing `Running` or `Stopped`.
async fn unit_status(runner: &dyn CommandRunner, unit: &str) -> KubeliteResult<ClusterStatus> {
    let command = format!(
        "sudo systemctl is-active {} 2>&1 1>/dev/null && echo Running || echo Stopped",
        unit
    );
    let output = runner.run(&command).await?;
    parse_cluster_status(&command, &output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Running", ClusterStatus::Running)]
    #[case("Running\n", ClusterStatus::Running)]
    #[case("  Stopped ", ClusterStatus::Stopped)]
    fn test_parse_cluster_status(#[case] output: &str, #[case] expected: ClusterStatus) {
        assert_eq!(parse_cluster_status("probe", output).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("running")]
    #[case("Unknown")]
    #[case("Running Stopped")]
    fn test_parse_cluster_status_rejects(#[case] output: &str) {
        match parse_cluster_status("probe", output) {
            Err(KubeliteError::UnrecognizedOutput { command, output: got }) => {
                assert_eq!(command, "probe");
                assert_eq!(got, output);
            }
            other => panic!("expected UnrecognizedOutput, got {:?}", other),
        }
    }

    #[rstest]
    #[case("localkube", BootstrapperKind::Localkube)]
    #[case("Kubeadm", BootstrapperKind::Kubeadm)]
    fn test_bootstrapper_kind_from_str(#[case] input: &str, #[case] expected: BootstrapperKind) {
        assert_eq!(input.parse::<BootstrapperKind>().unwrap(), expected);
    }

    #[test]
    fn test_bootstrapper_kind_unknown() {
        assert!(matches!(
            "minikube".parse::<BootstrapperKind>(),
            Err(KubeliteError::Config(_))
        ));
    }
}
