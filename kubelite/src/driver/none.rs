use super::marker::MachineMarker;
use super::registry::DriverRegistration;
use super::{Driver, DriverKind, MachineState};
use crate::portal::{CommandRunner, LocalRunner};
use crate::runtime::constants::machine::MACHINE_NAME;
use crate::runtime::layout::FilesystemLayout;
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;

/// Present on hosts booted with systemd.
const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

const CLUSTER_UNITS: &str = "localkube.service kubelet.service";

/// Runs the cluster directly on the host.
///
/// There is no machine to boot; once created the host is always `Running`.
pub struct NoneDriver {
    marker: MachineMarker,
    runner: Arc<LocalRunner>,
}

impl NoneDriver {
    pub fn new(layout: &FilesystemLayout) -> Self {
        Self {
            marker: MachineMarker::new(&layout.machine_dir(MACHINE_NAME)),
            runner: Arc::new(LocalRunner::new()),
        }
    }
}

inventory::submit! {
    DriverRegistration {
        kind: DriverKind::None,
        factory: |_config, layout| Ok(Box::new(NoneDriver::new(layout))),
    }
}

#[async_trait]
impl Driver for NoneDriver {
    fn name(&self) -> &str {
        MACHINE_NAME
    }

    fn kind(&self) -> DriverKind {
        DriverKind::None
    }

    async fn pre_create_check(&self) -> KubeliteResult<()> {
        if !cfg!(target_os = "linux") {
            return Err(KubeliteError::Unsupported(
                "the none driver requires a Linux host".into(),
            ));
        }
        if !Path::new(SYSTEMD_RUNTIME_DIR).is_dir() {
            return Err(KubeliteError::Unsupported(
                "the none driver requires a host running systemd".into(),
            ));
        }
        Ok(())
    }

    async fn create(&self) -> KubeliteResult<()> {
        self.marker.write(DriverKind::None).await
    }

    async fn state(&self) -> KubeliteResult<MachineState> {
        Ok(if self.marker.exists() {
            MachineState::Running
        } else {
            MachineState::None
        })
    }

    async fn ip(&self) -> KubeliteResult<IpAddr> {
        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    async fn start(&self) -> KubeliteResult<()> {
        Ok(())
    }

    /// Stops the cluster services; the host keeps running.
    async fn stop(&self) -> KubeliteResult<()> {
        self.runner
            .run(&format!("sudo systemctl stop {} 2>/dev/null || true", CLUSTER_UNITS))
            .await
            .map(|_| ())
    }

    async fn restart(&self) -> KubeliteResult<()> {
        Err(KubeliteError::Unsupported(
            "the none driver does not restart the host".into(),
        ))
    }

    async fn remove(&self) -> KubeliteResult<()> {
        if self.marker.exists() {
            self.stop().await?;
        }
        self.marker.remove().await
    }

    async fn kill(&self) -> KubeliteResult<()> {
        Err(KubeliteError::Unsupported(
            "the none driver cannot kill the host".into(),
        ))
    }

    fn command_runner(&self) -> KubeliteResult<Arc<dyn CommandRunner>> {
        Ok(self.runner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_follows_creation() {
        let dir = TempDir::new().unwrap();
        let driver = NoneDriver::new(&FilesystemLayout::new(dir.path()));

        assert_eq!(driver.state().await.unwrap(), MachineState::None);
        driver.create().await.unwrap();
        assert_eq!(driver.state().await.unwrap(), MachineState::Running);
        assert_eq!(driver.ip().await.unwrap().to_string(), "127.0.0.1");
        assert_eq!(driver.url().await.unwrap(), "tcp://127.0.0.1:2376");
    }

    #[tokio::test]
    async fn test_restart_and_kill_unsupported() {
        let dir = TempDir::new().unwrap();
        let driver = NoneDriver::new(&FilesystemLayout::new(dir.path()));
        assert!(matches!(
            driver.restart().await,
            Err(KubeliteError::Unsupported(_))
        ));
        assert!(matches!(
            driver.kill().await,
            Err(KubeliteError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_without_create() {
        let dir = TempDir::new().unwrap();
        let driver = NoneDriver::new(&FilesystemLayout::new(dir.path()));
        driver.remove().await.unwrap();
        assert_eq!(driver.state().await.unwrap(), MachineState::None);
    }
}
