use super::marker::MachineMarker;
use super::registry::DriverRegistration;
use super::{Driver, DriverKind, MachineState};
use crate::portal::{CommandRunner, SshRunner};
use crate::runtime::constants::machine::MACHINE_NAME;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::{MachineConfig, SshEndpoint};
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::net::IpAddr;
use std::sync::Arc;

/// An existing machine reached over SSH.
///
/// kubelite does not own the machine's power state beyond asking it to shut
/// down or reboot; it cannot be started or killed from here.
pub struct GenericDriver {
    endpoint: SshEndpoint,
    marker: MachineMarker,
    runner: Arc<SshRunner>,
}

impl GenericDriver {
    pub fn new(endpoint: SshEndpoint, layout: &FilesystemLayout) -> Self {
        Self {
            marker: MachineMarker::new(&layout.machine_dir(MACHINE_NAME)),
            runner: Arc::new(SshRunner::new(endpoint.clone())),
            endpoint,
        }
    }

    fn from_config(config: &MachineConfig, layout: &FilesystemLayout) -> KubeliteResult<Self> {
        let endpoint = config.ssh.clone().ok_or_else(|| {
            KubeliteError::Config("the generic driver needs an ssh endpoint (ssh.host)".into())
        })?;
        Ok(Self::new(endpoint, layout))
    }

    async fn probe(&self) -> KubeliteResult<()> {
        self.runner.run("true").await.map(|_| ())
    }

    /// Run a command that takes the machine down; the connection dropping
    /// mid-command is expected.
    async fn run_power_command(&self, cmd: &str) -> KubeliteResult<()> {
        match self.runner.run(cmd).await {
            Ok(_) | Err(KubeliteError::Connectivity(_)) => Ok(()),
            Err(e) => Err(KubeliteError::Driver(format!("{}: {}", cmd, e))),
        }
    }
}

inventory::submit! {
    DriverRegistration {
        kind: DriverKind::Generic,
        factory: |config, layout| Ok(Box::new(GenericDriver::from_config(config, layout)?)),
    }
}

#[async_trait]
impl Driver for GenericDriver {
    fn name(&self) -> &str {
        MACHINE_NAME
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Generic
    }

    async fn pre_create_check(&self) -> KubeliteResult<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(KubeliteError::Config("ssh host is empty".into()));
        }
        Ok(())
    }

    async fn create(&self) -> KubeliteResult<()> {
        tracing::info!(host = %self.endpoint.host, "Probing existing machine");
        self.probe().await.map_err(|e| {
            KubeliteError::Driver(format!("machine {} is not reachable: {}", self.endpoint.host, e))
        })?;
        self.marker.write(DriverKind::Generic).await
    }

    async fn state(&self) -> KubeliteResult<MachineState> {
        if !self.marker.exists() {
            return Ok(MachineState::None);
        }
        match self.probe().await {
            Ok(()) => Ok(MachineState::Running),
            Err(e) => {
                tracing::debug!(host = %self.endpoint.host, error = %e, "Machine probe failed");
                Ok(MachineState::Error)
            }
        }
    }

    async fn ip(&self) -> KubeliteResult<IpAddr> {
        if let Ok(ip) = self.endpoint.host.parse() {
            return Ok(ip);
        }
        let mut addrs = tokio::net::lookup_host((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| {
                KubeliteError::Driver(format!("resolving {}: {}", self.endpoint.host, e))
            })?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| KubeliteError::Driver(format!("{} has no address", self.endpoint.host)))
    }

    async fn start(&self) -> KubeliteResult<()> {
        Err(KubeliteError::Unsupported(
            "the generic driver cannot power on a machine".into(),
        ))
    }

    async fn stop(&self) -> KubeliteResult<()> {
        self.run_power_command("sudo systemctl poweroff").await
    }

    async fn restart(&self) -> KubeliteResult<()> {
        self.run_power_command("sudo systemctl reboot").await
    }

    /// Forget the machine. The machine itself is left untouched.
    async fn remove(&self) -> KubeliteResult<()> {
        self.marker.remove().await
    }

    async fn kill(&self) -> KubeliteResult<()> {
        Err(KubeliteError::Unsupported(
            "the generic driver cannot kill a machine".into(),
        ))
    }

    fn command_runner(&self) -> KubeliteResult<Arc<dyn CommandRunner>> {
        Ok(self.runner.clone())
    }
}
