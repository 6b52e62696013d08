//! Cluster orchestration: machine, certificates, images and control plane
//! brought up in a fixed order.
//!
//! ```text
//! Provision → SetupCerts → [CacheImages] → UpdateCluster → StartCluster
//! ```
//!
//! The first failing step aborts the sequence; nothing already applied to the
//! machine is rolled back.

mod engine;
mod iso;

pub use engine::{configure_engine, docker_dropin};
pub use iso::IsoCache;

use crate::bootstrap::{Bootstrapper, ClusterStatus, KubernetesConfig, new_bootstrapper};
use crate::certs::{CertPaths, setup_certs};
use crate::driver::{
    Driver, DriverKind, MachineState, VirtualizationSupport, check_virtualization_support, create_driver,
};
use crate::images::{ImageCache, ImagePuller, RegistryPuller, default_images};
use crate::portal::CommandRunner;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::{ClusterOptions, MachineConfig};
use crate::util::retry;
use kubelite_shared::constants::machine::{CREATE_ATTEMPTS, MACHINE_NAME};
use kubelite_shared::errors::{KubeliteError, KubeliteResult, SetupStep};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Host check run before creating a machine on a hypervisor-backed driver.
pub type VirtualizationCheck = fn() -> KubeliteResult<VirtualizationSupport>;

/// Cluster state derived from the machine and the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLifecycleState {
    /// No machine exists.
    NotCreated,
    /// The machine runs but was never set up by kubelite.
    Created,
    /// The machine was set up but the control plane is not running.
    Provisioned,
    Running,
    /// The machine exists and is not running.
    Stopped,
    /// The machine or control plane could not be reached.
    Error,
}

impl ClusterLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterLifecycleState::NotCreated => "NotCreated",
            ClusterLifecycleState::Created => "Created",
            ClusterLifecycleState::Provisioned => "Provisioned",
            ClusterLifecycleState::Running => "Running",
            ClusterLifecycleState::Stopped => "Stopped",
            ClusterLifecycleState::Error => "Error",
        }
    }
}

impl fmt::Display for ClusterLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Cluster {
    options: ClusterOptions,
    layout: FilesystemLayout,
    driver: Box<dyn Driver>,
    bootstrapper: Box<dyn Bootstrapper>,
    image_cache: ImageCache,
    iso_cache: IsoCache,
    retry_delay: Duration,
    virtualization_check: VirtualizationCheck,
}

impl Cluster {
    /// Build the driver from the registry and the bootstrapper from
    /// `options.bootstrapper`.
    pub fn new(options: ClusterOptions, layout: FilesystemLayout) -> KubeliteResult<Self> {
        layout.prepare()?;
        let driver = create_driver(options.machine.vm_driver, &options.machine, &layout)?;
        let runner = driver.command_runner()?;
        let bootstrapper = new_bootstrapper(
            options.bootstrapper,
            runner,
            &layout,
            options.addons.clone(),
        );
        Ok(Self::with_parts(
            options,
            layout,
            driver,
            bootstrapper,
            Arc::new(RegistryPuller::new()),
        ))
    }

    pub fn with_parts(
        options: ClusterOptions,
        layout: FilesystemLayout,
        driver: Box<dyn Driver>,
        bootstrapper: Box<dyn Bootstrapper>,
        puller: Arc<dyn ImagePuller>,
    ) -> Self {
        let image_cache = ImageCache::new(layout.image_cache_dir(), puller);
        let iso_cache = IsoCache::new(layout.iso_cache_dir());
        Self {
            options,
            layout,
            driver,
            bootstrapper,
            image_cache,
            iso_cache,
            retry_delay: Duration::ZERO,
            virtualization_check: check_virtualization_support,
        }
    }

    /// Pause between machine creation attempts. None by default.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_virtualization_check(mut self, check: VirtualizationCheck) -> Self {
        self.virtualization_check = check;
        self
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Create or start the machine, retrying up to
    /// [`CREATE_ATTEMPTS`] times.
    pub async fn provision(&self, machine: &MachineConfig) -> KubeliteResult<()> {
        self.provision_machine(machine).await.map(|_| ())
    }

    /// Returns whether the machine already existed.
    async fn provision_machine(&self, machine: &MachineConfig) -> KubeliteResult<bool> {
        retry("create machine", CREATE_ATTEMPTS, self.retry_delay, |attempt| async move {
            tracing::debug!(attempt, driver = self.driver.name(), "Provisioning machine");
            self.provision_once(machine).await
        })
        .await
    }

    async fn provision_once(&self, machine: &MachineConfig) -> KubeliteResult<bool> {
        let kind = self.driver.kind();
        if kind.boots_iso() {
            self.iso_cache.ensure(machine).await?;
        }

        let existed = match self.driver.state().await? {
            MachineState::None => {
                if kind.requires_virtualization() {
                    let support = (self.virtualization_check)()?;
                    tracing::debug!(reason = %support.reason, "Virtualization available");
                }
                self.driver.pre_create_check().await?;
                tracing::info!(driver = self.driver.name(), "Creating machine");
                self.driver.create().await?;
                false
            }
            state if state.is_startable() => {
                tracing::info!(%state, "Starting existing machine");
                self.driver.start().await?;
                true
            }
            MachineState::Running => {
                tracing::info!("Machine is already running");
                true
            }
            state => {
                return Err(KubeliteError::Driver(format!(
                    "machine {} is in state {}",
                    MACHINE_NAME, state
                )));
            }
        };

        let runner = self.driver.command_runner()?;
        configure_engine(runner.as_ref(), machine).await?;
        Ok(existed)
    }

    /// Bring the cluster up. Each step's error is wrapped with the step it
    /// failed in; the first failure stops the sequence.
    pub async fn setup_and_start(
        &self,
        machine: &MachineConfig,
        kubernetes: &KubernetesConfig,
    ) -> KubeliteResult<()> {
        let existed = self
            .provision_machine(machine)
            .await
            .map_err(|e| e.in_step(SetupStep::Provision))?;

        let runner = self
            .driver
            .command_runner()
            .map_err(|e| e.in_step(SetupStep::SetupCerts))?;
        let node_ip = self
            .node_ip(kubernetes)
            .await
            .map_err(|e| e.in_step(SetupStep::SetupCerts))?;
        let mut kubernetes = kubernetes.clone();
        kubernetes.node_ip = node_ip.to_string();

        setup_certs(
            runner.as_ref(),
            &CertPaths::new(&self.layout.certs_dir()),
            node_ip,
        )
        .await
        .map_err(|e| e.in_step(SetupStep::SetupCerts))?;

        if self.options.cache_images {
            self.cache_images(runner.clone())
                .await
                .map_err(|e| e.in_step(SetupStep::CacheImages))?;
        }

        self.bootstrapper
            .update_cluster(&kubernetes)
            .await
            .map_err(|e| e.in_step(SetupStep::UpdateCluster))?;

        // Only an existing machine can carry an initialized control plane.
        let restart = existed
            && self
                .bootstrapper
                .control_plane_initialized()
                .await
                .map_err(|e| e.in_step(SetupStep::StartCluster))?;
        let started = if restart {
            tracing::info!("Restarting control plane on existing machine");
            self.bootstrapper.restart_cluster(&kubernetes).await
        } else {
            self.bootstrapper.start_cluster(&kubernetes).await
        };
        started.map_err(|e| e.in_step(SetupStep::StartCluster))?;

        tracing::info!(node_ip = %node_ip, "Cluster started");
        Ok(())
    }

    async fn node_ip(&self, kubernetes: &KubernetesConfig) -> KubeliteResult<IpAddr> {
        let configured = kubernetes.node_ip.trim();
        if configured.is_empty() {
            return self.driver.ip().await;
        }
        configured
            .parse()
            .map_err(|e| KubeliteError::Config(format!("invalid node ip '{}': {}", configured, e)))
    }

    async fn cache_images(&self, runner: Arc<dyn CommandRunner>) -> KubeliteResult<()> {
        let images = if self.options.images.is_empty() {
            default_images()
        } else {
            self.options.images.clone()
        };
        self.image_cache.cache_and_load(runner, &images).await
    }

    pub async fn stop(&self) -> KubeliteResult<()> {
        tracing::info!(driver = self.driver.name(), "Stopping machine");
        self.driver.stop().await
    }

    /// Remove the machine and its local state.
    ///
    /// The machine directory is removed even when the driver fails; every
    /// failure is reported.
    pub async fn delete(&self) -> KubeliteResult<()> {
        tracing::info!(driver = self.driver.name(), "Deleting machine");
        let mut failures = Vec::new();
        if let Err(e) = self.driver.remove().await {
            failures.push(format!("removing machine: {}", e));
        }

        let machine_dir = self.layout.machine_dir(MACHINE_NAME);
        match tokio::fs::remove_dir_all(&machine_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => failures.push(format!(
                "removing {}: {}",
                machine_dir.display(),
                e
            )),
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(KubeliteError::Driver(failures.join("; ")))
        }
    }

    pub async fn status(&self) -> KubeliteResult<ClusterLifecycleState> {
        let state = match self.driver.state().await? {
            MachineState::None => ClusterLifecycleState::NotCreated,
            MachineState::Stopped | MachineState::Saved | MachineState::Paused => {
                ClusterLifecycleState::Stopped
            }
            MachineState::Error => ClusterLifecycleState::Error,
            MachineState::Running => match self.control_plane_status().await? {
                ClusterStatus::Running => ClusterLifecycleState::Running,
                ClusterStatus::Unknown => ClusterLifecycleState::Error,
                ClusterStatus::Stopped => {
                    if CertPaths::new(&self.layout.certs_dir()).apiserver_cert.is_file() {
                        ClusterLifecycleState::Provisioned
                    } else {
                        ClusterLifecycleState::Created
                    }
                }
            },
        };
        Ok(state)
    }

    async fn control_plane_status(&self) -> KubeliteResult<ClusterStatus> {
        match self.bootstrapper.cluster_status().await {
            Ok(status) => Ok(status),
            Err(KubeliteError::Connectivity(reason)) => {
                tracing::warn!(%reason, "Control plane unreachable");
                Ok(ClusterStatus::Unknown)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn logs(&self, follow: bool) -> KubeliteResult<String> {
        self.bootstrapper.cluster_logs(follow).await
    }

    /// Variables pointing a local docker client at the machine's engine.
    pub async fn docker_env(&self) -> KubeliteResult<BTreeMap<String, String>> {
        self.require_machine("docker-env").await?;
        let mut env = BTreeMap::new();
        env.insert("DOCKER_TLS_VERIFY".to_string(), "1".to_string());
        env.insert("DOCKER_HOST".to_string(), self.driver.url().await?);
        env.insert(
            "DOCKER_CERT_PATH".to_string(),
            self.layout.certs_dir().display().to_string(),
        );
        Ok(env)
    }

    /// Attach the terminal to a shell on the machine, running `args` when
    /// given. The machine must be running.
    pub async fn ssh_shell(&self, args: &[String]) -> KubeliteResult<()> {
        let state = self.require_machine("ssh").await?;
        if state != MachineState::Running {
            return Err(KubeliteError::Driver(format!(
                "cannot run ssh command: machine {} is {}",
                MACHINE_NAME, state
            )));
        }
        let runner = self.driver.command_runner()?;
        runner.run_interactive(&args.join(" ")).await
    }

    /// State of an existing machine on a driver that runs one.
    async fn require_machine(&self, operation: &str) -> KubeliteResult<MachineState> {
        if self.driver.kind() == DriverKind::None {
            return Err(KubeliteError::Unsupported(format!(
                "the none driver does not support {}",
                operation
            )));
        }
        match self.driver.state().await? {
            MachineState::None => Err(KubeliteError::Driver(format!(
                "machine {} does not exist",
                MACHINE_NAME
            ))),
            state => Ok(state),
        }
    }
}
