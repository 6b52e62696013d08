//! Virtual machine drivers.
//!
//! A driver owns the machine's lifecycle and hands out the
//! [`CommandRunner`] used to reach it. Drivers register themselves at compile
//! time (see [`registry`]) and are selected by [`DriverKind`].

mod generic;
pub mod host_check;
mod marker;
mod none;
pub mod registry;

pub use generic::GenericDriver;
pub use host_check::{VirtualizationSupport, check_virtualization_support};
pub use none::NoneDriver;
pub use registry::{DriverRegistration, available_drivers, create_driver, is_registered};

use crate::portal::CommandRunner;
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Port the container engine's API listens on inside the machine.
pub const ENGINE_PORT: u16 = 2376;

// ============================================================================
// Machine state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// No machine has been created.
    None,
    Running,
    Stopped,
    Paused,
    Error,
    Saved,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::None => "None",
            MachineState::Running => "Running",
            MachineState::Stopped => "Stopped",
            MachineState::Paused => "Paused",
            MachineState::Error => "Error",
            MachineState::Saved => "Saved",
        }
    }

    /// A machine in this state can be brought back with `start`.
    pub fn is_startable(&self) -> bool {
        matches!(
            self,
            MachineState::Stopped | MachineState::Saved | MachineState::Paused
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Driver kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// The host itself.
    #[default]
    None,
    /// An existing machine reachable over SSH.
    Generic,
    Virtualbox,
    Kvm,
    Hyperv,
    Xhyve,
    Vmwarefusion,
}

impl DriverKind {
    pub const ALL: [DriverKind; 7] = [
        DriverKind::None,
        DriverKind::Generic,
        DriverKind::Virtualbox,
        DriverKind::Kvm,
        DriverKind::Hyperv,
        DriverKind::Xhyve,
        DriverKind::Vmwarefusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::None => "none",
            DriverKind::Generic => "generic",
            DriverKind::Virtualbox => "virtualbox",
            DriverKind::Kvm => "kvm",
            DriverKind::Hyperv => "hyperv",
            DriverKind::Xhyve => "xhyve",
            DriverKind::Vmwarefusion => "vmwarefusion",
        }
    }

    /// Drivers that run a local hypervisor and need hardware virtualization.
    pub fn requires_virtualization(&self) -> bool {
        matches!(self, DriverKind::Kvm | DriverKind::Xhyve)
    }

    /// Drivers that boot the machine from the kubelite ISO.
    pub fn boots_iso(&self) -> bool {
        !matches!(self, DriverKind::None | DriverKind::Generic)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = KubeliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        DriverKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| {
                let supported = DriverKind::ALL.map(|k| k.as_str()).join(", ");
                KubeliteError::Config(format!(
                    "unknown driver '{}'. Supported: {}",
                    s, supported
                ))
            })
    }
}

// ============================================================================
// Driver trait
// ============================================================================

/// Lifecycle of the single cluster machine.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> DriverKind;

    /// Validate host prerequisites before anything is created.
    async fn pre_create_check(&self) -> KubeliteResult<()>;

    async fn create(&self) -> KubeliteResult<()>;

    /// Current state. [`MachineState::None`] if the machine was never created.
    async fn state(&self) -> KubeliteResult<MachineState>;

    async fn ip(&self) -> KubeliteResult<IpAddr>;

    /// Container engine endpoint, e.g. `tcp://192.168.99.100:2376`.
    async fn url(&self) -> KubeliteResult<String> {
        let ip = self.ip().await?;
        Ok(format!("tcp://{}:{}", ip, ENGINE_PORT))
    }

    async fn start(&self) -> KubeliteResult<()>;

    async fn stop(&self) -> KubeliteResult<()>;

    async fn restart(&self) -> KubeliteResult<()>;

    async fn remove(&self) -> KubeliteResult<()>;

    /// Stop immediately, without a clean shutdown.
    async fn kill(&self) -> KubeliteResult<()>;

    fn command_runner(&self) -> KubeliteResult<Arc<dyn CommandRunner>>;
}
