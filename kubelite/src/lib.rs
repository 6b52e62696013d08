//! kubelite: provision a single-node machine and bootstrap Kubernetes inside it.
//!
//! Layers, leaf to root:
//!
//! ```text
//! assets ──┐
//!          ├──→ portal (CommandRunner) ──→ certs, images, bootstrap ──→ cluster
//! driver ──┘
//! ```
//!
//! Everything that touches the machine goes through a [`portal::CommandRunner`]
//! obtained from the [`driver::Driver`].

pub mod assets;
pub mod bootstrap;
pub mod certs;
pub mod cluster;
pub mod driver;
pub mod images;
pub mod portal;
pub mod runtime;
pub mod util;

pub use bootstrap::{BootstrapperKind, ClusterStatus, ExtraOption, KubernetesConfig};
pub use cluster::{Cluster, ClusterLifecycleState};
pub use driver::{Driver, DriverKind, MachineState};
pub use kubelite_shared::{KubeliteError, KubeliteResult};
pub use runtime::layout::FilesystemLayout;
pub use runtime::options::{ClusterOptions, KubeliteOptions, MachineConfig};
