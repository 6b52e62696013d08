//! Constants for the kubelite runtime.
//!
//! Cluster-wide values live in `kubelite_shared::constants` and are re-exported
//! here next to the host-side defaults.

pub use kubelite_shared::constants::{files, kubernetes, machine, remote};

pub mod envs {
    pub const KUBELITE_HOME: &str = "KUBELITE_HOME";
}

/// Machine resource defaults
pub mod vm_defaults {
    pub const DEFAULT_CPUS: u32 = 2;

    /// Default memory in MiB
    pub const DEFAULT_MEMORY_MIB: u32 = 2048;

    /// Default disk size in MB
    pub const DEFAULT_DISK_SIZE_MB: u64 = 20_000;

    pub const DEFAULT_ISO_URL: &str =
        "https://storage.googleapis.com/minikube/iso/minikube-v0.23.0.iso";

    /// Default host-only network for hypervisors that need one.
    pub const DEFAULT_HOST_ONLY_CIDR: &str = "192.168.99.1/24";

    pub const DEFAULT_KVM_NETWORK: &str = "default";
}

/// SSH defaults for drivers reaching the machine over the network.
pub mod ssh {
    pub const DEFAULT_PORT: u16 = 22;
    pub const DEFAULT_USER: &str = "docker";

    /// Seconds to wait for the TCP/SSH handshake.
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
}
