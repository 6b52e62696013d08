//! Constants shared between the orchestrator and the CLI.
//!
//! Remote paths are fixed locations inside the cluster machine; they are the
//! same for every driver.

/// Machine identity.
pub mod machine {
    /// Name of the single cluster machine.
    pub const MACHINE_NAME: &str = "kubelite";

    /// Number of attempts made at creating the machine before giving up.
    pub const CREATE_ATTEMPTS: u32 = 3;
}

/// Kubernetes control-plane defaults.
pub mod kubernetes {
    /// Version bundled with this build. Any other value is fetched.
    pub const DEFAULT_KUBERNETES_VERSION: &str = "v1.7.0";

    /// Secure port the API server listens on.
    pub const API_SERVER_PORT: u16 = 8443;

    /// Service network handed to the control plane.
    pub const DEFAULT_SERVICE_CIDR: &str = "10.0.0.0/24";

    /// First address of the service network (the `kubernetes` service).
    pub const DEFAULT_SERVICE_CLUSTER_IP: &str = "10.0.0.1";

    pub const DEFAULT_DNS_DOMAIN: &str = "cluster.local";

    /// Components accepted as the prefix of an `--extra-config` option.
    pub const EXTRA_OPTION_COMPONENTS: &[&str] = &[
        "kubelet",
        "apiserver",
        "controller-manager",
        "etcd",
        "proxy",
        "scheduler",
    ];

    /// Download location of released localkube binaries; `{}` is the version.
    pub const LOCALKUBE_RELEASE_URL: &str =
        "https://storage.googleapis.com/minikube/k8sReleases/{}/localkube-linux-amd64";
}

/// Paths inside the cluster machine.
pub mod remote {
    /// Directory the API server reads its certificates from.
    pub const CERT_DIR: &str = "/var/lib/localkube/certs/";

    /// Where transferred image archives are staged before `docker load`.
    pub const IMAGE_LOAD_DIR: &str = "/tmp";

    /// Target of the localkube binary.
    pub const LOCALKUBE_BIN_DIR: &str = "/usr/local/bin";

    /// Addon manifests watched by the addon manager.
    pub const ADDONS_DIR: &str = "/etc/kubernetes/addons";

    /// Staging directory for the kubeadm bundle.
    pub const KUBEADM_STAGING_DIR: &str = "/kubeadm";

    /// Kubernetes configuration directory used by kubeadm.
    pub const KUBERNETES_CONFIG_DIR: &str = "/etc/kubernetes";

    /// Docker daemon systemd drop-in directory.
    pub const DOCKER_DROPIN_DIR: &str = "/etc/systemd/system/docker.service.d";
}

/// Local file names under the kubelite home.
pub mod files {
    pub const CA_CERT: &str = "ca.crt";
    pub const CA_KEY: &str = "ca.key";
    pub const APISERVER_CERT: &str = "apiserver.crt";
    pub const APISERVER_KEY: &str = "apiserver.key";

    /// Cluster options file.
    pub const CONFIG_FILE: &str = "config.json";
}
