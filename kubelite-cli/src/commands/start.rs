use clap::Args;
use kubelite::runtime::options::parse_disk_size_mb;
use kubelite::{BootstrapperKind, ClusterOptions, DriverKind, ExtraOption};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Machine driver (none, generic, virtualbox, kvm, hyperv, xhyve, vmwarefusion)
    #[arg(long)]
    pub vm_driver: Option<DriverKind>,

    /// Machine memory in MiB
    #[arg(long)]
    pub memory: Option<u32>,

    #[arg(long)]
    pub cpus: Option<u32>,

    /// Disk size, e.g. 20g or 512m
    #[arg(long)]
    pub disk_size: Option<String>,

    /// Boot ISO location (http(s) or file://)
    #[arg(long)]
    pub iso_url: Option<String>,

    /// Kubernetes version (v1.7.0) or URI of a localkube binary
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    #[arg(long)]
    pub container_runtime: Option<String>,

    #[arg(long)]
    pub network_plugin: Option<String>,

    #[arg(long)]
    pub feature_gates: Option<String>,

    #[arg(long)]
    pub dns_domain: Option<String>,

    /// Component option as component.key=value (repeatable)
    #[arg(long)]
    pub extra_config: Vec<ExtraOption>,

    /// localkube or kubeadm
    #[arg(long)]
    pub bootstrapper: Option<BootstrapperKind>,

    /// Container engine environment as KEY=VALUE (repeatable)
    #[arg(long)]
    pub docker_env: Vec<String>,

    /// Registry the engine may reach without TLS (repeatable)
    #[arg(long)]
    pub insecure_registry: Vec<String>,

    /// Registry mirror for the engine (repeatable)
    #[arg(long)]
    pub registry_mirror: Vec<String>,

    /// Pre-load the default images into the machine
    #[arg(long)]
    pub cache_images: bool,
}

impl StartArgs {
    /// Override saved options with the flags that were given.
    pub fn apply(&self, options: &mut ClusterOptions) -> anyhow::Result<()> {
        let machine = &mut options.machine;
        if let Some(kind) = self.vm_driver {
            machine.vm_driver = kind;
        }
        if let Some(memory) = self.memory {
            machine.memory_mib = memory;
        }
        if let Some(cpus) = self.cpus {
            machine.cpus = cpus;
        }
        if let Some(size) = &self.disk_size {
            machine.disk_size_mb = parse_disk_size_mb(size)?;
        }
        if let Some(url) = &self.iso_url {
            machine.iso_url = url.clone();
        }
        if !self.docker_env.is_empty() {
            machine.docker_env = self.docker_env.clone();
        }
        if !self.insecure_registry.is_empty() {
            machine.insecure_registry = self.insecure_registry.clone();
        }
        if !self.registry_mirror.is_empty() {
            machine.registry_mirror = self.registry_mirror.clone();
        }

        let kubernetes = &mut options.kubernetes;
        if let Some(version) = &self.kubernetes_version {
            kubernetes.kubernetes_version = version.clone();
        }
        if let Some(runtime) = &self.container_runtime {
            kubernetes.container_runtime = runtime.clone();
        }
        if let Some(plugin) = &self.network_plugin {
            kubernetes.network_plugin = plugin.clone();
        }
        if let Some(gates) = &self.feature_gates {
            kubernetes.feature_gates = gates.clone();
        }
        if let Some(domain) = &self.dns_domain {
            kubernetes.dns_domain = domain.clone();
        }
        if !self.extra_config.is_empty() {
            kubernetes.extra_options = self.extra_config.clone();
        }

        if let Some(kind) = self.bootstrapper {
            options.bootstrapper = kind;
        }
        if self.cache_images {
            options.cache_images = true;
        }
        Ok(())
    }
}

pub async fn execute(args: StartArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut options = global.cluster_options()?;
    args.apply(&mut options)?;

    let cluster = global.create_cluster(options.clone())?;
    options.save(&global.options().layout().config_path())?;

    println!(
        "Starting local Kubernetes {} cluster...",
        options.kubernetes.kubernetes_version
    );
    cluster
        .setup_and_start(&options.machine, &options.kubernetes)
        .await?;
    println!("Kubernetes is available.");
    Ok(())
}
