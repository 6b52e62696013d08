use crate::commands::{cache::CacheArgs, logs::LogsArgs, ssh::SshArgs, start::StartArgs};
use clap::{Args, Parser, Subcommand};
use kubelite::{Cluster, ClusterOptions, KubeliteOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kubelite",
    author,
    version,
    about = "Run a single-node Kubernetes cluster locally"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or resume the cluster machine and start Kubernetes
    Start(StartArgs),
    /// Stop the cluster machine
    Stop,
    /// Delete the cluster machine and its local state
    Delete,
    /// Show the cluster state
    Status,
    /// Show control-plane logs
    Logs(LogsArgs),
    /// Manage the local image cache
    Cache(CacheArgs),
    /// Log into the cluster machine or run a command on it
    Ssh(SshArgs),
    /// Print the environment for using the machine's docker engine
    DockerEnv,
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// kubelite home directory (defaults to ~/.kubelite)
    #[arg(long, global = true, env = "KUBELITE_HOME")]
    pub home: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalFlags {
    pub fn options(&self) -> KubeliteOptions {
        match &self.home {
            Some(home_dir) => KubeliteOptions {
                home_dir: home_dir.clone(),
            },
            None => KubeliteOptions::default(),
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        self.options().home_dir
    }

    /// Options saved by the last `start`, or defaults.
    pub fn cluster_options(&self) -> anyhow::Result<ClusterOptions> {
        let layout = self.options().layout();
        Ok(ClusterOptions::load(&layout.config_path())?)
    }

    pub fn create_cluster(&self, options: ClusterOptions) -> anyhow::Result<Cluster> {
        Ok(Cluster::new(options, self.options().layout())?)
    }
}
