use clap::Args;

#[derive(Args, Debug)]
pub struct SshArgs {
    /// Command to run instead of a login shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

pub async fn execute(args: SshArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    cluster.ssh_shell(&args.command).await?;
    Ok(())
}
