use clap::Args;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Keep streaming new log lines until interrupted
    #[arg(short, long)]
    pub follow: bool,
}

pub async fn execute(args: LogsArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    let logs = cluster.logs(args.follow).await?;
    print!("{}", logs);
    Ok(())
}
