use anyhow::bail;
use clap::{Args, Subcommand};
use kubelite::{ClusterLifecycleState, images};

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Cache images locally and load them into the running machine
    Add {
        #[arg(required = true, num_args = 1..)]
        images: Vec<String>,
    },
}

pub async fn execute(args: CacheArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    match args.command {
        CacheCommand::Add { images } => add(images, global).await,
    }
}

async fn add(images: Vec<String>, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    match cluster.status().await? {
        ClusterLifecycleState::NotCreated | ClusterLifecycleState::Stopped => {
            bail!("the cluster machine is not running; run `kubelite start` first")
        }
        _ => {}
    }

    let runner = cluster.driver().command_runner()?;
    let cache_root = global.options().layout().image_cache_dir();
    images::cache_and_load_images_parallel(runner, &images, &cache_root).await?;
    for image in &images {
        println!("{}", image);
    }
    Ok(())
}
