pub async fn execute(global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    println!("Stopping local Kubernetes cluster...");
    cluster.stop().await?;
    println!("Machine stopped.");
    Ok(())
}
