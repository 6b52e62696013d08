pub async fn execute(global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    let state = cluster.status().await?;
    println!("cluster: {}", state);
    Ok(())
}
