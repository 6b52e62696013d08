use anyhow::Context;

pub async fn execute(global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let layout = global.options().layout();
    let cluster = global.create_cluster(global.cluster_options()?)?;

    println!("Deleting local Kubernetes cluster...");
    cluster.delete().await?;

    let config_path = layout.config_path();
    match std::fs::remove_file(&config_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing {}", config_path.display()));
        }
    }
    println!("Machine deleted.");
    Ok(())
}
