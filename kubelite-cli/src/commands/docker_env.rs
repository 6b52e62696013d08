use std::collections::BTreeMap;

pub async fn execute(global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster(global.cluster_options()?)?;
    let env = cluster.docker_env().await?;
    print!("{}", shell_exports(&env));
    Ok(())
}

fn shell_exports(env: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in env {
        out.push_str(&format!("export {}=\"{}\"\n", key, value));
    }
    out.push_str("# Run this command to configure your shell:\n");
    out.push_str("# eval $(kubelite docker-env)\n");
    out
}
