//! Container engine configuration inside the machine.

use crate::assets::Asset;
use crate::bootstrap::templates::{self, TemplateData};
use crate::portal::CommandRunner;
use crate::runtime::options::MachineConfig;
use kubelite_shared::constants::remote::DOCKER_DROPIN_DIR;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};

const DROPIN_NAME: &str = "10-machine.conf";

const DOCKER_DROPIN_TEMPLATE: &str = r#"[Service]
{{.Environment}}ExecStart=
ExecStart=/usr/bin/dockerd -H tcp://0.0.0.0:2376 -H unix:///var/run/docker.sock{{.Flags}}
"#;

/// Render the docker drop-in for the engine options of `machine`.
pub fn docker_dropin(machine: &MachineConfig) -> KubeliteResult<String> {
    let mut environment = String::new();
    for entry in &machine.docker_env {
        if !entry.contains('=') || entry.starts_with('=') {
            return Err(KubeliteError::Config(format!(
                "invalid docker env '{}', expected KEY=VALUE",
                entry
            )));
        }
        environment.push_str(&format!("Environment=\"{}\"\n", entry));
    }

    let mut flags = String::new();
    for registry in &machine.insecure_registry {
        flags.push_str(&format!(" --insecure-registry {}", registry));
    }
    for mirror in &machine.registry_mirror {
        flags.push_str(&format!(" --registry-mirror {}", mirror));
    }

    templates::render(
        "docker drop-in",
        DOCKER_DROPIN_TEMPLATE,
        TemplateData::new()
            .set("Environment", environment)
            .set("Flags", flags),
    )
}

/// Install the drop-in and restart the engine. Skipped when no engine
/// options are set.
pub async fn configure_engine(
    runner: &dyn CommandRunner,
    machine: &MachineConfig,
) -> KubeliteResult<()> {
    if !machine.has_engine_options() {
        return Ok(());
    }
    let dropin = docker_dropin(machine)?;
    tracing::info!(
        env = machine.docker_env.len(),
        insecure_registries = machine.insecure_registry.len(),
        mirrors = machine.registry_mirror.len(),
        "Configuring container engine"
    );
    runner
        .copy(&Asset::from_memory(
            dropin.into_bytes(),
            DOCKER_DROPIN_DIR,
            DROPIN_NAME,
            "0644",
        ))
        .await?;
    runner
        .run("sudo systemctl daemon-reload && sudo systemctl restart docker")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_dropin() {
        let machine = MachineConfig {
            docker_env: vec!["HTTP_PROXY=http://proxy:3128".into()],
            insecure_registry: vec!["10.0.0.0/24".into()],
            registry_mirror: vec!["https://mirror.local".into()],
            ..Default::default()
        };
        let dropin = docker_dropin(&machine).unwrap();
        assert!(dropin.contains("Environment=\"HTTP_PROXY=http://proxy:3128\"\nExecStart=\n"));
        assert!(dropin.contains(
            "docker.sock --insecure-registry 10.0.0.0/24 --registry-mirror https://mirror.local\n"
        ));
    }

    #[test]
    fn test_docker_env_must_be_key_value() {
        let machine = MachineConfig {
            docker_env: vec!["HTTP_PROXY".into()],
            ..Default::default()
        };
        assert!(matches!(
            docker_dropin(&machine),
            Err(KubeliteError::Config(_))
        ));
    }
}
