use super::CommandRunner;
use super::process::{combined_output, output_with_input, run_attached};
use crate::assets::{Asset, copy_local};
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::sync::Arc;
use tokio::process::Command;

/// Runner for the host itself: commands go through `sh -c`, copies are plain
/// filesystem writes.
#[derive(Clone, Debug, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }

    fn shell(cmd: &str) -> Command {
        let mut sh = Command::new("sh");
        sh.arg("-c").arg(cmd);
        sh
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, cmd: &str) -> KubeliteResult<String> {
        tracing::debug!(command = cmd, "Running local command");
        let output = output_with_input(Self::shell(cmd), None)
            .await
            .map_err(|e| KubeliteError::Internal(format!("failed to spawn sh: {}", e)))?;
        let text = combined_output(&output);
        if output.status.success() {
            Ok(text)
        } else {
            Err(KubeliteError::RemoteCommand {
                command: cmd.to_string(),
                exit_code: output.status.code(),
                output: text,
            })
        }
    }

    async fn run_interactive(&self, cmd: &str) -> KubeliteResult<()> {
        run_attached(Self::shell(cmd), cmd).await
    }

    async fn copy(&self, asset: &Asset) -> KubeliteResult<()> {
        copy_local(asset).await
    }

    fn open_session(&self) -> Arc<dyn CommandRunner> {
        Arc::new(LocalRunner)
    }
}
