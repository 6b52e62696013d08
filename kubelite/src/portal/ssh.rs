use super::process::{combined_output, output_with_input, run_attached};
use super::{CommandRunner, shell_quote};
use crate::assets::Asset;
use crate::runtime::constants::ssh::CONNECT_TIMEOUT_SECS;
use crate::runtime::options::SshEndpoint;
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::sync::Arc;
use tokio::process::Command;

/// ssh reserves this status for its own failures (connection, auth).
const SSH_ERROR_STATUS: i32 = 255;

/// Runner that drives the system `ssh` client.
///
/// Every call is its own ssh invocation, so handles are cheap to clone and
/// sessions never share state.
#[derive(Clone, Debug)]
pub struct SshRunner {
    endpoint: SshEndpoint,
}

impl SshRunner {
    pub fn new(endpoint: SshEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &SshEndpoint {
        &self.endpoint
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.endpoint.user, self.endpoint.host)
    }

    fn command(&self, tty: bool) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args([
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=quiet",
            "-o",
            "BatchMode=yes",
        ]);
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS));
        cmd.arg("-p").arg(self.endpoint.port.to_string());
        if let Some(identity) = &self.endpoint.identity_file {
            cmd.arg("-i").arg(identity);
        }
        if tty {
            cmd.arg("-t");
        }
        cmd.arg(self.destination());
        cmd
    }

    async fn exec(&self, remote_cmd: &str, input: Option<&[u8]>) -> KubeliteResult<String> {
        tracing::debug!(host = %self.endpoint.host, command = remote_cmd, "Running ssh command");

        let mut cmd = self.command(false);
        cmd.arg(remote_cmd);

        let output = output_with_input(cmd, input).await.map_err(|e| {
            KubeliteError::Connectivity(format!("failed to run ssh to {}: {}", self.destination(), e))
        })?;
        let text = combined_output(&output);

        match output.status.code() {
            Some(0) => Ok(text),
            Some(SSH_ERROR_STATUS) => Err(KubeliteError::Connectivity(format!(
                "{}: {}",
                self.destination(),
                text.trim()
            ))),
            code => Err(KubeliteError::RemoteCommand {
                command: remote_cmd.to_string(),
                exit_code: code,
                output: text,
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run(&self, cmd: &str) -> KubeliteResult<String> {
        self.exec(cmd, None).await
    }

    /// An empty `cmd` opens a login shell.
    async fn run_interactive(&self, cmd: &str) -> KubeliteResult<()> {
        let mut ssh = self.command(true);
        if cmd.trim().is_empty() {
            return run_attached(ssh, "ssh").await;
        }
        ssh.arg(cmd);
        run_attached(ssh, cmd).await
    }

    async fn copy(&self, asset: &Asset) -> KubeliteResult<()> {
        let content = asset.read().await?;
        // Validate before touching the machine.
        asset.mode()?;

        let target = asset.target_path();
        let staging = format!(
            "{}/.{}.kubelite-tmp",
            asset.target_dir().trim_end_matches('/'),
            asset.target_name()
        );
        let script = transfer_script(asset.target_dir(), &staging, &target, asset.permissions());

        tracing::debug!(
            host = %self.endpoint.host,
            target = %target,
            bytes = content.len(),
            "Transferring asset"
        );
        self.exec(&script, Some(&content)).await.map(|_| ())
    }

    fn open_session(&self) -> Arc<dyn CommandRunner> {
        Arc::new(self.clone())
    }
}

/// Shell pipeline that receives content on stdin and moves it into place.
fn transfer_script(dir: &str, staging: &str, target: &str, permissions: &str) -> String {
    format!(
        "sudo mkdir -p {dir} && sudo tee {staging} > /dev/null && sudo chmod {perms} {staging} && sudo mv -f {staging} {target}",
        dir = shell_quote(dir),
        staging = shell_quote(staging),
        perms = shell_quote(permissions),
        target = shell_quote(target),
    )
}
