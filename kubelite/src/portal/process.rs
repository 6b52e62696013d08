//! Child process helpers shared by the runners.

use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub(crate) fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Spawn `command`, optionally feeding `input` on stdin, and collect its output.
pub(crate) async fn output_with_input(
    mut command: Command,
    input: Option<&[u8]>,
) -> std::io::Result<Output> {
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdin = child.stdin.take();

    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    // A child that exits early closes the pipe; its exit status tells the story.
    if let Err(e) = fed
        && output.status.success()
    {
        return Err(e);
    }
    Ok(output)
}

/// Run `command` with inherited stdio until it exits or Ctrl-C is pressed.
pub(crate) async fn run_attached(mut command: Command, label: &str) -> KubeliteResult<()> {
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        KubeliteError::Connectivity(format!("failed to spawn `{}`: {}", label, e))
    })?;

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(KubeliteError::RemoteCommand {
                    command: label.to_string(),
                    exit_code: status.code(),
                    output: String::new(),
                })
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!(command = label, "Interrupted, stopping attached command");
            let _ = child.kill().await;
            Ok(())
        }
    }
}
