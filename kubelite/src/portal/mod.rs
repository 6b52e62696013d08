//! Remote command execution and file transfer.
//!
//! Everything the orchestrator does inside the cluster machine goes through a
//! [`CommandRunner`]. Drivers hand one out; [`SshRunner`] reaches a machine over
//! the system `ssh` client, [`LocalRunner`] runs on the host itself.

mod local;
mod process;
mod ssh;

pub use local::LocalRunner;
pub use ssh::SshRunner;

use crate::assets::Asset;
use async_trait::async_trait;
use kubelite_shared::errors::KubeliteResult;
use std::sync::Arc;

/// Channel for running commands and placing files on the cluster machine.
///
/// Calls are independent; a failure of one does not affect the next.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and return stdout followed by stderr.
    async fn run(&self, cmd: &str) -> KubeliteResult<String>;

    /// Run a command attached to the local terminal until it exits or the user
    /// presses Ctrl-C.
    async fn run_interactive(&self, cmd: &str) -> KubeliteResult<()>;

    /// Place an asset at its target path with its permissions, creating
    /// missing directories and overwriting an existing file.
    async fn copy(&self, asset: &Asset) -> KubeliteResult<()>;

    /// An independent handle usable concurrently with this one.
    fn open_session(&self) -> Arc<dyn CommandRunner>;
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
