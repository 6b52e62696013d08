//! Cluster certificates: a local CA and the API server's serving pair.
//!
//! Certificates are generated on the host under the kubelite home and then
//! distributed to the machine's cert directory.

mod authority;

pub use authority::{CA_COMMON_NAME, generate_certs};

use crate::assets::Asset;
use crate::portal::{CommandRunner, shell_quote};
use kubelite_shared::constants::{files, remote::CERT_DIR};
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const STAGED_SUFFIX: &str = ".staged";

/// Local locations of the four certificate artifacts.
#[derive(Clone, Debug)]
pub struct CertPaths {
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    pub apiserver_cert: PathBuf,
    pub apiserver_key: PathBuf,
}

impl CertPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            ca_cert: root.join(files::CA_CERT),
            ca_key: root.join(files::CA_KEY),
            apiserver_cert: root.join(files::APISERVER_CERT),
            apiserver_key: root.join(files::APISERVER_KEY),
        }
    }

    /// `(local path, file name, permissions)` for each artifact.
    pub fn artifacts(&self) -> [(&Path, &'static str, &'static str); 4] {
        [
            (self.ca_cert.as_path(), files::CA_CERT, "0644"),
            (self.ca_key.as_path(), files::CA_KEY, "0600"),
            (self.apiserver_cert.as_path(), files::APISERVER_CERT, "0644"),
            (self.apiserver_key.as_path(), files::APISERVER_KEY, "0600"),
        ]
    }
}

/// Generate certificates for `node_ip` and install them on the machine.
///
/// Every artifact is first copied next to its final name with a `.staged`
/// suffix. Only when all four are staged does a single command move them into
/// place, so the API server never sees a mix of old and new files.
pub async fn setup_certs(
    runner: &dyn CommandRunner,
    paths: &CertPaths,
    node_ip: IpAddr,
) -> KubeliteResult<()> {
    tracing::info!(%node_ip, "Setting up certificates");
    generate_certs(paths, node_ip)?;

    let mut staged = Vec::with_capacity(4);
    for (path, name, perms) in paths.artifacts() {
        let asset = Asset::from_file(path, CERT_DIR, format!("{}{}", name, STAGED_SUFFIX), perms);
        if let Err(e) = runner.copy(&asset).await {
            remove_staged(runner, &staged).await;
            return Err(KubeliteError::Certificate(format!(
                "staging {}: {}",
                name, e
            )));
        }
        staged.push(name);
    }

    let install = staged
        .iter()
        .map(|name| {
            format!(
                "sudo mv -f {} {}",
                shell_quote(&staged_path(name)),
                shell_quote(&remote_path(name))
            )
        })
        .collect::<Vec<_>>()
        .join(" && ");
    runner
        .run(&install)
        .await
        .map_err(|e| KubeliteError::Certificate(format!("installing certificates: {}", e)))?;

    tracing::debug!(dir = CERT_DIR, "Certificates installed");
    Ok(())
}

fn remote_path(name: &str) -> String {
    format!("{}/{}", CERT_DIR.trim_end_matches('/'), name)
}

fn staged_path(name: &str) -> String {
    format!("{}{}", remote_path(name), STAGED_SUFFIX)
}

async fn remove_staged(runner: &dyn CommandRunner, staged: &[&str]) {
    if staged.is_empty() {
        return;
    }
    let targets = staged
        .iter()
        .map(|name| shell_quote(&staged_path(name)))
        .collect::<Vec<_>>()
        .join(" ");
    if let Err(e) = runner.run(&format!("sudo rm -f {}", targets)).await {
        tracing::warn!(error = %e, "Failed to remove staged certificates");
    }
}
