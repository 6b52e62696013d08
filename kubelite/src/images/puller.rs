use super::archive::{ArchiveEntry, write_docker_archive};
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use oci_client::Reference;
use oci_client::manifest::{OciDescriptor, OciImageIndex, OciImageManifest, OciManifest};
use oci_client::secrets::RegistryAuth;
use std::path::Path;

/// Copies an image from its registry into a local `docker load` archive.
#[async_trait]
pub trait ImagePuller: Send + Sync {
    async fn pull(&self, reference: &str, destination: &Path) -> KubeliteResult<()>;
}

/// Anonymous pulls from OCI registries via `oci-client`.
pub struct RegistryPuller {
    client: oci_client::Client,
}

impl Default for RegistryPuller {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryPuller {
    pub fn new() -> Self {
        Self {
            client: oci_client::Client::new(Default::default()),
        }
    }

    async fn resolve_manifest(&self, reference: &Reference) -> KubeliteResult<OciImageManifest> {
        let (manifest, _digest) = self
            .client
            .pull_manifest(reference, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| download_error(reference, "manifest", e))?;

        match manifest {
            OciManifest::Image(image) => Ok(image),
            OciManifest::ImageIndex(index) => {
                let platform_ref = select_platform(reference, &index)?;
                let (platform_manifest, _) = self
                    .client
                    .pull_manifest(&platform_ref, &RegistryAuth::Anonymous)
                    .await
                    .map_err(|e| download_error(reference, "platform manifest", e))?;
                match platform_manifest {
                    OciManifest::Image(image) => Ok(image),
                    OciManifest::ImageIndex(_) => Err(KubeliteError::Download(format!(
                        "{}: nested image index",
                        reference
                    ))),
                }
            }
        }
    }

    async fn fetch_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        destination: &Path,
    ) -> KubeliteResult<()> {
        let mut file = tokio::fs::File::create(destination).await?;
        self.client
            .pull_blob(reference, descriptor, &mut file)
            .await
            .map_err(|e| download_error(reference, &descriptor.digest, e))?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl ImagePuller for RegistryPuller {
    async fn pull(&self, image: &str, destination: &Path) -> KubeliteResult<()> {
        let reference: Reference = image
            .parse()
            .map_err(|e| KubeliteError::Config(format!("invalid image reference {}: {}", image, e)))?;
        let manifest = self.resolve_manifest(&reference).await?;

        let blobs = tempfile::tempdir()?;
        let config_name = format!("{}.json", digest_hex(&manifest.config.digest));
        let config_path = blobs.path().join(&config_name);
        self.fetch_blob(&reference, &manifest.config, &config_path)
            .await?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            let name = format!("{}/layer.tar", digest_hex(&layer.digest));
            let path = blobs.path().join(digest_hex(&layer.digest));
            tracing::debug!(image, digest = %layer.digest, "Fetching layer");
            self.fetch_blob(&reference, layer, &path).await?;
            layers.push(ArchiveEntry { name, path });
        }

        let config = ArchiveEntry {
            name: config_name,
            path: config_path,
        };
        let repo_tag = repo_tag(image, &reference);
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || {
            write_docker_archive(&destination, &repo_tag, &config, &layers)
        })
        .await
        .map_err(|e| KubeliteError::Internal(format!("archive task: {}", e)))??;

        drop(blobs);
        Ok(())
    }
}

/// `sha256:abcd…` → `abcd…`
fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map(|(_, hex)| hex).unwrap_or(digest)
}

/// Tag recorded in the archive so `docker load` names the image as requested.
fn repo_tag(image: &str, reference: &Reference) -> String {
    if reference.digest().is_some() && reference.tag().is_none() {
        return reference.whole();
    }
    if image.rsplit('/').next().is_some_and(|last| last.contains(':')) {
        image.to_string()
    } else {
        format!("{}:{}", image, reference.tag().unwrap_or("latest"))
    }
}

fn select_platform(reference: &Reference, index: &OciImageIndex) -> KubeliteResult<Reference> {
    let arch = match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86_64" => "amd64",
        other => other,
    };
    let entry = index
        .manifests
        .iter()
        .find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|p| p.os == "linux" && p.architecture == arch)
        })
        .ok_or_else(|| {
            KubeliteError::Download(format!("{}: no linux/{} manifest", reference, arch))
        })?;

    format!("{}@{}", reference.whole(), entry.digest)
        .parse()
        .map_err(|e| KubeliteError::Download(format!("{}: {}", reference, e)))
}

fn download_error(reference: &Reference, what: &str, e: impl std::fmt::Display) -> KubeliteError {
    KubeliteError::Download(format!("{} ({}): {}", reference, what, e))
}
