//! `docker load` archive layout:
//!
//! ```text
//! manifest.json          [{"Config": "<hex>.json", "RepoTags": [..], "Layers": ["<hex>/layer.tar"]}]
//! <hex>.json             image config
//! <hex>/layer.tar        one per layer
//! ```

use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) struct ArchiveEntry {
    /// Name inside the archive.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry<'a> {
    config: &'a str,
    repo_tags: Vec<&'a str>,
    layers: Vec<&'a str>,
}

pub(crate) fn write_docker_archive(
    destination: &Path,
    repo_tag: &str,
    config: &ArchiveEntry,
    layers: &[ArchiveEntry],
) -> KubeliteResult<()> {
    let manifest = vec![ManifestEntry {
        config: &config.name,
        repo_tags: vec![repo_tag],
        layers: layers.iter().map(|l| l.name.as_str()).collect(),
    }];
    let manifest_json = serde_json::to_vec(&manifest)
        .map_err(|e| KubeliteError::Internal(format!("archive manifest: {}", e)))?;

    let file = File::create(destination)?;
    let mut builder = tar::Builder::new(file);

    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_json.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "manifest.json", manifest_json.as_slice())?;

    builder.append_path_with_name(&config.path, &config.name)?;
    for layer in layers {
        builder.append_path_with_name(&layer.path, &layer.name)?;
    }

    let mut file = builder.into_inner()?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
