//! HTTP downloads into the local cache.

use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Download `url` to `dest`.
///
/// The body is written to a temporary file next to `dest` and renamed into
/// place once complete (and verified, when `sha256` is given), so `dest`
/// only ever holds a full download.
pub async fn download_file(url: &str, dest: &Path, sha256: Option<&str>) -> KubeliteResult<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| KubeliteError::Internal(format!("no parent for {}", dest.display())))?;
    tokio::fs::create_dir_all(parent).await.map_err(|e| {
        KubeliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
    })?;

    tracing::info!(url, dest = %dest.display(), "Downloading");

    let mut response = reqwest::get(url)
        .await
        .map_err(|e| KubeliteError::Download(format!("{}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(KubeliteError::Download(format!(
            "{}: server returned {}",
            url,
            response.status()
        )));
    }

    let staging = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| KubeliteError::Storage(format!("failed to create temp file: {}", e)))?;
    let (std_file, staging_path) = staging.into_parts();
    let mut file = tokio::fs::File::from_std(std_file);

    let mut hasher = Sha256::new();
    let mut total = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| KubeliteError::Download(format!("{}: {}", url, e)))?
    {
        hasher.update(&chunk);
        total += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = sha256 {
        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(KubeliteError::Download(format!(
                "{}: checksum mismatch, expected {} got {}",
                url, expected, actual
            )));
        }
    }

    staging_path.persist(dest).map_err(|e| {
        KubeliteError::Storage(format!("failed to move download to {}: {}", dest.display(), e))
    })?;

    tracing::debug!(url, bytes = total, "Download complete");
    Ok(())
}
