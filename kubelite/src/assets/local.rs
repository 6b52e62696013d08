use super::Asset;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Materialize an asset on the local filesystem.
///
/// Parent directories are created; content is written to a sibling temporary
/// file and renamed into place, then the mode is applied.
pub async fn copy_local(asset: &Asset) -> KubeliteResult<()> {
    let target = PathBuf::from(asset.target_path());
    let mode = asset.mode()?;
    let content = asset.read().await?;

    let parent = target
        .parent()
        .ok_or_else(|| KubeliteError::Config(format!("invalid target {}", target.display())))?;
    tokio::fs::create_dir_all(parent).await.map_err(|e| {
        KubeliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
    })?;

    let staging = parent.join(format!(
        ".{}.kubelite-{}",
        asset.target_name(),
        std::process::id()
    ));
    tokio::fs::write(&staging, &content).await.map_err(|e| {
        KubeliteError::Storage(format!("failed to write {}: {}", staging.display(), e))
    })?;
    if let Err(e) = tokio::fs::rename(&staging, &target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(KubeliteError::Storage(format!(
            "failed to move into {}: {}",
            target.display(),
            e
        )));
    }

    set_mode(&target, mode).await?;
    tracing::debug!(path = %target.display(), mode = %format!("{:o}", mode), "Copied asset locally");
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> KubeliteResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| {
            KubeliteError::Storage(format!(
                "failed to set mode {:o} on {}: {}",
                mode,
                path.display(),
                e
            ))
        })
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> KubeliteResult<()> {
    Ok(())
}

/// Expand every regular file under `src_dir` into an asset below `target_dir`,
/// keeping relative subdirectories.
pub fn assets_from_dir(
    src_dir: &Path,
    target_dir: &str,
    permissions: &str,
) -> KubeliteResult<Vec<Asset>> {
    if !src_dir.is_dir() {
        return Err(KubeliteError::AssetNotFound(src_dir.to_path_buf()));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            KubeliteError::Storage(format!("failed to walk {}: {}", src_dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| KubeliteError::Internal(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let mut dir = target_dir.trim_end_matches('/').to_string();
        if let Some(sub) = relative.parent().filter(|p| !p.as_os_str().is_empty()) {
            for part in sub.components() {
                dir.push('/');
                dir.push_str(&part.as_os_str().to_string_lossy());
            }
        }

        assets.push(Asset::from_file(entry.path(), dir, name, permissions));
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_local_creates_dirs_and_sets_mode() {
        let dir = TempDir::new().unwrap();
        let target_dir = dir.path().join("a").join("b");
        let asset = Asset::from_memory(
            b"secret".to_vec(),
            target_dir.to_string_lossy(),
            "ca.key",
            "0600",
        );

        copy_local(&asset).await.unwrap();

        let written = target_dir.join("ca.key");
        assert_eq!(std::fs::read(&written).unwrap(), b"secret");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&written).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_copy_local_overwrites() {
        let dir = TempDir::new().unwrap();
        let target_dir = dir.path().to_string_lossy().into_owned();

        copy_local(&Asset::from_memory(b"one".to_vec(), &target_dir, "f", "0644"))
            .await
            .unwrap();
        copy_local(&Asset::from_memory(b"two".to_vec(), &target_dir, "f", "0644"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), b"two");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_assets_from_dir_keeps_subdirectories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("dns")).unwrap();
        std::fs::write(dir.path().join("top.yaml"), "a").unwrap();
        std::fs::write(dir.path().join("dns").join("svc.yaml"), "b").unwrap();

        let assets = assets_from_dir(dir.path(), "/etc/kubernetes/addons", "0640").unwrap();
        let mut targets: Vec<_> = assets.iter().map(|a| a.target_path()).collect();
        targets.sort();
        assert_eq!(
            targets,
            vec![
                "/etc/kubernetes/addons/dns/svc.yaml",
                "/etc/kubernetes/addons/top.yaml"
            ]
        );
        assert!(assets.iter().all(|a| a.permissions() == "0640"));
    }

    #[test]
    fn test_assets_from_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            assets_from_dir(&missing, "/x", "0644"),
            Err(KubeliteError::AssetNotFound(_))
        ));
    }
}
