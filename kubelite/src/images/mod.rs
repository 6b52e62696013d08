//! Container image cache.
//!
//! Images are pulled once into a host-side cache as `docker load` archives and
//! then transferred into the machine and loaded, one concurrent task per image.
//!
//! ```text
//! registry ──pull──→ <cache_root>/<sanitized ref> ──copy──→ /tmp/<file> ──docker load──→ engine
//! ```

mod archive;
mod cache;
mod puller;

pub use cache::ImageCache;
pub use puller::{ImagePuller, RegistryPuller};

use crate::portal::CommandRunner;
use kubelite_shared::errors::KubeliteResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Images preloaded for a localkube cluster.
pub const LOCALKUBE_CACHED_IMAGES: &[&str] = &[
    "gcr.io/google-containers/kube-addon-manager:v6.4-beta.2",
    "gcr.io/google_containers/kubernetes-dashboard-amd64:v1.6.3",
    "gcr.io/google_containers/k8s-dns-kube-dns-amd64:1.14.4",
    "gcr.io/google_containers/k8s-dns-dnsmasq-nanny-amd64:1.14.4",
    "gcr.io/google_containers/k8s-dns-sidecar-amd64:1.14.4",
    "gcr.io/google_containers/pause-amd64:3.0",
    "gcr.io/k8s-minikube/storage-provisioner:v1.8.0",
];

/// Make an image reference usable as a cache path: `:` becomes `_`.
pub fn sanitize_cache_path(path: &str) -> String {
    path.replace(':', "_")
}

/// `path` as a relative path made only of plain segments. `None` for empty,
/// absolute, `.` or `..` segments.
pub(crate) fn relative_cache_path(path: &str) -> Option<PathBuf> {
    let valid = !path.is_empty()
        && path
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."));
    valid.then(|| PathBuf::from(path))
}

/// Cache every image under `cache_root` and load it into the machine, using
/// the registry puller.
pub async fn cache_and_load_images_parallel(
    runner: Arc<dyn CommandRunner>,
    images: &[String],
    cache_root: &Path,
) -> KubeliteResult<()> {
    let cache = ImageCache::new(cache_root, Arc::new(RegistryPuller::new()));
    cache.cache_and_load(runner, images).await
}

/// The default image list as owned strings.
pub fn default_images() -> Vec<String> {
    LOCALKUBE_CACHED_IMAGES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
