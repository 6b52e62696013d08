use super::{Asset, assets_from_dir};
use kubelite_shared::constants::remote::ADDONS_DIR;
use kubelite_shared::errors::KubeliteResult;
use std::collections::HashMap;
use std::path::Path;

/// Static pods watched by the kubelet.
const MANIFESTS_DIR: &str = "/etc/kubernetes/manifests";

const ADDON_PERMISSIONS: &str = "0640";

/// A named group of manifests that is installed or skipped as a unit.
#[derive(Clone, Debug)]
pub struct AddonBundle {
    pub name: String,
    pub assets: Vec<Asset>,
    pub enabled_by_default: bool,
}

impl AddonBundle {
    fn new(name: &str, assets: Vec<Asset>, enabled_by_default: bool) -> Self {
        Self {
            name: name.to_string(),
            assets,
            enabled_by_default,
        }
    }

    /// Whether the bundle is installed, honoring per-name overrides.
    pub fn is_enabled(&self, overrides: &HashMap<String, bool>) -> bool {
        overrides
            .get(&self.name)
            .copied()
            .unwrap_or(self.enabled_by_default)
    }
}

/// The bundled addons shipped under `<deploy_dir>/addons`.
pub fn default_addons(deploy_dir: &Path) -> Vec<AddonBundle> {
    let root = deploy_dir.join("addons");
    let addon = |rel: &str, target_dir: &str| {
        let src = root.join(rel);
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| rel.to_string());
        Asset::from_file(src, target_dir, name, ADDON_PERMISSIONS)
    };

    vec![
        AddonBundle::new(
            "addon-manager",
            vec![addon("addon-manager.yaml", MANIFESTS_DIR)],
            true,
        ),
        AddonBundle::new(
            "dashboard",
            vec![
                addon("dashboard/dashboard-rc.yaml", ADDONS_DIR),
                addon("dashboard/dashboard-svc.yaml", ADDONS_DIR),
            ],
            true,
        ),
        AddonBundle::new(
            "default-storageclass",
            vec![addon("storageclass/storageclass.yaml", ADDONS_DIR)],
            true,
        ),
        AddonBundle::new(
            "storage-provisioner",
            vec![addon(
                "storage-provisioner/storage-provisioner.yaml",
                ADDONS_DIR,
            )],
            true,
        ),
        AddonBundle::new(
            "kube-dns",
            vec![
                addon("kube-dns/kube-dns-controller.yaml", ADDONS_DIR),
                addon("kube-dns/kube-dns-cm.yaml", ADDONS_DIR),
                addon("kube-dns/kube-dns-svc.yaml", ADDONS_DIR),
            ],
            true,
        ),
        AddonBundle::new(
            "heapster",
            vec![
                addon("heapster/influxGrafana-rc.yaml", ADDONS_DIR),
                addon("heapster/grafana-svc.yaml", ADDONS_DIR),
                addon("heapster/influxdb-svc.yaml", ADDONS_DIR),
                addon("heapster/heapster-rc.yaml", ADDONS_DIR),
                addon("heapster/heapster-svc.yaml", ADDONS_DIR),
            ],
            false,
        ),
        AddonBundle::new(
            "ingress",
            vec![
                addon("ingress/ingress-configmap.yaml", ADDONS_DIR),
                addon("ingress/ingress-rc.yaml", ADDONS_DIR),
                addon("ingress/ingress-svc.yaml", ADDONS_DIR),
            ],
            false,
        ),
        AddonBundle::new(
            "registry-creds",
            vec![addon("registry-creds/registry-creds-rc.yaml", ADDONS_DIR)],
            false,
        ),
    ]
}

/// User manifests from `addons_dir`, mapped into the machine's addon directory.
///
/// A missing directory yields no assets.
pub fn user_addon_assets(addons_dir: &Path) -> KubeliteResult<Vec<Asset>> {
    if !addons_dir.is_dir() {
        return Ok(Vec::new());
    }
    assets_from_dir(addons_dir, ADDONS_DIR, ADDON_PERMISSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_addon_names() {
        let names: Vec<_> = default_addons(Path::new("/deploy"))
            .into_iter()
            .map(|b| b.name)
            .collect();
        for expected in [
            "addon-manager",
            "dashboard",
            "kube-dns",
            "heapster",
            "ingress",
            "registry-creds",
            "default-storageclass",
            "storage-provisioner",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let bundles = default_addons(Path::new("/deploy"));
        let heapster = bundles.iter().find(|b| b.name == "heapster").unwrap();
        let dashboard = bundles.iter().find(|b| b.name == "dashboard").unwrap();

        let mut overrides = HashMap::new();
        assert!(!heapster.is_enabled(&overrides));
        assert!(dashboard.is_enabled(&overrides));

        overrides.insert("heapster".to_string(), true);
        overrides.insert("dashboard".to_string(), false);
        assert!(heapster.is_enabled(&overrides));
        assert!(!dashboard.is_enabled(&overrides));
    }

    #[test]
    fn test_addon_manager_goes_to_manifests() {
        let bundles = default_addons(Path::new("/deploy"));
        let manager = bundles.iter().find(|b| b.name == "addon-manager").unwrap();
        assert_eq!(
            manager.assets[0].target_path(),
            "/etc/kubernetes/manifests/addon-manager.yaml"
        );
        assert_eq!(
            manager.assets[0].source_path(),
            Some(Path::new("/deploy/addons/addon-manager.yaml"))
        );
    }

    #[test]
    fn test_user_addons() {
        let dir = TempDir::new().unwrap();
        assert!(user_addon_assets(&dir.path().join("missing")).unwrap().is_empty());

        std::fs::write(dir.path().join("mine.yaml"), "kind: Pod").unwrap();
        let assets = user_addon_assets(dir.path()).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].target_path(), "/etc/kubernetes/addons/mine.yaml");
        assert_eq!(assets[0].permissions(), "0640");
    }
}
