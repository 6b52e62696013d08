//! Kubernetes parameters handed to the bootstrapper on every operation.

use kubelite_shared::constants::kubernetes::{
    DEFAULT_DNS_DOMAIN, DEFAULT_KUBERNETES_VERSION, EXTRA_OPTION_COMPONENTS,
    LOCALKUBE_RELEASE_URL,
};
use kubelite_shared::constants::machine::MACHINE_NAME;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_API_SERVER_NAME: &str = "kubeliteCA";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// A release version (`v1.7.0`) or the URI of a localkube binary.
    pub kubernetes_version: String,
    /// Filled in from the driver when empty.
    pub node_ip: String,
    pub node_name: String,
    pub api_server_name: String,
    pub dns_domain: String,
    pub container_runtime: String,
    pub network_plugin: String,
    pub feature_gates: String,
    pub extra_options: Vec<ExtraOption>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            node_ip: String::new(),
            node_name: MACHINE_NAME.to_string(),
            api_server_name: DEFAULT_API_SERVER_NAME.to_string(),
            dns_domain: DEFAULT_DNS_DOMAIN.to_string(),
            container_runtime: String::new(),
            network_plugin: String::new(),
            feature_gates: String::new(),
            extra_options: Vec::new(),
        }
    }
}

/// Where the localkube binary comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalkubeSource {
    /// The locally built binary under `out/`.
    Bundled,
    /// A local file given as `file://` URI.
    File(PathBuf),
    /// Downloaded from this URL.
    Remote(String),
}

impl KubernetesConfig {
    pub fn localkube_source(&self) -> LocalkubeSource {
        let version = self.kubernetes_version.trim();
        if version.is_empty() || version == DEFAULT_KUBERNETES_VERSION {
            LocalkubeSource::Bundled
        } else if let Some(path) = version.strip_prefix("file://") {
            LocalkubeSource::File(PathBuf::from(path))
        } else if version.starts_with("http://") || version.starts_with("https://") {
            LocalkubeSource::Remote(version.to_string())
        } else {
            LocalkubeSource::Remote(LOCALKUBE_RELEASE_URL.replace("{}", version))
        }
    }

    /// `(major, minor, patch)` when the version is a plain release string.
    pub fn semantic_version(&self) -> Option<(u64, u64, u64)> {
        parse_version(&self.kubernetes_version)
    }

    /// Options for one component, in the order given.
    pub fn options_for<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a ExtraOption> {
        self.extra_options
            .iter()
            .filter(move |o| o.component == component)
    }
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let core = version.trim().strip_prefix('v').unwrap_or(version.trim());
    let core = core.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

// ============================================================================
// Extra component options
// ============================================================================

/// A `component.key=value` setting forwarded to one control-plane component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtraOption {
    pub component: String,
    pub key: String,
    pub value: String,
}

impl ExtraOption {
    pub fn new(
        component: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> KubeliteResult<Self> {
        let option = Self {
            component: component.into(),
            key: key.into(),
            value: value.into(),
        };
        if !EXTRA_OPTION_COMPONENTS.contains(&option.component.as_str()) {
            return Err(KubeliteError::Config(format!(
                "invalid extra option component '{}'. Valid components: {}",
                option.component,
                EXTRA_OPTION_COMPONENTS.join(", ")
            )));
        }
        if option.key.is_empty() {
            return Err(KubeliteError::Config(format!(
                "extra option for {} has an empty key",
                option.component
            )));
        }
        Ok(option)
    }

    /// Rendered as a component flag, e.g. `--max-pods=5`.
    pub fn as_flag(&self) -> String {
        format!("--{}={}", self.key, self.value)
    }
}

impl FromStr for ExtraOption {
    type Err = KubeliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            KubeliteError::Config(format!(
                "invalid extra option '{}', expected component.key=value",
                s
            ))
        };
        let (path, value) = s.split_once('=').ok_or_else(invalid)?;
        let (component, key) = path.split_once('.').ok_or_else(invalid)?;
        ExtraOption::new(component, key, value)
    }
}

impl fmt::Display for ExtraOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}={}", self.component, self.key, self.value)
    }
}

impl TryFrom<String> for ExtraOption {
    type Error = KubeliteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExtraOption> for String {
    fn from(option: ExtraOption) -> Self {
        option.to_string()
    }
}
