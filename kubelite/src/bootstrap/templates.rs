//! Command and unit-file templates, rendered with gtmpl (Go template syntax).

use gtmpl_value::Value;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::collections::HashMap;

// ============================================================================
// localkube
// ============================================================================

pub const LOCALKUBE_SERVICE_TEMPLATE: &str = r#"[Unit]
Description=Localkube
Documentation=https://github.com/kubernetes/minikube/tree/master/pkg/localkube

[Service]
Type=notify
Restart=always
RestartSec=3

ExecStart={{.ExecStart}}

ExecReload=/bin/kill -s HUP $MAINPID

[Install]
WantedBy=multi-user.target
"#;

/// Installs the unit and (re)starts it. Safe to run repeatedly.
pub const LOCALKUBE_START_TEMPLATE: &str = r#"sudo tee {{.UnitPath}} > /dev/null <<'KUBELITE_UNIT'
{{.Service}}KUBELITE_UNIT
sudo systemctl daemon-reload &&
sudo systemctl enable localkube.service &&
sudo systemctl restart localkube.service"#;

// ============================================================================
// kubeadm
// ============================================================================

pub const KUBEADM_INIT_TEMPLATE: &str = "sudo /usr/bin/kubeadm init --cert-dir {{.CertDir}} --service-cidr {{.ServiceCIDR}} --apiserver-advertise-address {{.AdvertiseAddress}} --apiserver-bind-port {{.APIServerPort}}";

pub const KUBEADM_RESTART_TEMPLATE: &str = "sudo /usr/bin/kubeadm alpha phase kubeconfig client-certs --cert-dir {{.CertDir}} --server {{.IP}} --client-name {{.MachineName}} > {{.TmpFile}}";

pub const KUBELET_SYSTEMD_TEMPLATE: &str = r#"[Service]
Environment="KUBELET_KUBECONFIG_ARGS=--kubeconfig=/etc/kubernetes/kubelet.conf --require-kubeconfig=true"
Environment="KUBELET_SYSTEM_PODS_ARGS=--pod-manifest-path=/etc/kubernetes/manifests --allow-privileged=true"
Environment="KUBELET_DNS_ARGS=--cluster-dns=10.0.0.10 --cluster-domain={{.DNSDomain}}"
Environment="KUBELET_CADVISOR_ARGS=--cadvisor-port=0"
Environment="KUBELET_CGROUP_ARGS=--cgroup-driver=cgroupfs"
ExecStart=
ExecStart=/usr/bin/kubelet $KUBELET_KUBECONFIG_ARGS $KUBELET_SYSTEM_PODS_ARGS $KUBELET_DNS_ARGS $KUBELET_CADVISOR_ARGS $KUBELET_CGROUP_ARGS {{.ExtraOptions}}
"#;

pub const KUBELET_SERVICE: &str = r#"[Unit]
Description=kubelet: The Kubernetes Node Agent
Documentation=http://kubernetes.io/docs/

[Service]
ExecStart=/usr/bin/kubelet
Restart=always
StartLimitInterval=0
RestartSec=10

[Install]
WantedBy=multi-user.target
"#;

// ============================================================================
// Rendering
// ============================================================================

/// Named values exposed to a template as `{{.Name}}`.
#[derive(Default)]
pub struct TemplateData {
    values: HashMap<String, Value>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }
}

pub fn render(name: &str, template: &str, data: TemplateData) -> KubeliteResult<String> {
    gtmpl::template(template, Value::Object(data.values))
        .map_err(|e| KubeliteError::Template(format!("{}: {}", name, e)))
}
