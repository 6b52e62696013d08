use super::CertPaths;
use kubelite_shared::constants::kubernetes::{DEFAULT_DNS_DOMAIN, DEFAULT_SERVICE_CLUSTER_IP};
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SanType,
};
use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, SystemTime};

pub const CA_COMMON_NAME: &str = "kubeliteCA";

const APISERVER_COMMON_NAME: &str = "kubelite";

const CA_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
const LEAF_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Ensure a CA exists and issue a fresh API server pair for `node_ip`.
///
/// The CA is reused when both of its files are present. The API server pair
/// is regenerated on every call since the node address may have changed.
pub fn generate_certs(paths: &CertPaths, node_ip: IpAddr) -> KubeliteResult<()> {
    let (ca_cert, ca_key) = if paths.ca_cert.exists() && paths.ca_key.exists() {
        tracing::debug!(path = %paths.ca_cert.display(), "Reusing existing CA");
        load_ca(&paths.ca_key)?
    } else {
        tracing::info!("Generating new certificate authority");
        let (cert, key) = new_ca()?;
        write_pem(&paths.ca_cert, &cert.pem(), 0o644)?;
        write_pem(&paths.ca_key, &key.serialize_pem(), 0o600)?;
        (cert, key)
    };

    let (cert_pem, key_pem) = issue_apiserver_cert(&ca_cert, &ca_key, node_ip)?;
    write_pem(&paths.apiserver_cert, &cert_pem, 0o644)?;
    write_pem(&paths.apiserver_key, &key_pem, 0o600)?;
    Ok(())
}

fn ca_params() -> KubeliteResult<CertificateParams> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| cert_error("CA params", e))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, CA_COMMON_NAME);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let not_before = SystemTime::now();
    params.not_before = not_before.into();
    params.not_after = (not_before + CA_VALIDITY).into();
    Ok(params)
}

fn new_ca() -> KubeliteResult<(Certificate, KeyPair)> {
    let key = KeyPair::generate().map_err(|e| cert_error("CA key", e))?;
    let cert = ca_params()?
        .self_signed(&key)
        .map_err(|e| cert_error("CA certificate", e))?;
    Ok((cert, key))
}

/// Rebuild the signing certificate around the stored CA key. Issued
/// certificates chain to the stored `ca.crt` through the shared subject and key.
fn load_ca(ca_key_path: &Path) -> KubeliteResult<(Certificate, KeyPair)> {
    let pem = std::fs::read_to_string(ca_key_path).map_err(|e| {
        KubeliteError::Certificate(format!("reading {}: {}", ca_key_path.display(), e))
    })?;
    let key = KeyPair::from_pem(&pem).map_err(|e| cert_error("parsing CA key", e))?;
    let cert = ca_params()?
        .self_signed(&key)
        .map_err(|e| cert_error("rebuilding CA certificate", e))?;
    Ok((cert, key))
}

fn issue_apiserver_cert(
    ca_cert: &Certificate,
    ca_key: &KeyPair,
    node_ip: IpAddr,
) -> KubeliteResult<(String, String)> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| cert_error("apiserver params", e))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, APISERVER_COMMON_NAME);
    params.subject_alt_names = apiserver_sans(node_ip)?;

    let not_before = SystemTime::now();
    params.not_before = not_before.into();
    params.not_after = (not_before + LEAF_VALIDITY).into();

    let key = KeyPair::generate().map_err(|e| cert_error("apiserver key", e))?;
    let cert = params
        .signed_by(&key, ca_cert, ca_key)
        .map_err(|e| cert_error("signing apiserver certificate", e))?;
    Ok((cert.pem(), key.serialize_pem()))
}

fn apiserver_sans(node_ip: IpAddr) -> KubeliteResult<Vec<SanType>> {
    let service_ip: IpAddr = DEFAULT_SERVICE_CLUSTER_IP
        .parse()
        .map_err(|e| KubeliteError::Internal(format!("service IP: {}", e)))?;

    let mut sans = vec![SanType::IpAddress(node_ip), SanType::IpAddress(service_ip)];
    for name in [
        "localhost".to_string(),
        "kubernetes".to_string(),
        "kubernetes.default".to_string(),
        "kubernetes.default.svc".to_string(),
        format!("kubernetes.default.svc.{}", DEFAULT_DNS_DOMAIN),
    ] {
        let dns = name
            .try_into()
            .map_err(|e| cert_error("DNS subject alternative name", e))?;
        sans.push(SanType::DnsName(dns));
    }
    Ok(sans)
}

fn write_pem(path: &Path, pem: &str, mode: u32) -> KubeliteResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            KubeliteError::Certificate(format!("creating {}: {}", parent.display(), e))
        })?;
    }
    std::fs::write(path, pem)
        .map_err(|e| KubeliteError::Certificate(format!("writing {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            KubeliteError::Certificate(format!("chmod {}: {}", path.display(), e))
        })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

fn cert_error(what: &str, e: rcgen::Error) -> KubeliteError {
    KubeliteError::Certificate(format!("{}: {}", what, e))
}
