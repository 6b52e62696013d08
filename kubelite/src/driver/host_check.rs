//! Host virtualization detection for hypervisor-backed drivers.
//!
//! Run before `pre_create_check` so a missing hypervisor is reported up front
//! instead of as an obscure failure halfway through machine creation.

use kubelite_shared::errors::{KubeliteError, KubeliteResult};

/// Confirmation that the host can run a local hypervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualizationSupport {
    pub reason: String,
}

/// Check that the host exposes hardware virtualization.
///
/// - **Linux**: `/dev/kvm` exists and can be opened read/write
/// - **macOS**: `sysctl kern.hv_support` reports 1
///
/// # Errors
/// `KubeliteError::Unsupported` with suggestions for fixing the host.
pub fn check_virtualization_support() -> KubeliteResult<VirtualizationSupport> {
    #[cfg(target_os = "linux")]
    {
        check_linux_kvm()
    }

    #[cfg(target_os = "macos")]
    {
        check_macos_hypervisor()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(KubeliteError::Unsupported(
            "hypervisor detection is only implemented for Linux and macOS".into(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn check_linux_kvm() -> KubeliteResult<VirtualizationSupport> {
    use std::path::Path;

    const KVM_DEVICE: &str = "/dev/kvm";
    let kvm_path = Path::new(KVM_DEVICE);

    if !kvm_path.exists() {
        return Err(KubeliteError::Unsupported(format!(
            "{} does not exist\n\n\
             Suggestions:\n\
             - Enable VT-x/AMD-V in your firmware settings\n\
             - Load the module: sudo modprobe kvm_intel (or kvm_amd)\n\
             - Or use --vm-driver=none to run on the host directly",
            KVM_DEVICE
        )));
    }

    match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(kvm_path)
    {
        Ok(_) => Ok(VirtualizationSupport {
            reason: "KVM is available and accessible".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(KubeliteError::Unsupported(format!(
                "{} exists but access denied\n\n\
                 Suggestions:\n\
                 - Add your user to the kvm group: sudo usermod -aG kvm $USER\n\
                 - Log out and back in for the group change to apply",
                KVM_DEVICE
            )))
        }
        Err(e) => Err(KubeliteError::Unsupported(format!(
            "{} exists but couldn't be opened: {}",
            KVM_DEVICE, e
        ))),
    }
}

#[cfg(target_os = "macos")]
fn check_macos_hypervisor() -> KubeliteResult<VirtualizationSupport> {
    let output = std::process::Command::new("sysctl")
        .arg("kern.hv_support")
        .output()
        .map_err(|e| {
            KubeliteError::Unsupported(format!("failed to query kern.hv_support: {}", e))
        })?;

    // "kern.hv_support: 1"
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = stdout.split(':').nth(1).map(|s| s.trim()).unwrap_or("0");

    if output.status.success() && value == "1" {
        Ok(VirtualizationSupport {
            reason: "Hypervisor.framework is available".to_string(),
        })
    } else {
        Err(KubeliteError::Unsupported(
            "Hypervisor.framework is not available\n\n\
             Suggestions:\n\
             - Check manually: sysctl kern.hv_support\n\
             - Ensure virtualization is enabled for this machine"
                .to_string(),
        ))
    }
}
