//! Driver factory using the inventory pattern for compile-time registration.
//!
//! Driver implementations register themselves with `inventory::submit!`;
//! [`create_driver`] looks the factory up by [`DriverKind`].

use super::{Driver, DriverKind};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::MachineConfig;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};

pub type DriverFactoryFn = fn(&MachineConfig, &FilesystemLayout) -> KubeliteResult<Box<dyn Driver>>;

/// Registration entry submitted by driver implementations.
pub struct DriverRegistration {
    pub kind: DriverKind,
    pub factory: DriverFactoryFn,
}

inventory::collect!(DriverRegistration);

/// Build the driver registered for `kind`.
///
/// # Errors
/// `KubeliteError::Driver` listing the available drivers when `kind` has no
/// registration, or whatever the factory returns.
pub fn create_driver(
    kind: DriverKind,
    config: &MachineConfig,
    layout: &FilesystemLayout,
) -> KubeliteResult<Box<dyn Driver>> {
    for registration in inventory::iter::<DriverRegistration> {
        if registration.kind == kind {
            tracing::debug!(driver = %kind, "Creating driver instance");
            return (registration.factory)(config, layout);
        }
    }

    let available = available_drivers()
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(KubeliteError::Driver(format!(
        "driver '{}' is not available in this build. Available drivers: {}",
        kind, available
    )))
}

pub fn is_registered(kind: DriverKind) -> bool {
    inventory::iter::<DriverRegistration>().any(|r| r.kind == kind)
}

pub fn available_drivers() -> Vec<DriverKind> {
    let mut kinds: Vec<_> = inventory::iter::<DriverRegistration>()
        .map(|r| r.kind)
        .collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_drivers_registered() {
        assert!(is_registered(DriverKind::None));
        assert!(is_registered(DriverKind::Generic));
        assert_eq!(
            available_drivers(),
            vec![DriverKind::Generic, DriverKind::None]
        );
    }

    #[test]
    fn test_default_driver_is_registered() {
        assert_eq!(DriverKind::default(), DriverKind::None);
        assert!(is_registered(DriverKind::default()));
    }

    #[test]
    fn test_unregistered_driver_lists_available() {
        let dir = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(dir.path());
        let result = create_driver(DriverKind::Hyperv, &MachineConfig::default(), &layout);
        match result {
            Err(KubeliteError::Driver(msg)) => {
                assert!(msg.contains("hyperv"));
                assert!(msg.contains("generic, none"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("hyperv should not be registered"),
        }
    }

    #[test]
    fn test_create_none_driver() {
        let dir = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(dir.path());
        let driver = create_driver(DriverKind::None, &MachineConfig::default(), &layout).unwrap();
        assert_eq!(driver.kind(), DriverKind::None);
        assert_eq!(driver.name(), "kubelite");
    }
}
