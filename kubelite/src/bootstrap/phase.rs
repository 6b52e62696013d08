//! Bootstrap phase tracking.
//!
//! ```text
//! Uninitialized ──update──→ Updated ──start──→ Running
//!                             ↑ ↺update          │ ↺start/restart
//!                             └──────update──────┘
//! ```

use super::{Bootstrapper, ClusterStatus, KubernetesConfig};
use async_trait::async_trait;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Nothing has been placed on the machine by this process.
    Uninitialized,
    /// Binaries and manifests are in place.
    Updated,
    /// The control plane was started.
    Running,
}

impl BootstrapPhase {
    pub fn can_transition_to(&self, target: BootstrapPhase) -> bool {
        use BootstrapPhase::*;
        matches!(
            (self, target),
            (Uninitialized, Updated)
                | (Updated, Updated)
                | (Updated, Running)
                | (Running, Running)
                | (Running, Updated)
        )
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapPhase::Uninitialized => "uninitialized",
            BootstrapPhase::Updated => "updated",
            BootstrapPhase::Running => "running",
        };
        f.write_str(name)
    }
}

/// Enforces phase order around a bootstrapper strategy.
///
/// The phase only advances when the wrapped call succeeds.
pub struct PhasedBootstrapper {
    inner: Box<dyn Bootstrapper>,
    phase: Mutex<BootstrapPhase>,
}

impl PhasedBootstrapper {
    pub fn new(inner: Box<dyn Bootstrapper>) -> Self {
        Self {
            inner,
            phase: Mutex::new(BootstrapPhase::Uninitialized),
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.lock()
    }

    fn check(&self, operation: &str, target: BootstrapPhase) -> KubeliteResult<()> {
        let current = self.phase();
        if current.can_transition_to(target) {
            Ok(())
        } else {
            Err(KubeliteError::Config(format!(
                "cannot {} cluster while bootstrap is {}",
                operation, current
            )))
        }
    }

    fn advance(&self, target: BootstrapPhase) {
        let mut phase = self.phase.lock();
        let previous = *phase;
        tracing::debug!(from = %previous, to = %target, "Bootstrap phase change");
        *phase = target;
    }
}

#[async_trait]
impl Bootstrapper for PhasedBootstrapper {
    async fn update_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        self.check("update", BootstrapPhase::Updated)?;
        self.inner.update_cluster(config).await?;
        self.advance(BootstrapPhase::Updated);
        Ok(())
    }

    async fn start_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        self.check("start", BootstrapPhase::Running)?;
        self.inner.start_cluster(config).await?;
        self.advance(BootstrapPhase::Running);
        Ok(())
    }

    async fn restart_cluster(&self, config: &KubernetesConfig) -> KubeliteResult<()> {
        self.check("restart", BootstrapPhase::Running)?;
        self.inner.restart_cluster(config).await?;
        self.advance(BootstrapPhase::Running);
        Ok(())
    }

    async fn control_plane_initialized(&self) -> KubeliteResult<bool> {
        self.inner.control_plane_initialized().await
    }

    async fn cluster_status(&self) -> KubeliteResult<ClusterStatus> {
        self.inner.cluster_status().await
    }

    async fn cluster_logs(&self, follow: bool) -> KubeliteResult<String> {
        self.inner.cluster_logs(follow).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBootstrapper {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl CountingBootstrapper {
        fn outcome(&self) -> KubeliteResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(KubeliteError::Internal("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Bootstrapper for CountingBootstrapper {
        async fn update_cluster(&self, _: &KubernetesConfig) -> KubeliteResult<()> {
            self.outcome()
        }
        async fn start_cluster(&self, _: &KubernetesConfig) -> KubeliteResult<()> {
            self.outcome()
        }
        async fn restart_cluster(&self, _: &KubernetesConfig) -> KubeliteResult<()> {
            self.outcome()
        }
        async fn cluster_status(&self) -> KubeliteResult<ClusterStatus> {
            Ok(ClusterStatus::Running)
        }
        async fn cluster_logs(&self, _: bool) -> KubeliteResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_transitions() {
        use BootstrapPhase::*;
        assert!(Uninitialized.can_transition_to(Updated));
        assert!(!Uninitialized.can_transition_to(Running));
        assert!(Updated.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Updated));
        assert!(!Updated.can_transition_to(Uninitialized));
        assert!(!Running.can_transition_to(Uninitialized));
    }

    #[tokio::test]
    async fn test_start_before_update_is_rejected() {
        let phased = PhasedBootstrapper::new(Box::new(CountingBootstrapper::default()));
        let err = phased
            .start_cluster(&KubernetesConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeliteError::Config(_)));
        assert_eq!(phased.phase(), BootstrapPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_restart_before_update_is_rejected() {
        let phased = PhasedBootstrapper::new(Box::new(CountingBootstrapper::default()));
        assert!(phased
            .restart_cluster(&KubernetesConfig::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_then_start() {
        let phased = PhasedBootstrapper::new(Box::new(CountingBootstrapper::default()));
        let config = KubernetesConfig::default();
        phased.update_cluster(&config).await.unwrap();
        assert_eq!(phased.phase(), BootstrapPhase::Updated);
        phased.start_cluster(&config).await.unwrap();
        assert_eq!(phased.phase(), BootstrapPhase::Running);
        phased.restart_cluster(&config).await.unwrap();
        assert_eq!(phased.phase(), BootstrapPhase::Running);
    }

    #[tokio::test]
    async fn test_failure_keeps_phase() {
        let inner = CountingBootstrapper::default();
        inner.fail.store(true, Ordering::SeqCst);
        let phased = PhasedBootstrapper::new(Box::new(inner));

        assert!(phased
            .update_cluster(&KubernetesConfig::default())
            .await
            .is_err());
        assert_eq!(phased.phase(), BootstrapPhase::Uninitialized);
    }
}
