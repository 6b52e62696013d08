//! Integration tests for the orchestration sequencer.

use kubelite::bootstrap::new_bootstrapper;
use kubelite::driver::VirtualizationSupport;
use kubelite::{
    BootstrapperKind, Cluster, ClusterLifecycleState, ClusterOptions, DriverKind, KubeliteError,
    KubeliteResult, MachineState,
};
use kubelite_shared::SetupStep;
use kubelite_test_utils::{FakePuller, RecordingRunner, ScriptedDriver, TestHome};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST FIXTURES
// ============================================================================

struct TestContext {
    home: TestHome,
    runner: RecordingRunner,
    driver: ScriptedDriver,
    puller: FakePuller,
    options: ClusterOptions,
}

impl TestContext {
    fn new() -> Self {
        Self::with_home(TestHome::new().with_localkube_build())
    }

    fn with_home(home: TestHome) -> Self {
        let runner = RecordingRunner::new();
        Self {
            home,
            driver: ScriptedDriver::new(runner.clone()),
            runner,
            puller: FakePuller::new(),
            options: ClusterOptions::default(),
        }
    }

    fn cluster(&self) -> Cluster {
        let bootstrapper = new_bootstrapper(
            self.options.bootstrapper,
            Arc::new(self.runner.clone()),
            &self.home.layout,
            self.options.addons.clone(),
        );
        Cluster::with_parts(
            self.options.clone(),
            self.home.layout.clone(),
            Box::new(self.driver.clone()),
            bootstrapper,
            Arc::new(self.puller.clone()),
        )
        .with_retry_delay(Duration::ZERO)
    }

    async fn setup_and_start(&self) -> Result<(), KubeliteError> {
        self.cluster()
            .setup_and_start(&self.options.machine, &self.options.kubernetes)
            .await
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.runner.commands().iter().position(|c| c.contains(needle))
    }
}

fn virtualization_available() -> KubeliteResult<VirtualizationSupport> {
    Ok(VirtualizationSupport {
        reason: "test host".into(),
    })
}

fn virtualization_missing() -> KubeliteResult<VirtualizationSupport> {
    Err(KubeliteError::Unsupported("/dev/kvm does not exist".into()))
}

/// A hypervisor-backed machine booting from a local ISO.
fn kvm_context() -> TestContext {
    let mut ctx = TestContext::new();
    ctx.driver = ScriptedDriver::with_kind(DriverKind::Kvm, ctx.runner.clone());
    let iso = ctx.home.layout.iso_cache_dir().join("boot.iso");
    std::fs::create_dir_all(iso.parent().unwrap()).unwrap();
    std::fs::write(&iso, b"iso").unwrap();
    ctx.options.machine.iso_url = format!("file://{}", iso.display());
    ctx
}

fn kubeadm_home() -> TestHome {
    let home = TestHome::new();
    let bin = home.layout.kubeadm_bin_dir();
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("kubelet"), b"kubelet").unwrap();
    std::fs::write(bin.join("kubeadm"), b"kubeadm").unwrap();
    std::fs::create_dir_all(home.layout.deploy_dir()).unwrap();
    home
}

// ============================================================================
// SETUP AND START
// ============================================================================

#[tokio::test]
async fn localkube_setup_runs_every_step_in_order() {
    let ctx = TestContext::new();

    ctx.setup_and_start().await.unwrap();

    assert_eq!(ctx.driver.calls(), vec!["state", "pre_create_check", "create"]);

    for name in ["ca.crt", "ca.key", "apiserver.crt", "apiserver.key"] {
        let staged = format!("/var/lib/localkube/certs/{}.staged", name);
        assert!(ctx.runner.file(&staged).is_some(), "{} not staged", name);
    }
    assert_eq!(
        ctx.runner
            .file("/var/lib/localkube/certs/apiserver.key.staged")
            .unwrap()
            .permissions,
        "0600"
    );

    let binary = ctx.runner.file("/usr/local/bin/localkube").unwrap();
    assert_eq!(binary.permissions, "0777");

    let install = ctx.position("sudo mv -f").expect("certs installed");
    let start = ctx
        .position("systemctl restart localkube.service")
        .expect("localkube started");
    assert!(install < start);

    let script = &ctx.runner.commands()[start];
    assert!(script.contains("--node-ip=192.168.99.100"));
}

#[tokio::test]
async fn update_failure_stops_before_start() {
    // No localkube build in this home.
    let ctx = TestContext::with_home(TestHome::new());

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::UpdateCluster));
    match err {
        KubeliteError::Step { source, .. } => {
            assert!(matches!(*source, KubeliteError::AssetNotFound(_)));
        }
        other => panic!("expected step error, got {:?}", other),
    }
    assert!(ctx.position("localkube.service").is_none());
}

#[tokio::test]
async fn cert_failure_stops_before_update() {
    let ctx = TestContext::new();
    ctx.runner.fail_copy("apiserver.key");

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::SetupCerts));
    assert!(ctx.position("sudo rm -f").is_some());
    assert!(ctx.position("sudo mv -f").is_none());
    assert!(ctx.runner.file("/usr/local/bin/localkube").is_none());
}

#[tokio::test]
async fn requested_addon_without_manifests_fails_update() {
    let mut ctx = TestContext::new();
    ctx.options.addons.insert("heapster".into(), true);

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::UpdateCluster));
    match err {
        KubeliteError::Step { source, .. } => match *source {
            KubeliteError::AssetNotFound(path) => {
                assert!(path.ends_with("heapster/influxGrafana-rc.yaml"));
            }
            other => panic!("expected AssetNotFound, got {:?}", other),
        },
        other => panic!("expected step error, got {:?}", other),
    }
    assert!(ctx.position("localkube.service").is_none());
}

#[tokio::test]
async fn requested_addon_is_transferred() {
    let mut ctx = TestContext::new();
    let registry = ctx.home.layout.deploy_dir().join("addons/registry-creds");
    std::fs::create_dir_all(&registry).unwrap();
    std::fs::write(registry.join("registry-creds-rc.yaml"), b"kind: ReplicationController").unwrap();
    ctx.options.addons.insert("registry-creds".into(), true);

    ctx.setup_and_start().await.unwrap();

    let manifest = ctx
        .runner
        .file("/etc/kubernetes/addons/registry-creds-rc.yaml")
        .expect("addon transferred");
    assert_eq!(manifest.permissions, "0640");
}

#[tokio::test]
async fn images_are_loaded_before_the_control_plane_is_updated() {
    let mut ctx = TestContext::new();
    ctx.options.cache_images = true;
    ctx.options.images = vec!["repo/a:1".into(), "repo/b:2".into()];

    ctx.setup_and_start().await.unwrap();

    let copies = ctx.runner.copies();
    let binary = copies
        .iter()
        .position(|c| c == "/usr/local/bin/localkube")
        .unwrap();
    for archive in ["/tmp/repo/a_1", "/tmp/repo/b_2"] {
        let index = copies.iter().position(|c| c == archive).unwrap();
        assert!(index < binary);
    }
}

#[tokio::test]
async fn image_failure_aborts_in_cache_step() {
    let mut ctx = TestContext::new();
    ctx.options.cache_images = true;
    ctx.options.images = vec!["repo/a:1".into(), "repo/b:2".into()];
    ctx.puller.fail_on("repo/b:2", "not found");

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::CacheImages));
    assert!(ctx.runner.file("/tmp/repo/a_1").is_some());
    assert!(ctx.runner.file("/usr/local/bin/localkube").is_none());
}

#[tokio::test]
async fn second_run_reuses_machine_and_image_cache() {
    let mut ctx = TestContext::new();
    ctx.options.cache_images = true;
    ctx.options.images = vec!["repo/a:1".into(), "repo/b:2".into()];

    ctx.setup_and_start().await.unwrap();
    ctx.setup_and_start().await.unwrap();

    assert_eq!(ctx.driver.count("create"), 1);
    assert_eq!(ctx.puller.pulls().len(), 2);
    let loads = ctx
        .runner
        .commands()
        .iter()
        .filter(|c| c.starts_with("docker load"))
        .count();
    assert_eq!(loads, 4);
}

#[tokio::test]
async fn engine_options_install_docker_dropin() {
    let mut ctx = TestContext::new();
    ctx.options.machine.insecure_registry = vec!["10.0.0.0/24".into()];

    ctx.cluster().provision(&ctx.options.machine).await.unwrap();

    let dropin = ctx
        .runner
        .file("/etc/systemd/system/docker.service.d/10-machine.conf")
        .unwrap();
    assert!(String::from_utf8(dropin.content)
        .unwrap()
        .contains("--insecure-registry 10.0.0.0/24"));
    assert!(ctx.position("sudo systemctl restart docker").is_some());
}

// ============================================================================
// KUBEADM
// ============================================================================

#[tokio::test]
async fn kubeadm_installs_kubelet_then_inits() {
    let mut ctx = TestContext::with_home(kubeadm_home());
    ctx.options.bootstrapper = BootstrapperKind::Kubeadm;
    ctx.options.kubernetes.extra_options = vec!["kubelet.max-pods=5".parse().unwrap()];

    ctx.setup_and_start().await.unwrap();

    assert_eq!(ctx.runner.file("/kubeadm/kubeadm").unwrap().permissions, "0641");
    let dropin = ctx.runner.file("/kubeadm/10-kubeadm.conf").unwrap();
    assert!(String::from_utf8(dropin.content).unwrap().contains("--max-pods=5"));

    let steps = [
        "sudo cp /kubeadm/kubelet /usr/bin/kubelet",
        "sudo cp /kubeadm/kubeadm /usr/bin/kubeadm",
        "sudo cp /kubeadm/kubelet.service",
        "sudo mkdir -p /etc/systemd/system/kubelet.service.d",
        "sudo cp /kubeadm/10-kubeadm.conf",
        "sudo systemctl daemon-reload",
        "sudo systemctl enable kubelet",
        "sudo systemctl start kubelet",
        "kubeadm init",
    ];
    let positions: Vec<_> = steps
        .iter()
        .map(|s| ctx.position(s).unwrap_or_else(|| panic!("missing {}", s)))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);

    let init = &ctx.runner.commands()[positions[8]];
    assert_eq!(
        init,
        "sudo /usr/bin/kubeadm init --cert-dir /var/lib/localkube/certs/ \
         --service-cidr 10.0.0.0/24 --apiserver-advertise-address 192.168.99.100 \
         --apiserver-bind-port 8443"
    );
}

#[tokio::test]
async fn kubeadm_restart_reissues_client_certs() {
    let mut ctx = TestContext::with_home(kubeadm_home());
    ctx.options.bootstrapper = BootstrapperKind::Kubeadm;
    ctx.driver.set_state(MachineState::Stopped);
    ctx.runner.respond("test -f /etc/kubernetes/admin.conf", "Initialized\n");

    ctx.setup_and_start().await.unwrap();

    assert!(ctx.driver.calls().contains(&"start"));
    assert!(ctx.position("kubeadm init").is_none());
    let issue = ctx.position("client-certs").expect("client certs issued");
    for file in [
        "admin.conf",
        "controller-manager.conf",
        "kubelet.conf",
        "scheduler.conf",
    ] {
        let cp = ctx
            .position(&format!("sudo cp /tmp/cert.conf /etc/kubernetes/{}", file))
            .unwrap();
        assert!(issue < cp);
    }
}

#[tokio::test]
async fn kubeadm_retry_after_failed_update_runs_init() {
    let mut ctx = TestContext::with_home(kubeadm_home());
    ctx.options.bootstrapper = BootstrapperKind::Kubeadm;
    ctx.runner.fail("systemctl daemon-reload", 1, "failed");

    let err = ctx.setup_and_start().await.unwrap_err();
    assert_eq!(err.step(), Some(SetupStep::UpdateCluster));

    // The machine now exists but kubeadm init never ran on it.
    ctx.runner.clear_rules();
    ctx.runner.respond("test -f /etc/kubernetes/admin.conf", "Uninitialized\n");
    ctx.setup_and_start().await.unwrap();

    assert_eq!(ctx.driver.count("create"), 1);
    let check = ctx
        .position("test -f /etc/kubernetes/admin.conf")
        .expect("init state checked");
    let init = ctx.position("kubeadm init").expect("kubeadm init ran");
    assert!(check < init);
    assert!(ctx.position("client-certs").is_none());
}

#[tokio::test]
async fn unreachable_init_check_is_a_start_step_error() {
    let mut ctx = TestContext::with_home(kubeadm_home());
    ctx.options.bootstrapper = BootstrapperKind::Kubeadm;
    ctx.driver.set_state(MachineState::Running);
    ctx.runner.unreachable("test -f /etc/kubernetes/admin.conf");

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::StartCluster));
    assert!(ctx.position("kubeadm init").is_none());
}

#[tokio::test]
async fn kubeadm_stops_at_first_failed_install_command() {
    let mut ctx = TestContext::with_home(kubeadm_home());
    ctx.options.bootstrapper = BootstrapperKind::Kubeadm;
    ctx.runner.fail("systemctl daemon-reload", 1, "failed");

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::UpdateCluster));
    assert!(ctx.position("systemctl enable kubelet").is_none());
    assert!(ctx.position("kubeadm init").is_none());
}

// ============================================================================
// PROVISIONING
// ============================================================================

#[tokio::test]
async fn provision_gives_up_after_three_attempts() {
    let ctx = TestContext::new();
    ctx.driver.fail_creates(10);

    let err = ctx.cluster().provision(&ctx.options.machine).await.unwrap_err();

    assert_eq!(ctx.driver.count("create"), 3);
    match err {
        KubeliteError::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, KubeliteError::Driver(_)));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn provision_succeeds_on_last_attempt() {
    let ctx = TestContext::new();
    ctx.driver.fail_creates(2);

    ctx.cluster().provision(&ctx.options.machine).await.unwrap();

    assert_eq!(ctx.driver.count("create"), 3);
    assert_eq!(ctx.driver.machine_state(), MachineState::Running);
}

#[tokio::test]
async fn provision_failure_is_reported_as_provision_step() {
    let ctx = TestContext::new();
    ctx.driver.fail_creates(10);

    let err = ctx.setup_and_start().await.unwrap_err();

    assert_eq!(err.step(), Some(SetupStep::Provision));
    assert!(ctx.runner.commands().is_empty());
}

#[tokio::test]
async fn creation_is_retried_without_delay_by_default() {
    let ctx = TestContext::new();
    ctx.driver.fail_creates(2);
    let cluster = Cluster::with_parts(
        ctx.options.clone(),
        ctx.home.layout.clone(),
        Box::new(ctx.driver.clone()),
        new_bootstrapper(
            ctx.options.bootstrapper,
            Arc::new(ctx.runner.clone()),
            &ctx.home.layout,
            ctx.options.addons.clone(),
        ),
        Arc::new(ctx.puller.clone()),
    );

    tokio::time::timeout(Duration::from_secs(1), cluster.provision(&ctx.options.machine))
        .await
        .expect("retries should not wait")
        .unwrap();
    assert_eq!(ctx.driver.count("create"), 3);
}

#[tokio::test]
async fn hypervisor_driver_checks_host_then_creates() {
    let ctx = kvm_context();

    ctx.cluster()
        .with_virtualization_check(virtualization_available)
        .provision(&ctx.options.machine)
        .await
        .unwrap();

    assert_eq!(ctx.driver.calls(), vec!["state", "pre_create_check", "create"]);
}

#[tokio::test]
async fn hypervisor_driver_without_virtualization_never_creates() {
    let ctx = kvm_context();

    let err = ctx
        .cluster()
        .with_virtualization_check(virtualization_missing)
        .provision(&ctx.options.machine)
        .await
        .unwrap_err();

    match err {
        KubeliteError::RetryExhausted { source, .. } => {
            assert!(matches!(*source, KubeliteError::Unsupported(_)));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    assert_eq!(ctx.driver.count("pre_create_check"), 0);
    assert_eq!(ctx.driver.count("create"), 0);
}

#[tokio::test]
async fn missing_iso_fails_before_the_machine_is_touched() {
    let mut ctx = kvm_context();
    ctx.options.machine.iso_url = "file:///nonexistent/kubelite.iso".into();

    let err = ctx
        .cluster()
        .with_virtualization_check(virtualization_available)
        .provision(&ctx.options.machine)
        .await
        .unwrap_err();

    match err {
        KubeliteError::RetryExhausted { source, .. } => {
            assert!(matches!(*source, KubeliteError::AssetNotFound(_)));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    assert!(ctx.driver.calls().is_empty());
}

#[tokio::test]
async fn generic_driver_ignores_the_iso() {
    let mut ctx = TestContext::new();
    ctx.options.machine.iso_url = "file:///nonexistent/kubelite.iso".into();

    ctx.cluster().provision(&ctx.options.machine).await.unwrap();

    assert_eq!(ctx.driver.count("create"), 1);
}

#[rstest]
#[case(MachineState::Stopped)]
#[case(MachineState::Saved)]
#[case(MachineState::Paused)]
#[tokio::test]
async fn provision_starts_existing_machine(#[case] state: MachineState) {
    let ctx = TestContext::new();
    ctx.driver.set_state(state);

    ctx.cluster().provision(&ctx.options.machine).await.unwrap();

    assert_eq!(ctx.driver.calls(), vec!["state", "start"]);
}

#[tokio::test]
async fn provision_leaves_running_machine_alone() {
    let ctx = TestContext::new();
    ctx.driver.set_state(MachineState::Running);

    ctx.cluster().provision(&ctx.options.machine).await.unwrap();

    assert_eq!(ctx.driver.calls(), vec!["state"]);
}

// ============================================================================
// STATUS, LOGS, STOP, DELETE
// ============================================================================

#[rstest]
#[case(MachineState::None, ClusterLifecycleState::NotCreated)]
#[case(MachineState::Stopped, ClusterLifecycleState::Stopped)]
#[case(MachineState::Saved, ClusterLifecycleState::Stopped)]
#[case(MachineState::Paused, ClusterLifecycleState::Stopped)]
#[case(MachineState::Error, ClusterLifecycleState::Error)]
#[tokio::test]
async fn status_from_machine_state(
    #[case] machine: MachineState,
    #[case] expected: ClusterLifecycleState,
) {
    let ctx = TestContext::new();
    ctx.driver.set_state(machine);
    assert_eq!(ctx.cluster().status().await.unwrap(), expected);
}

#[tokio::test]
async fn status_of_running_machine_asks_the_control_plane() {
    let ctx = TestContext::new();
    let cluster = ctx.cluster();
    ctx.driver.set_state(MachineState::Running);

    ctx.runner.respond("is-active localkube", "Running\n");
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::Running);

    ctx.runner.clear_rules();
    ctx.runner.respond("is-active localkube", "Stopped\n");
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::Created);

    ctx.setup_and_start().await.unwrap();
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::Provisioned);

    ctx.runner.clear_rules();
    ctx.runner.unreachable("is-active localkube");
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::Error);
}

#[tokio::test]
async fn status_rejects_unrecognized_probe_output() {
    let ctx = TestContext::new();
    ctx.driver.set_state(MachineState::Running);
    ctx.runner.respond("is-active localkube", "activating");

    let err = ctx.cluster().status().await.unwrap_err();

    match err {
        KubeliteError::UnrecognizedOutput { command, output } => {
            assert!(command.contains("systemctl is-active localkube"));
            assert_eq!(output, "activating");
        }
        other => panic!("expected UnrecognizedOutput, got {:?}", other),
    }
}

#[tokio::test]
async fn logs_follow_streams_interactively() {
    let ctx = TestContext::new();
    ctx.runner.respond("journalctl -u localkube", "line 1\nline 2\n");
    let cluster = ctx.cluster();

    assert_eq!(cluster.logs(false).await.unwrap(), "line 1\nline 2\n");
    assert_eq!(cluster.logs(true).await.unwrap(), "");
    assert_eq!(
        ctx.runner.interactive_commands(),
        vec!["sudo journalctl -u localkube -f"]
    );
}

#[tokio::test]
async fn stop_then_delete() {
    let ctx = TestContext::new();
    let cluster = ctx.cluster();
    ctx.setup_and_start().await.unwrap();

    let machine_dir = ctx.home.layout.machine_dir("kubelite");
    std::fs::create_dir_all(&machine_dir).unwrap();

    cluster.stop().await.unwrap();
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::Stopped);

    cluster.delete().await.unwrap();
    assert_eq!(cluster.status().await.unwrap(), ClusterLifecycleState::NotCreated);
    assert!(!machine_dir.exists());
}

// ============================================================================
// DOCKER ENV AND SSH
// ============================================================================

#[tokio::test]
async fn docker_env_points_at_the_machine_engine() {
    let ctx = TestContext::new();
    let cluster = ctx.cluster();
    cluster.provision(&ctx.options.machine).await.unwrap();

    let env = cluster.docker_env().await.unwrap();

    assert_eq!(env["DOCKER_HOST"], "tcp://192.168.99.100:2376");
    assert_eq!(env["DOCKER_TLS_VERIFY"], "1");
    assert_eq!(
        env["DOCKER_CERT_PATH"],
        ctx.home.layout.certs_dir().display().to_string()
    );
}

#[tokio::test]
async fn docker_env_requires_a_machine() {
    let ctx = TestContext::new();

    let err = ctx.cluster().docker_env().await.unwrap_err();

    assert!(matches!(err, KubeliteError::Driver(_)));
}

#[tokio::test]
async fn ssh_runs_the_command_interactively() {
    let ctx = TestContext::new();
    ctx.driver.set_state(MachineState::Running);

    ctx.cluster()
        .ssh_shell(&["uname".to_string(), "-a".to_string()])
        .await
        .unwrap();

    assert_eq!(ctx.runner.interactive_commands(), vec!["uname -a"]);
}

#[rstest]
#[case(MachineState::None)]
#[case(MachineState::Stopped)]
#[case(MachineState::Paused)]
#[tokio::test]
async fn ssh_refuses_a_machine_that_is_not_running(#[case] state: MachineState) {
    let ctx = TestContext::new();
    ctx.driver.set_state(state);

    let err = ctx.cluster().ssh_shell(&[]).await.unwrap_err();

    assert!(matches!(err, KubeliteError::Driver(_)));
    assert!(ctx.runner.interactive_commands().is_empty());
}

#[tokio::test]
async fn none_driver_has_no_ssh_or_docker_env() {
    let mut ctx = TestContext::new();
    ctx.driver = ScriptedDriver::with_kind(DriverKind::None, ctx.runner.clone());
    ctx.driver.set_state(MachineState::Running);
    let cluster = ctx.cluster();

    assert!(matches!(
        cluster.ssh_shell(&[]).await,
        Err(KubeliteError::Unsupported(_))
    ));
    assert!(matches!(
        cluster.docker_env().await,
        Err(KubeliteError::Unsupported(_))
    ));
}
