use crate::RecordingRunner;
use async_trait::async_trait;
use kubelite::driver::{Driver, DriverKind, MachineState};
use kubelite::portal::CommandRunner;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

struct State {
    kind: DriverKind,
    machine: Mutex<MachineState>,
    ip: IpAddr,
    create_failures: Mutex<u32>,
    calls: Mutex<Vec<&'static str>>,
}

/// Driver whose machine state lives in memory. Clones share that state, so a
/// test can keep one handle after giving another to a `Cluster`.
#[derive(Clone)]
pub struct ScriptedDriver {
    state: Arc<State>,
    runner: RecordingRunner,
}

impl ScriptedDriver {
    pub fn new(runner: RecordingRunner) -> Self {
        Self::with_kind(DriverKind::Generic, runner)
    }

    pub fn with_kind(kind: DriverKind, runner: RecordingRunner) -> Self {
        Self {
            state: Arc::new(State {
                kind,
                machine: Mutex::new(MachineState::None),
                ip: IpAddr::V4(Ipv4Addr::new(192, 168, 99, 100)),
                create_failures: Mutex::new(0),
                calls: Mutex::new(Vec::new()),
            }),
            runner,
        }
    }

    /// Make the next `count` calls to `create` fail.
    pub fn fail_creates(&self, count: u32) {
        *self.state.create_failures.lock() = count;
    }

    pub fn set_state(&self, state: MachineState) {
        *self.state.machine.lock() = state;
    }

    pub fn machine_state(&self) -> MachineState {
        *self.state.machine.lock()
    }

    /// Driver operations in call order, e.g. `["state", "pre_create_check", "create"]`.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.calls.lock().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) {
        self.state.calls.lock().push(call);
    }

    fn transition(&self, call: &'static str, to: MachineState) -> KubeliteResult<()> {
        self.record(call);
        *self.state.machine.lock() = to;
        Ok(())
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> DriverKind {
        self.state.kind
    }

    async fn pre_create_check(&self) -> KubeliteResult<()> {
        self.record("pre_create_check");
        Ok(())
    }

    async fn create(&self) -> KubeliteResult<()> {
        self.record("create");
        let mut remaining = self.state.create_failures.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(KubeliteError::Driver("scripted create failure".into()));
        }
        *self.state.machine.lock() = MachineState::Running;
        Ok(())
    }

    async fn state(&self) -> KubeliteResult<MachineState> {
        self.record("state");
        Ok(self.machine_state())
    }

    async fn ip(&self) -> KubeliteResult<IpAddr> {
        Ok(self.state.ip)
    }

    async fn start(&self) -> KubeliteResult<()> {
        self.transition("start", MachineState::Running)
    }

    async fn stop(&self) -> KubeliteResult<()> {
        self.transition("stop", MachineState::Stopped)
    }

    async fn restart(&self) -> KubeliteResult<()> {
        self.transition("restart", MachineState::Running)
    }

    async fn remove(&self) -> KubeliteResult<()> {
        self.transition("remove", MachineState::None)
    }

    async fn kill(&self) -> KubeliteResult<()> {
        self.transition("kill", MachineState::Stopped)
    }

    fn command_runner(&self) -> KubeliteResult<Arc<dyn CommandRunner>> {
        Ok(Arc::new(self.runner.clone()))
    }
}
