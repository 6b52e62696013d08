use async_trait::async_trait;
use kubelite::assets::Asset;
use kubelite::portal::CommandRunner;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFile {
    pub content: Vec<u8>,
    pub permissions: String,
}

#[derive(Clone)]
enum Rule {
    Output(String),
    Fail { exit_code: i32, output: String },
    Unreachable,
}

#[derive(Default)]
struct State {
    commands: Mutex<Vec<String>>,
    interactive: Mutex<Vec<String>>,
    copies: Mutex<Vec<String>>,
    files: Mutex<BTreeMap<String, RecordedFile>>,
    rules: Mutex<Vec<(String, Rule)>>,
    copy_failures: Mutex<Vec<String>>,
    sessions: AtomicUsize,
}

/// In-memory machine: records every command and copy, answers commands from
/// substring rules. Sessions share state with the runner they came from.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    state: Arc<State>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` print `output`.
    pub fn respond(&self, pattern: &str, output: &str) -> &Self {
        self.push_rule(pattern, Rule::Output(output.to_string()))
    }

    /// Commands containing `pattern` exit with `exit_code`.
    pub fn fail(&self, pattern: &str, exit_code: i32, output: &str) -> &Self {
        self.push_rule(
            pattern,
            Rule::Fail {
                exit_code,
                output: output.to_string(),
            },
        )
    }

    /// Commands containing `pattern` cannot reach the machine.
    pub fn unreachable(&self, pattern: &str) -> &Self {
        self.push_rule(pattern, Rule::Unreachable)
    }

    /// Copies whose target path contains `pattern` fail.
    pub fn fail_copy(&self, pattern: &str) -> &Self {
        self.state.copy_failures.lock().push(pattern.to_string());
        self
    }

    /// Drop every rule added so far.
    pub fn clear_rules(&self) {
        self.state.rules.lock().clear();
        self.state.copy_failures.lock().clear();
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().clone()
    }

    pub fn interactive_commands(&self) -> Vec<String> {
        self.state.interactive.lock().clone()
    }

    /// Target paths in the order they were copied, repeats included.
    pub fn copies(&self) -> Vec<String> {
        self.state.copies.lock().clone()
    }

    /// Current content at `target`, as left by the last copy.
    pub fn file(&self, target: &str) -> Option<RecordedFile> {
        self.state.files.lock().get(target).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, RecordedFile> {
        self.state.files.lock().clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    fn push_rule(&self, pattern: &str, rule: Rule) -> &Self {
        self.state.rules.lock().push((pattern.to_string(), rule));
        self
    }

    fn rule_for(&self, cmd: &str) -> Option<Rule> {
        self.state
            .rules
            .lock()
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, rule)| rule.clone())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &str) -> KubeliteResult<String> {
        self.state.commands.lock().push(cmd.to_string());
        match self.rule_for(cmd) {
            None => Ok(String::new()),
            Some(Rule::Output(output)) => Ok(output),
            Some(Rule::Fail { exit_code, output }) => Err(KubeliteError::RemoteCommand {
                command: cmd.to_string(),
                exit_code: Some(exit_code),
                output,
            }),
            Some(Rule::Unreachable) => {
                Err(KubeliteError::Connectivity("machine unreachable".into()))
            }
        }
    }

    async fn run_interactive(&self, cmd: &str) -> KubeliteResult<()> {
        self.state.interactive.lock().push(cmd.to_string());
        Ok(())
    }

    async fn copy(&self, asset: &Asset) -> KubeliteResult<()> {
        let target = asset.target_path();
        asset.mode()?;
        let content = asset.read().await?;

        let failing = self
            .state
            .copy_failures
            .lock()
            .iter()
            .any(|p| target.contains(p.as_str()));
        if failing {
            return Err(KubeliteError::RemoteCommand {
                command: format!("copy {}", target),
                exit_code: Some(1),
                output: "no space left on device".into(),
            });
        }

        self.state.copies.lock().push(target.clone());
        self.state.files.lock().insert(
            target,
            RecordedFile {
                content,
                permissions: asset.permissions().to_string(),
            },
        );
        Ok(())
    }

    fn open_session(&self) -> Arc<dyn CommandRunner> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Arc::new(self.clone())
    }
}
