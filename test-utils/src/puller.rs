use async_trait::async_trait;
use kubelite::images::ImagePuller;
use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Default)]
struct State {
    failures: Mutex<HashMap<String, String>>,
    pulls: Mutex<Vec<String>>,
}

/// Writes `archive:<reference>` instead of talking to a registry.
#[derive(Clone, Default)]
pub struct FakePuller {
    state: Arc<State>,
}

impl FakePuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulling `image` fails with `message`.
    pub fn fail_on(&self, image: &str, message: &str) -> &Self {
        self.state
            .failures
            .lock()
            .insert(image.to_string(), message.to_string());
        self
    }

    /// References pulled so far, in completion order.
    pub fn pulls(&self) -> Vec<String> {
        self.state.pulls.lock().clone()
    }

    pub fn archive_content(reference: &str) -> Vec<u8> {
        format!("archive:{}", reference).into_bytes()
    }
}

#[async_trait]
impl ImagePuller for FakePuller {
    async fn pull(&self, reference: &str, destination: &Path) -> KubeliteResult<()> {
        let failure = self.state.failures.lock().get(reference).cloned();
        if let Some(message) = failure {
            return Err(KubeliteError::Download(format!("{}: {}", reference, message)));
        }
        tokio::fs::write(destination, Self::archive_content(reference)).await?;
        self.state.pulls.lock().push(reference.to_string());
        Ok(())
    }
}
