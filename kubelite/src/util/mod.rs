mod download;

pub use download::download_file;

use kubelite_shared::errors::{KubeliteError, KubeliteResult};
use std::future::Future;
use std::time::Duration;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Run `operation` up to `attempts` times, waiting `delay` between attempts.
///
/// Every failed attempt is logged. When all attempts fail, the last error is
/// returned inside [`KubeliteError::RetryExhausted`].
pub async fn retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    delay: Duration,
    mut operation: F,
) -> KubeliteResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = KubeliteResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(KubeliteError::RetryExhausted {
                    attempts,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!(
                    operation = what,
                    attempt,
                    attempts,
                    error = %e,
                    "Attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Install a global subscriber writing to `non_blocking`.
///
/// A subscriber that is already installed is left in place.
pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
