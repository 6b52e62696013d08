//! Error types shared across kubelite crates.
//!
//! Errors are categorized by where they originate:
//! - Remote channel: [`KubeliteError::Connectivity`], [`KubeliteError::RemoteCommand`]
//! - Local inputs: [`KubeliteError::AssetNotFound`], [`KubeliteError::Config`]
//! - Subsystems: [`KubeliteError::ImageCache`], [`KubeliteError::Certificate`], [`KubeliteError::Driver`]
//! - Orchestration context: [`KubeliteError::Step`], [`KubeliteError::RetryExhausted`]

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout kubelite.
pub type KubeliteResult<T> = Result<T, KubeliteError>;

// ============================================================================
// Top-Level Error
// ============================================================================

#[derive(Debug, Error)]
pub enum KubeliteError {
    /// Remote channel could not be established (unreachable host, auth failure).
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// Remote command ran but exited non-zero.
    #[error("command `{command}` failed{}: {output}", exit_suffix(.exit_code))]
    RemoteCommand {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// Local source of an asset is missing at transfer time.
    #[error("asset source not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    /// One or more images failed to cache or load. Every failure is kept.
    #[error("caching images: {}", summarize_failures(.failures))]
    ImageCache { failures: Vec<ImageFailure> },

    /// Certificate generation or distribution failed.
    #[error("certificates: {0}")]
    Certificate(String),

    /// A status-style command printed something outside its known set.
    #[error("unrecognized output from `{command}`: {output:?}")]
    UnrecognizedOutput { command: String, output: String },

    /// Virtual machine driver operation failed or the driver is unavailable.
    #[error("driver: {0}")]
    Driver(String),

    /// Invalid configuration or an operation requested in the wrong state.
    #[error("config: {0}")]
    Config(String),

    /// Operation not supported by this driver or platform.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Local filesystem state (cache, certs, layout) could not be read or written.
    #[error("storage: {0}")]
    Storage(String),

    /// Fetching a file over HTTP failed.
    #[error("download: {0}")]
    Download(String),

    /// Rendering a command or unit template failed.
    #[error("template: {0}")]
    Template(String),

    /// An orchestration step failed; `source` is the step's own error.
    #[error("{step}: {source}")]
    Step {
        step: SetupStep,
        #[source]
        source: Box<KubeliteError>,
    },

    /// A retried operation failed on every attempt.
    #[error("giving up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<KubeliteError>,
    },

    #[error("internal: {0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl KubeliteError {
    /// Attach orchestration step context.
    pub fn in_step(self, step: SetupStep) -> Self {
        KubeliteError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// The step this error was raised in, if it carries step context.
    pub fn step(&self) -> Option<SetupStep> {
        match self {
            KubeliteError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

// ============================================================================
// Supporting types
// ============================================================================

/// A single image that failed during parallel caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub image: String,
    pub message: String,
}

impl fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.image, self.message)
    }
}

/// Top-level steps of bringing a cluster up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    Provision,
    SetupCerts,
    CacheImages,
    UpdateCluster,
    StartCluster,
}

impl SetupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::Provision => "provisioning machine",
            SetupStep::SetupCerts => "setting up certs",
            SetupStep::CacheImages => "caching images",
            SetupStep::UpdateCluster => "updating cluster",
            SetupStep::StartCluster => "starting cluster",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

fn summarize_failures(failures: &[ImageFailure]) -> String {
    let lines = failures
        .iter()
        .map(|f| format!("  - {}", f))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{} image(s) failed:\n{}", failures.len(), lines)
}
