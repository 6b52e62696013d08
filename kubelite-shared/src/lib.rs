//! kubelite shared code
//!
//! Error taxonomy and the fixed cluster constants used by both the core
//! orchestrator and the command-line front end.

pub mod constants;
pub mod errors;

pub use errors::{ImageFailure, KubeliteError, KubeliteResult, SetupStep};
