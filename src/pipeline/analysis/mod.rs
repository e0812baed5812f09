//! Analysis Orchestrator and Result Compliance Enforcer, plus the collaborator
//! seams they consume (analysis engine, notifier).

pub mod types;
pub mod engine;
pub mod notify;
pub mod orchestrator;
pub mod compliance;
pub mod service;

pub use types::*;
pub use engine::*;
pub use notify::*;
pub use orchestrator::*;
pub use compliance::*;
pub use service::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Analysis engine unreachable at {0}")]
    EngineConnection(String),

    #[error("Analysis engine timed out after {0}s")]
    EngineTimeout(u64),

    #[error("Analysis engine error ({status}): {body}")]
    EngineStatus { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),
}
