//! Reflection Agent Orchestrator
//!
//! Runs the generate, critique and refine loop for motivational phrases,
//! scores each critique with a keyword heuristic and serves the loop over HTTP.

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod quality;
pub mod run_state;

#[cfg(test)]
pub(crate) mod test_support;

pub use agents::{RetryPolicy, StepInvoker};
pub use api::{create_router, AppState, ErrorResponse, HealthResponse, ReflectRequest};
pub use config::{Config, ReflectionSettings, SamplingConfig, ServerConfig};
pub use error::{LlmErrorKind, ReflectError, Result};
pub use llm::{CompletionRequest, OpenAiClient, Step, TextGenerator};
pub use orchestrator::{ReflectionOrchestrator, THEME_REQUIRED};
pub use quality::{assess, evaluate_quality, QualityAssessment};
pub use run_state::{Iteration, ReflectionRun, RunPhase, RunState, StopReason};
