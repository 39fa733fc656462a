pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod session;

// Re-exports for convenience
pub use config::Config;
pub use engine::{CommandEngine, ReconstructionEngine, ScriptedEngine};
pub use error::{Result, SessionError};
pub use session::{
    ProcessOptions, ProgressReport, ProgressSink, SessionOrchestrator, SessionState,
};
