//! Session orchestration
//!
//! One engine session at a time: the lifecycle state machine, the event
//! consumption loop and the progress vocabulary handed to the caller.

mod event_loop;
pub mod orchestrator;
pub mod progress;
pub mod state;
pub mod translator;

pub use orchestrator::{ProcessOptions, SessionOrchestrator, SessionRecord};
pub use progress::{ProgressReport, ProgressReporter, ProgressSink};
pub use state::SessionState;
pub use translator::{EventTranslator, Translation};
