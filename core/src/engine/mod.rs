//! ReconstructionEngine trait - the boundary to the photogrammetry backend
//!
//! The engine is an opaque capability: it ingests a folder of images plus a
//! configuration and reports what it is doing through an event stream. The
//! session layer only calls it and interprets its events.

pub mod command;
pub mod event;
pub mod options;
pub mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use command::CommandEngine;
pub use event::{Event, RequestResult};
pub use options::{
    ConfigurationBuilder, Detail, FeatureSensitivity, OutputRequest, SampleOrdering, SessionConfig,
};
pub use scripted::{ScriptStep, ScriptedEngine};

/// Ordered, finite stream of session events. Owned by exactly one consumer.
pub type EventStream = BoxStream<'static, Result<Event, EngineError>>;

/// Errors reported by an engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The input folder or configuration was not accepted
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// The process command was not accepted
    #[error("request rejected: {0}")]
    RequestRejected(String),

    /// The event stream broke (not a per-request error)
    #[error("transport failure: {0}")]
    Transport(String),
}

/// ReconstructionEngine trait - creates processing sessions
///
/// # Implementations
/// - CommandEngine: drives an external reconstruction executable
/// - ScriptedEngine: replays a fixed script, for tests and dry runs
#[async_trait]
pub trait ReconstructionEngine: Send + Sync {
    /// Whether this machine can run the engine at all
    fn is_supported(&self) -> bool;

    /// Create a session bound to one input folder and one configuration
    ///
    /// The returned stream stays silent until `process` is called on the
    /// control handle.
    async fn create_session(
        &self,
        input_dir: &Path,
        config: &SessionConfig,
    ) -> Result<CreatedSession, EngineError>;
}

/// Control surface of a live engine session
pub trait EngineSession: Send + Sync {
    /// Begin processing. Rejections are reported synchronously.
    fn process(&self, requests: &[OutputRequest]) -> Result<(), EngineError>;

    /// Ask the engine to stop. Advisory; the engine confirms with
    /// `Event::ProcessingCancelled`.
    fn cancel(&self);
}

/// A freshly created session: its control handle plus its event stream
pub struct CreatedSession {
    pub control: Arc<dyn EngineSession>,
    pub outputs: EventStream,
}
