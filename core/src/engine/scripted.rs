//! Scripted engine implementation
//!
//! Replays a fixed list of steps once `process` has been called. Suitable for:
//! - Unit tests of the session layer
//! - Dry runs of the CLI without the external program
//!
//! # Example
//! ```rust,ignore
//! let engine = ScriptedEngine::new(vec![
//!     ScriptStep::progress(0.5),
//!     ScriptStep::complete(),
//! ]);
//! let created = engine.create_session(input_dir, &config).await?;
//! created.control.process(&[request])?;
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{
    CreatedSession, EngineError, EngineSession, Event, OutputRequest, ReconstructionEngine,
    RequestResult, SessionConfig,
};

/// One step of an engine script
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit an event. Request-scoped events get the submitted request filled in.
    Emit(ScriptedEvent),
    /// Break the stream with a transport error
    Fail(String),
    /// Sleep before the next step (interrupted by cancellation)
    Pause(Duration),
    /// Block until the session is cancelled
    Hold,
}

/// Events a script can emit; request-scoped ones omit the request
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Progress(f64),
    Complete,
    Error(String),
    Raw(Event),
}

impl ScriptStep {
    pub fn progress(fraction: f64) -> Self {
        ScriptStep::Emit(ScriptedEvent::Progress(fraction))
    }

    pub fn complete() -> Self {
        ScriptStep::Emit(ScriptedEvent::Complete)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptStep::Emit(ScriptedEvent::Error(message.into()))
    }

    pub fn event(event: Event) -> Self {
        ScriptStep::Emit(ScriptedEvent::Raw(event))
    }
}

/// In-process engine that replays a script
pub struct ScriptedEngine {
    supported: bool,
    script: Vec<ScriptStep>,
    reject_input: Option<String>,
    reject_process: Option<String>,
    honor_cancel: bool,
    sessions_created: AtomicUsize,
    last_session: Mutex<Option<Arc<ScriptedSession>>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            supported: true,
            script,
            reject_input: None,
            reject_process: None,
            honor_cancel: true,
            sessions_created: AtomicUsize::new(0),
            last_session: Mutex::new(None),
        }
    }

    /// Script used by `--dry-run`: steady progress, then a model file
    pub fn demo(destination: impl Into<PathBuf>, steps: usize, interval: Duration) -> Self {
        let steps = steps.max(1);
        let mut script = vec![ScriptStep::event(Event::InputIngestionComplete)];
        for i in 1..=steps {
            script.push(ScriptStep::Pause(interval));
            script.push(ScriptStep::progress(i as f64 / steps as f64));
        }
        script.push(ScriptStep::event(Event::RequestComplete {
            request: OutputRequest::model_file(PathBuf::new(), Default::default()),
            result: RequestResult::ModelFile {
                path: destination.into(),
            },
        }));
        script.push(ScriptStep::event(Event::ProcessingComplete));
        Self::new(script)
    }

    pub fn unsupported(self) -> Self {
        Self {
            supported: false,
            ..self
        }
    }

    pub fn rejecting_input(self, reason: impl Into<String>) -> Self {
        Self {
            reject_input: Some(reason.into()),
            ..self
        }
    }

    pub fn rejecting_process(self, reason: impl Into<String>) -> Self {
        Self {
            reject_process: Some(reason.into()),
            ..self
        }
    }

    /// Keep running through cancel requests
    pub fn ignoring_cancel(self) -> Self {
        Self {
            honor_cancel: false,
            ..self
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Number of cancel requests the most recent session received
    pub fn cancel_requests(&self) -> usize {
        self.last_session
            .lock()
            .as_ref()
            .map(|s| s.cancel_requests.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

struct ScriptedSession {
    started: Notify,
    request: Mutex<Option<OutputRequest>>,
    reject_process: Option<String>,
    honor_cancel: bool,
    cancelled: CancellationToken,
    cancel_requests: AtomicUsize,
}

impl EngineSession for ScriptedSession {
    fn process(&self, requests: &[OutputRequest]) -> Result<(), EngineError> {
        if let Some(reason) = &self.reject_process {
            return Err(EngineError::RequestRejected(reason.clone()));
        }
        let request = requests
            .first()
            .cloned()
            .ok_or_else(|| EngineError::RequestRejected("no requests submitted".to_string()))?;
        *self.request.lock() = Some(request);
        self.started.notify_one();
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        if self.honor_cancel {
            self.cancelled.cancel();
        }
    }
}

#[async_trait]
impl ReconstructionEngine for ScriptedEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn create_session(
        &self,
        input_dir: &Path,
        _config: &SessionConfig,
    ) -> Result<CreatedSession, EngineError> {
        if let Some(reason) = &self.reject_input {
            return Err(EngineError::InputRejected(format!(
                "{}: {}",
                input_dir.display(),
                reason
            )));
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);

        let session = Arc::new(ScriptedSession {
            started: Notify::new(),
            request: Mutex::new(None),
            reject_process: self.reject_process.clone(),
            honor_cancel: self.honor_cancel,
            cancelled: CancellationToken::new(),
            cancel_requests: AtomicUsize::new(0),
        });
        *self.last_session.lock() = Some(session.clone());

        let script = self.script.clone();
        let state = session.clone();
        let outputs = async_stream::stream! {
            state.started.notified().await;
            let request = state.request.lock().clone().unwrap_or_else(|| {
                OutputRequest::model_file(PathBuf::new(), Default::default())
            });

            for step in script {
                match step {
                    ScriptStep::Emit(event) => yield Ok(resolve(event, &request)),
                    ScriptStep::Fail(message) => {
                        yield Err(EngineError::Transport(message));
                        return;
                    }
                    ScriptStep::Pause(duration) => {
                        tokio::select! {
                            _ = tokio::time::sleep(duration) => {}
                            _ = state.cancelled.cancelled() => {}
                        }
                    }
                    ScriptStep::Hold => state.cancelled.cancelled().await,
                }
                if state.cancelled.is_cancelled() {
                    yield Ok(Event::ProcessingCancelled);
                    return;
                }
            }
        };

        Ok(CreatedSession {
            control: session,
            outputs: Box::pin(outputs),
        })
    }
}

fn resolve(event: ScriptedEvent, request: &OutputRequest) -> Event {
    match event {
        ScriptedEvent::Progress(fraction) => Event::RequestProgress {
            request: request.clone(),
            fraction,
        },
        ScriptedEvent::Complete => Event::RequestComplete {
            request: request.clone(),
            result: RequestResult::ModelFile {
                path: request.destination.clone(),
            },
        },
        ScriptedEvent::Error(error) => Event::RequestError {
            request: request.clone(),
            error,
        },
        ScriptedEvent::Raw(Event::RequestComplete { result, .. }) => Event::RequestComplete {
            request: request.clone(),
            result,
        },
        ScriptedEvent::Raw(event) => event,
    }
}
