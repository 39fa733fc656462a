//! SessionOrchestrator - owns the lifetime of one reconstruction session
//!
//! # Lifecycle
//!
//! 1. Check the engine can run on this machine
//! 2. Build configuration and request from the caller's option strings
//! 3. Clear the destination path
//! 4. Create the engine session (`Idle -> Created`)
//! 5. Spawn the consumption loop
//! 6. Submit the single request (`Created -> Processing`)
//!
//! `start` returns once the request is submitted. From then on everything
//! reaches the caller through its `ProgressSink`.
//!
//! # Ownership
//!
//! The orchestrator keeps the engine control handle and the consumption
//! task's `JoinHandle` in one slot. Both are released together when the
//! session reaches a terminal state. A setup failure tears the slot down
//! through `SetupGuard`, whatever the exit path.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::event_loop::ConsumptionLoop;
use super::progress::{ProgressReport, ProgressSink};
use super::state::SessionState;
use crate::cleanup::CleanupManager;
use crate::engine::{
    ConfigurationBuilder, EngineSession, OutputRequest, ReconstructionEngine, SessionConfig,
};
use crate::error::{Result, SessionError};
use crate::output::OutputPathPreparer;

/// Caller options for one `process` call
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub detail: String,
    pub ordering: String,
    pub sensitivity: String,
    /// Where the caller ultimately wants the model; carried with the session
    pub result_path: Option<PathBuf>,
}

impl ProcessOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output: output.into(),
            detail: "medium".to_string(),
            ordering: "sequential".to_string(),
            sensitivity: "normal".to_string(),
            result_path: None,
        }
    }

    pub fn detail(self, detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..self
        }
    }

    pub fn ordering(self, ordering: impl Into<String>) -> Self {
        Self {
            ordering: ordering.into(),
            ..self
        }
    }

    pub fn sensitivity(self, sensitivity: impl Into<String>) -> Self {
        Self {
            sensitivity: sensitivity.into(),
            ..self
        }
    }

    pub fn result_path(self, result_path: impl Into<PathBuf>) -> Self {
        Self {
            result_path: Some(result_path.into()),
            ..self
        }
    }
}

/// Snapshot of a session, current or most recent
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub input_dir: PathBuf,
    pub result_path: Option<PathBuf>,
    pub config: SessionConfig,
    pub request: OutputRequest,
    pub state: SessionState,
    pub latest_report: Option<ProgressReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub(crate) struct ActiveSession {
    record: SessionRecord,
    control: Option<Arc<dyn EngineSession>>,
    task: Option<JoinHandle<()>>,
    stop: CancellationToken,
    state_tx: watch::Sender<SessionState>,
}

/// The orchestrator's single session slot, shared with the consumption task
#[derive(Clone, Default)]
pub(crate) struct SessionSlot {
    inner: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionSlot {
    pub(crate) fn is_current(&self, id: Uuid) -> bool {
        self.inner
            .lock()
            .as_ref()
            .is_some_and(|active| active.record.id == id)
    }

    /// Store the latest report and, if given, move to `state`.
    ///
    /// Terminal states release the engine handle and the task handle together.
    /// Returns false if the session is no longer current or the transition is
    /// not allowed.
    pub(crate) fn commit(
        &self,
        id: Uuid,
        report: Option<ProgressReport>,
        state: Option<SessionState>,
    ) -> bool {
        let mut slot = self.inner.lock();
        let Some(active) = slot.as_mut().filter(|active| active.record.id == id) else {
            return false;
        };

        if let Some(next) = state {
            let current = active.record.state;
            if !current.can_transition_to(next) {
                debug!("Ignoring transition {} -> {}", current, next);
                return false;
            }
            active.record.state = next;
            if next.is_terminal() {
                active.record.finished_at = Some(Utc::now());
                active.control = None;
                active.task = None;
            }
            active.state_tx.send_replace(next);
        }
        if let Some(report) = report {
            active.record.latest_report = Some(report);
        }
        true
    }

    fn attach(&self, id: Uuid, control: Arc<dyn EngineSession>) {
        if let Some(active) = self.inner.lock().as_mut().filter(|a| a.record.id == id) {
            active.control = Some(control);
        }
    }

    fn attach_task(&self, id: Uuid, task: JoinHandle<()>) {
        let mut slot = self.inner.lock();
        match slot.as_mut().filter(|a| a.record.id == id) {
            Some(active) if !active.record.state.is_terminal() => active.task = Some(task),
            // Already finished; the task is exiting on its own.
            _ => {}
        }
    }

    /// Tear down a session that never finished setup, putting the previous
    /// finished session (if any) back in the slot.
    fn release(&self, id: Uuid, previous: Option<ActiveSession>) {
        let mut slot = self.inner.lock();
        if slot.as_ref().is_some_and(|a| a.record.id == id) {
            // Slot is swapped first so the loop stops without reporting.
            if let Some(active) = std::mem::replace(&mut *slot, previous) {
                active.stop.cancel();
            }
        }
    }
}

/// Tears down a half-started session unless `start` ran to completion
struct SetupGuard {
    slot: SessionSlot,
    id: Uuid,
    previous: Option<ActiveSession>,
    armed: bool,
}

impl SetupGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        if self.armed {
            self.slot.release(self.id, self.previous.take());
        }
    }
}

/// Drives one reconstruction session at a time
pub struct SessionOrchestrator {
    engine: Arc<dyn ReconstructionEngine>,
    builder: ConfigurationBuilder,
    preparer: OutputPathPreparer,
    cleanup: CleanupManager,
    slot: SessionSlot,
}

impl SessionOrchestrator {
    pub fn new(engine: Arc<dyn ReconstructionEngine>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            builder: ConfigurationBuilder::new(),
            preparer: OutputPathPreparer::new(),
            cleanup: CleanupManager::new(scratch_dir),
            slot: SessionSlot::default(),
        }
    }

    /// Caller-facing entry point; see [`SessionOrchestrator::start`]
    pub async fn process(
        &self,
        options: ProcessOptions,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Uuid> {
        self.start(options, sink).await
    }

    /// Caller-facing cancel; see [`SessionOrchestrator::cancel`]
    pub fn cancel_session(&self) {
        self.cancel()
    }

    /// Start a session and return its id once the request is submitted.
    ///
    /// Setup problems are returned here. Anything that goes wrong afterwards
    /// is delivered to `sink`.
    pub async fn start(
        &self,
        options: ProcessOptions,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);
        let (config, detail) =
            self.builder
                .build(&options.detail, &options.ordering, &options.sensitivity);
        let request = OutputRequest::model_file(&options.output, detail);

        let guard = self.reserve(id, &options, config, request.clone())?;

        async {
            if !self.engine.is_supported() {
                warn!("Reconstruction engine is not supported on this machine");
                return Err(SessionError::UnsupportedPlatform);
            }
            info!(
                "Using configuration: ordering={} sensitivity={} detail={}",
                config.sample_ordering, config.feature_sensitivity, detail
            );

            self.preparer.prepare(&request.destination).await?;

            let created = self
                .engine
                .create_session(&options.input_dir, &config)
                .await
                .map_err(SessionError::SessionCreationFailed)?;
            info!("Successfully created session for {}", options.input_dir.display());
            self.slot.attach(id, created.control.clone());
            self.slot.commit(id, None, Some(SessionState::Created));

            let consumer = ConsumptionLoop::new(
                id,
                created.outputs,
                sink,
                self.cleanup.clone(),
                request.destination.clone(),
                self.slot.clone(),
                self.stop_token(id),
            );
            let task = tokio::spawn(consumer.run().instrument(tracing::Span::current()));
            self.slot.attach_task(id, task);

            info!("Submitting request for {}", request.destination.display());
            created
                .control
                .process(std::slice::from_ref(&request))
                .map_err(SessionError::ProcessingStartFailed)?;
            self.slot.commit(id, None, Some(SessionState::Processing));
            Ok::<(), SessionError>(())
        }
        .instrument(span)
        .await?;

        guard.disarm();
        Ok(id)
    }

    /// Ask the engine to stop the active session.
    ///
    /// Fire-and-forget: the session turns `Cancelled` only when the engine
    /// confirms. No-op without an active session.
    pub fn cancel(&self) {
        let control = {
            let slot = self.slot.inner.lock();
            slot.as_ref()
                .filter(|active| !active.record.state.is_terminal())
                .and_then(|active| active.control.clone())
        };
        match control {
            Some(control) => {
                info!("Cancelling reconstruction session");
                control.cancel();
            }
            None => debug!("Cancel requested with no active session"),
        }
    }

    /// Snapshot of the current or most recent session
    pub fn snapshot(&self) -> Option<SessionRecord> {
        self.slot
            .inner
            .lock()
            .as_ref()
            .map(|active| active.record.clone())
    }

    pub fn state(&self) -> SessionState {
        self.snapshot()
            .map(|record| record.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_active(&self) -> bool {
        let state = self.state();
        state != SessionState::Idle && !state.is_terminal()
    }

    /// Watch lifecycle transitions of the current session
    pub fn subscribe(&self) -> Option<watch::Receiver<SessionState>> {
        self.slot
            .inner
            .lock()
            .as_ref()
            .map(|active| active.state_tx.subscribe())
    }

    /// Wait for the current session to reach a terminal state
    pub async fn wait(&self) -> Option<SessionState> {
        let mut rx = self.subscribe()?;
        let state = rx.wait_for(|state| state.is_terminal()).await.ok()?;
        Some(*state)
    }

    /// Cancel the session and wait up to `grace` for the engine to confirm.
    ///
    /// If the engine does not confirm in time, the consumption loop is
    /// stopped and reports the session as cancelled itself.
    pub async fn shutdown(&self, grace: Duration) -> Option<SessionState> {
        if !self.is_active() {
            return self.snapshot().map(|record| record.state);
        }
        self.cancel();
        if let Ok(state) = tokio::time::timeout(grace, self.wait()).await {
            return state;
        }

        warn!("Engine did not confirm cancellation within {:?}", grace);
        let (stop, task) = {
            let mut slot = self.slot.inner.lock();
            match slot.as_mut() {
                Some(active) => (Some(active.stop.clone()), active.task.take()),
                None => (None, None),
            }
        };
        if let Some(stop) = stop {
            stop.cancel();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Consumption task ended abnormally: {}", e);
            }
        }
        self.snapshot().map(|record| record.state)
    }

    fn reserve(
        &self,
        id: Uuid,
        options: &ProcessOptions,
        config: SessionConfig,
        request: OutputRequest,
    ) -> Result<SetupGuard> {
        let mut slot = self.slot.inner.lock();
        if let Some(active) = slot.as_ref() {
            if !active.record.state.is_terminal() {
                return Err(SessionError::SessionAlreadyActive);
            }
        }

        let (state_tx, _) = watch::channel(SessionState::Idle);
        let previous = slot.replace(ActiveSession {
            record: SessionRecord {
                id,
                input_dir: options.input_dir.clone(),
                result_path: options.result_path.clone(),
                config,
                request,
                state: SessionState::Idle,
                latest_report: None,
                started_at: Utc::now(),
                finished_at: None,
            },
            control: None,
            task: None,
            stop: CancellationToken::new(),
            state_tx,
        });

        Ok(SetupGuard {
            slot: self.slot.clone(),
            id,
            previous,
            armed: true,
        })
    }

    fn stop_token(&self, id: Uuid) -> CancellationToken {
        self.slot
            .inner
            .lock()
            .as_ref()
            .filter(|active| active.record.id == id)
            .map(|active| active.stop.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Detail, Event, ScriptStep, ScriptedEngine};
    use crate::session::progress::tests::{RecordingSink, SinkCall};
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("images")).unwrap();
            std::fs::create_dir_all(temp.path().join("scratch")).unwrap();
            Self { temp }
        }

        fn input(&self) -> PathBuf {
            self.temp.path().join("images")
        }

        fn output(&self) -> PathBuf {
            self.temp.path().join("model.usdz")
        }

        fn scratch(&self) -> PathBuf {
            self.temp.path().join("scratch")
        }

        fn orchestrator(&self, engine: Arc<ScriptedEngine>) -> SessionOrchestrator {
            SessionOrchestrator::new(engine, self.scratch())
        }

        fn options(&self) -> ProcessOptions {
            ProcessOptions::new(self.input(), self.output())
        }
    }

    #[tokio::test]
    async fn test_full_reconstruction_scenario() {
        let fx = Fixture::new();
        for i in 0..50 {
            std::fs::write(fx.input().join(format!("IMG_{:04}.HEIC", i)), b"heic").unwrap();
        }
        std::fs::write(fx.output(), b"previous model").unwrap();
        std::fs::write(fx.scratch().join("depth_0001.tmp"), b"tmp").unwrap();
        std::fs::create_dir_all(fx.scratch().join("meshes")).unwrap();

        let mut script = vec![ScriptStep::event(Event::InputIngestionComplete)];
        for i in 0..=10 {
            script.push(ScriptStep::progress(i as f64 / 10.0));
        }
        script.push(ScriptStep::complete());
        script.push(ScriptStep::event(Event::ProcessingComplete));
        let engine = Arc::new(ScriptedEngine::new(script));
        let orchestrator = fx.orchestrator(engine.clone());
        let sink = Arc::new(RecordingSink::default());

        let options = fx
            .options()
            .detail("full")
            .ordering("sequential")
            .sensitivity("high")
            .result_path(fx.temp.path().join("final.usdz"));
        orchestrator.process(options, sink.clone()).await.unwrap();
        assert!(!fx.output().exists());

        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));
        assert_eq!(engine.sessions_created(), 1);

        let fractions = sink.fractions();
        assert_eq!(fractions.first(), Some(&0.0));
        assert_eq!(fractions.last(), Some(&1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sink.terminal_calls(), vec![SinkCall::Completed]);
        assert_eq!(std::fs::read_dir(fx.scratch()).unwrap().count(), 0);

        let record = orchestrator.snapshot().unwrap();
        assert_eq!(record.request.detail, Detail::Full);
        assert_eq!(record.result_path, Some(fx.temp.path().join("final.usdz")));
        assert!(record.finished_at.is_some());
        let report = record.latest_report.unwrap();
        assert!(report.terminal);
        assert_eq!(report.fraction, 1.0);
    }

    #[tokio::test]
    async fn test_unsupported_platform_touches_nothing() {
        let fx = Fixture::new();
        std::fs::write(fx.output(), b"previous model").unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptStep::complete()]).unsupported());
        let orchestrator = fx.orchestrator(engine.clone());
        let sink = Arc::new(RecordingSink::default());

        let result = orchestrator.process(fx.options(), sink.clone()).await;
        assert!(matches!(result, Err(SessionError::UnsupportedPlatform)));
        assert!(fx.output().exists());
        assert_eq!(engine.sessions_created(), 0);
        assert!(sink.calls().is_empty());
        assert!(orchestrator.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_unwritable_destination_creates_no_session() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptStep::complete()]));
        let orchestrator = fx.orchestrator(engine.clone());

        let options = ProcessOptions::new(fx.input(), fx.temp.path().join("model\0.usdz"));
        let result = orchestrator
            .process(options, Arc::new(RecordingSink::default()))
            .await;
        assert!(matches!(
            result,
            Err(SessionError::DestinationUnwritable { .. })
        ));
        assert_eq!(engine.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_session_creation_failure() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![]).rejecting_input("no images found"));
        let orchestrator = fx.orchestrator(engine);

        let result = orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await;
        match result {
            Err(SessionError::SessionCreationFailed(e)) => {
                assert!(e.to_string().contains("no images found"))
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!orchestrator.is_active());
    }

    #[tokio::test]
    async fn test_processing_start_failure_stops_loop() {
        let fx = Fixture::new();
        let engine =
            Arc::new(ScriptedEngine::new(vec![ScriptStep::complete()]).rejecting_process("busy"));
        let orchestrator = fx.orchestrator(engine);
        let sink = Arc::new(RecordingSink::default());

        let result = orchestrator.process(fx.options(), sink.clone()).await;
        assert!(matches!(result, Err(SessionError::ProcessingStartFailed(_))));
        assert!(orchestrator.snapshot().is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_request_error_reports_failure() {
        let fx = Fixture::new();
        std::fs::write(fx.scratch().join("partial.obj"), b"v 0 0 0").unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![
            ScriptStep::progress(0.3),
            ScriptStep::error("not enough overlap between images"),
            ScriptStep::progress(0.9),
        ]));
        let orchestrator = fx.orchestrator(engine);
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Failed));

        assert_eq!(sink.fractions(), vec![0.3, 0.0]);
        match sink.terminal_calls().as_slice() {
            [SinkCall::Failed(message)] => {
                assert!(message.contains("not enough overlap between images"))
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(fx.scratch().join("partial.obj").exists());
        let report = orchestrator.snapshot().unwrap().latest_report.unwrap();
        assert_eq!(report.fraction, 0.0);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_reports_failure() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![
            ScriptStep::progress(0.5),
            ScriptStep::Fail("pipe closed".to_string()),
        ]));
        let orchestrator = fx.orchestrator(engine);
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Failed));
        assert!(matches!(
            sink.terminal_calls().as_slice(),
            [SinkCall::Failed(message)] if message.contains("pipe closed")
        ));
    }

    #[tokio::test]
    async fn test_stream_ending_early_fails() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![
            ScriptStep::progress(0.5),
            ScriptStep::event(Event::ProcessingComplete),
        ]));
        let orchestrator = fx.orchestrator(engine);
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Failed));
        assert_eq!(sink.terminal_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_yields_cancelled() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![
            ScriptStep::progress(0.2),
            ScriptStep::Hold,
            ScriptStep::complete(),
        ]));
        let orchestrator = Arc::new(fx.orchestrator(engine.clone()));
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        let mut states = orchestrator.subscribe().unwrap();
        states
            .wait_for(|state| *state == SessionState::Processing)
            .await
            .unwrap();

        let other = orchestrator.clone();
        tokio::spawn(async move { other.cancel_session() })
            .await
            .unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Cancelled));
        assert_eq!(sink.terminal_calls(), vec![SinkCall::Cancelled]);

        orchestrator.cancel();
        orchestrator.cancel();
        assert_eq!(engine.cancel_requests(), 1);
        assert_eq!(orchestrator.state(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_without_session_is_noop() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(Arc::new(ScriptedEngine::new(vec![])));
        orchestrator.cancel();
        assert_eq!(orchestrator.state(), SessionState::Idle);
        assert!(orchestrator.wait().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_start_is_rejected() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptStep::Hold]));
        let orchestrator = fx.orchestrator(engine.clone());

        orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        let second = orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await;
        assert!(matches!(second, Err(SessionError::SessionAlreadyActive)));
        assert_eq!(engine.sessions_created(), 1);
        assert!(orchestrator.is_active());

        orchestrator.cancel();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Cancelled));
    }

    #[tokio::test]
    async fn test_new_session_after_terminal_state() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptStep::complete()]));
        let orchestrator = fx.orchestrator(engine.clone());

        let first = orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));

        let second = orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));
        assert_eq!(orchestrator.snapshot().unwrap().id, second);
        assert_eq!(engine.sessions_created(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_when_engine_ignores_cancel() {
        let fx = Fixture::new();
        let script = vec![ScriptStep::progress(0.4), ScriptStep::Hold];
        let engine = Arc::new(ScriptedEngine::new(script).ignoring_cancel());
        let orchestrator = fx.orchestrator(engine);
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        let state = orchestrator.shutdown(Duration::from_millis(50)).await;
        assert_eq!(state, Some(SessionState::Cancelled));
        assert_eq!(sink.terminal_calls(), vec![SinkCall::Cancelled]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_success() {
        let fx = Fixture::new();
        let scratch = fx.temp.path().join("scratch-file");
        std::fs::write(&scratch, b"not a directory").unwrap();
        let engine = Arc::new(ScriptedEngine::new(vec![
            ScriptStep::progress(0.5),
            ScriptStep::complete(),
        ]));
        let orchestrator = SessionOrchestrator::new(engine, &scratch);
        let sink = Arc::new(RecordingSink::default());

        orchestrator.process(fx.options(), sink.clone()).await.unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));
        assert_eq!(sink.terminal_calls(), vec![SinkCall::Completed]);
        assert!(!sink
            .calls()
            .iter()
            .any(|call| matches!(call, SinkCall::Failed(_))));
        assert!(scratch.is_file());
    }

    #[tokio::test]
    async fn test_setup_failure_keeps_previous_record() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::new(vec![ScriptStep::complete()]));
        let orchestrator = fx.orchestrator(engine.clone());

        let first = orchestrator
            .process(fx.options(), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));

        let options = ProcessOptions::new(fx.input(), fx.temp.path().join("model\0.usdz"));
        let result = orchestrator
            .process(options, Arc::new(RecordingSink::default()))
            .await;
        assert!(matches!(
            result,
            Err(SessionError::DestinationUnwritable { .. })
        ));

        let record = orchestrator.snapshot().unwrap();
        assert_eq!(record.id, first);
        assert_eq!(record.state, SessionState::Completed);
        assert_eq!(orchestrator.state(), SessionState::Completed);
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));
        assert_eq!(engine.sessions_created(), 1);
    }
}
