//! Event consumption loop
//!
//! Drains one session's event stream in arrival order until a terminal event,
//! a stream failure or the end of the stream. Runs as its own task so the
//! caller of `start` never blocks on reconstruction.

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::orchestrator::SessionSlot;
use super::progress::{ProgressReporter, ProgressSink};
use super::state::SessionState;
use super::translator::{EventTranslator, Translation};
use crate::cleanup::CleanupManager;
use crate::engine::EventStream;
use crate::error::SessionError;

pub(crate) struct ConsumptionLoop {
    id: Uuid,
    outputs: EventStream,
    translator: EventTranslator,
    reporter: ProgressReporter,
    cleanup: CleanupManager,
    destination: PathBuf,
    slot: SessionSlot,
    stop: CancellationToken,
}

impl ConsumptionLoop {
    pub(crate) fn new(
        id: Uuid,
        outputs: EventStream,
        sink: Arc<dyn ProgressSink>,
        cleanup: CleanupManager,
        destination: PathBuf,
        slot: SessionSlot,
        stop: CancellationToken,
    ) -> Self {
        Self {
            id,
            outputs,
            translator: EventTranslator::new(),
            reporter: ProgressReporter::new(sink),
            cleanup,
            destination,
            slot,
            stop,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    self.stopped();
                    return;
                }
                next = self.outputs.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    self.fail(SessionError::StreamTransportFailed {
                        message: e.to_string(),
                    });
                    return;
                }
                None => {
                    self.fail(SessionError::StreamTransportFailed {
                        message: "event stream ended before a terminal event".to_string(),
                    });
                    return;
                }
            };

            debug!("Engine event: {}", event.kind());
            let translation = self.translator.translate(&event);
            let terminal = translation.is_terminal();
            match translation {
                Translation::Progress(fraction) => {
                    if let Some(report) = self.reporter.progress(fraction) {
                        self.slot.commit(self.id, Some(report), None);
                    }
                }
                Translation::Completed(_) => {
                    self.cleanup.purge(Some(&self.destination)).await;
                    let report = self.reporter.completed();
                    self.slot
                        .commit(self.id, report, Some(SessionState::Completed));
                    info!("Reconstruction completed");
                }
                Translation::Failed(message) => {
                    self.fail(SessionError::ProcessingFailed { message });
                }
                Translation::Cancelled => {
                    let report = self.reporter.cancelled();
                    self.slot
                        .commit(self.id, report, Some(SessionState::Cancelled));
                }
                Translation::Informational => {}
            }
            // Nothing after a terminal event reaches the caller.
            if terminal {
                return;
            }
        }
    }

    fn fail(&mut self, error: SessionError) {
        info!("Reconstruction failed: {}", error);
        let report = self.reporter.failed(&error.user_message());
        self.slot.commit(self.id, report, Some(SessionState::Failed));
    }

    /// Stop requested by the orchestrator. A session torn down during setup
    /// is no longer in the slot and ends silently; a live one is reported as
    /// cancelled.
    fn stopped(&mut self) {
        if !self.slot.is_current(self.id) {
            debug!("Consumption loop stopped during setup");
            return;
        }
        info!("Consumption loop stopped, reporting session as cancelled");
        let report = self.reporter.cancelled();
        self.slot
            .commit(self.id, report, Some(SessionState::Cancelled));
    }
}
