//! Maps engine events onto the small vocabulary the caller sees

use tracing::{debug, info, warn};

use crate::engine::{Event, RequestResult};

/// Caller-visible meaning of one engine event
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Progress(f64),
    Completed(RequestResult),
    Failed(String),
    Cancelled,
    /// Logged only
    Informational,
}

impl Translation {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Translation::Completed(_) | Translation::Failed(_) | Translation::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventTranslator;

impl EventTranslator {
    pub fn new() -> Self {
        Self
    }

    pub fn translate(&self, event: &Event) -> Translation {
        match event {
            Event::RequestProgress { fraction, .. } => Translation::Progress(*fraction),
            Event::RequestComplete { request, result } => {
                match result {
                    RequestResult::ModelFile { path } => {
                        info!("Request complete: model file available at {}", path.display())
                    }
                    RequestResult::Other { description } => warn!(
                        "Request for {} complete with unexpected result: {}",
                        request.destination.display(),
                        description
                    ),
                }
                Translation::Completed(result.clone())
            }
            Event::RequestError { request, error } => {
                warn!(
                    "Request for {} had an error: {}",
                    request.destination.display(),
                    error
                );
                Translation::Failed(error.clone())
            }
            Event::ProcessingCancelled => {
                info!("Processing was cancelled");
                Translation::Cancelled
            }
            Event::ProcessingComplete => {
                info!("Processing is complete");
                Translation::Informational
            }
            Event::InputIngestionComplete => {
                info!("Data ingestion is complete, beginning processing");
                Translation::Informational
            }
            Event::InvalidSample { id, reason } => {
                warn!("Invalid sample id={} reason={:?}", id, reason);
                Translation::Informational
            }
            Event::SampleSkipped { id } => {
                info!("Sample id={} was skipped by processing", id);
                Translation::Informational
            }
            Event::AutomaticDownsamplingApplied => {
                info!("Automatic downsampling was applied");
                Translation::Informational
            }
            Event::StitchingIncomplete => {
                warn!("Stitching incomplete");
                Translation::Informational
            }
            Event::RequestProgressInfo { info, .. } => {
                debug!("Progress info: {}", info);
                Translation::Informational
            }
            Event::Unknown { description } => {
                debug!("Unhandled engine output: {}", description);
                Translation::Informational
            }
        }
    }
}
