use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::options::OutputRequest;

/// Result attached to a completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestResult {
    /// Model written at the given location
    ModelFile { path: PathBuf },
    /// Any result kind this crate does not interpret
    Other { description: String },
}

/// Lifecycle notifications emitted by an engine session, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProcessingComplete,
    RequestError { request: OutputRequest, error: String },
    RequestComplete { request: OutputRequest, result: RequestResult },
    RequestProgress { request: OutputRequest, fraction: f64 },
    RequestProgressInfo { request: OutputRequest, info: String },
    InputIngestionComplete,
    InvalidSample { id: i64, reason: String },
    SampleSkipped { id: i64 },
    AutomaticDownsamplingApplied,
    ProcessingCancelled,
    StitchingIncomplete,
    /// Event kinds the engine added after this crate was written
    Unknown { description: String },
}

impl Event {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ProcessingComplete => "processing_complete",
            Event::RequestError { .. } => "request_error",
            Event::RequestComplete { .. } => "request_complete",
            Event::RequestProgress { .. } => "request_progress",
            Event::RequestProgressInfo { .. } => "request_progress_info",
            Event::InputIngestionComplete => "input_ingestion_complete",
            Event::InvalidSample { .. } => "invalid_sample",
            Event::SampleSkipped { .. } => "sample_skipped",
            Event::AutomaticDownsamplingApplied => "automatic_downsampling",
            Event::ProcessingCancelled => "processing_cancelled",
            Event::StitchingIncomplete => "stitching_incomplete",
            Event::Unknown { .. } => "unknown",
        }
    }
}
