//! Progress reporting towards the caller
//!
//! The caller only ever sees a fraction, a terminal flag and an optional
//! error. `ProgressReporter` enforces the delivery rules: fractions stay in
//! [0, 1] and never go backwards, and at most one terminal report is sent.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Receiver of progress notifications, supplied by the caller
///
/// Called from the consumption task, never from the thread that called
/// `process`.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, fraction: f64);
    fn on_completed(&self);
    fn on_failed(&self, message: &str);

    /// Cancellation is a terminal state, not a failure
    fn on_cancelled(&self) {}
}

/// Latest progress handed to the caller
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressReport {
    pub fraction: f64,
    pub terminal: bool,
    pub error: Option<String>,
}

/// Applies the delivery rules in front of a sink
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    fraction: f64,
    terminated: bool,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            fraction: 0.0,
            terminated: false,
        }
    }

    /// Forward a progress update. Returns `None` when it was suppressed.
    pub fn progress(&mut self, fraction: f64) -> Option<ProgressReport> {
        if self.terminated || fraction.is_nan() {
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < self.fraction {
            debug!("Ignoring regressing progress {} < {}", fraction, self.fraction);
            return None;
        }
        self.fraction = fraction;
        self.sink.on_progress(fraction);
        Some(ProgressReport {
            fraction,
            terminal: false,
            error: None,
        })
    }

    pub fn completed(&mut self) -> Option<ProgressReport> {
        self.terminate()?;
        self.fraction = 1.0;
        self.sink.on_progress(1.0);
        self.sink.on_completed();
        Some(ProgressReport {
            fraction: 1.0,
            terminal: true,
            error: None,
        })
    }

    /// Failures reset the caller's indicator to zero
    pub fn failed(&mut self, message: &str) -> Option<ProgressReport> {
        self.terminate()?;
        self.fraction = 0.0;
        self.sink.on_progress(0.0);
        self.sink.on_failed(message);
        Some(ProgressReport {
            fraction: 0.0,
            terminal: true,
            error: Some(message.to_string()),
        })
    }

    /// Cancellation keeps the last fraction reached
    pub fn cancelled(&mut self) -> Option<ProgressReport> {
        self.terminate()?;
        self.sink.on_cancelled();
        Some(ProgressReport {
            fraction: self.fraction,
            terminal: true,
            error: None,
        })
    }

    fn terminate(&mut self) -> Option<()> {
        if self.terminated {
            debug!("Dropping second terminal report");
            return None;
        }
        self.terminated = true;
        Some(())
    }
}
