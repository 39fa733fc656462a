//! Command engine implementation
//!
//! Drives an external photogrammetry executable. The program is invoked as
//!
//! ```text
//! <program> [args...] --input <dir> --output <path> --detail <level>
//!           --ordering <ordering> --sensitivity <sensitivity> --scratch <dir>
//! ```
//!
//! and reports progress as one JSON object per stdout line, tagged by `type`:
//!
//! ```text
//! {"type":"request_progress","fraction":0.42}
//! {"type":"request_complete","result":{"type":"model_file","path":"/out/model.usdz"}}
//! {"type":"request_error","error":"not enough samples"}
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    CreatedSession, EngineError, EngineSession, Event, OutputRequest, ReconstructionEngine,
    RequestResult, SessionConfig,
};

/// Buffer between the stdout reader and the session consumer
const EVENT_BUFFER: usize = 64;

/// Engine backed by an external executable
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn with_args(self, args: Vec<String>) -> Self {
        Self { args, ..self }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ReconstructionEngine for CommandEngine {
    fn is_supported(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    async fn create_session(
        &self,
        input_dir: &Path,
        config: &SessionConfig,
    ) -> Result<CreatedSession, EngineError> {
        let metadata = tokio::fs::metadata(input_dir).await.map_err(|e| {
            EngineError::InputRejected(format!("{}: {}", input_dir.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(EngineError::InputRejected(format!(
                "{} is not a directory",
                input_dir.display()
            )));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = Arc::new(CommandSession {
            engine: self.clone(),
            input_dir: input_dir.to_path_buf(),
            config: *config,
            events: Mutex::new(Some(tx)),
            cancel: CancellationToken::new(),
        });

        Ok(CreatedSession {
            control: session,
            outputs: Box::pin(ReceiverStream::new(rx)),
        })
    }
}

type EventSender = mpsc::Sender<Result<Event, EngineError>>;

struct CommandSession {
    engine: CommandEngine,
    input_dir: PathBuf,
    config: SessionConfig,
    /// Taken by the first successful `process` call
    events: Mutex<Option<EventSender>>,
    cancel: CancellationToken,
}

impl CommandSession {
    fn command(&self, request: &OutputRequest) -> Command {
        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&self.engine.args)
            .arg("--input")
            .arg(&self.input_dir)
            .arg("--output")
            .arg(&request.destination)
            .arg("--detail")
            .arg(request.detail.as_str())
            .arg("--ordering")
            .arg(self.config.sample_ordering.as_str())
            .arg("--sensitivity")
            .arg(self.config.feature_sensitivity.as_str())
            .arg("--scratch")
            .arg(&self.engine.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl EngineSession for CommandSession {
    fn process(&self, requests: &[OutputRequest]) -> Result<(), EngineError> {
        let request = match requests {
            [request] => request.clone(),
            _ => {
                return Err(EngineError::RequestRejected(format!(
                    "expected exactly one request, got {}",
                    requests.len()
                )))
            }
        };

        let mut events = self.events.lock();
        let tx = events
            .take()
            .ok_or_else(|| EngineError::RequestRejected("session already processing".to_string()))?;

        let child = match self.command(&request).spawn() {
            Ok(child) => child,
            Err(e) => {
                *events = Some(tx);
                return Err(EngineError::RequestRejected(format!(
                    "failed to start {}: {}",
                    self.engine.program, e
                )));
            }
        };

        tokio::spawn(pump(child, request, tx, self.cancel.clone()));
        Ok(())
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Forward the child's stdout as events until it exits or is cancelled.
async fn pump(
    mut child: Child,
    request: OutputRequest,
    tx: EventSender,
    cancel: CancellationToken,
) {
    let Some(stdout) = child.stdout.take() else {
        let _ = tx
            .send(Err(EngineError::Transport("child stdout unavailable".to_string())))
            .await;
        return;
    };
    let stderr = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });
    let mut lines = BufReader::new(stdout).lines();
    let mut saw_terminal = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill reconstruction process: {}", e);
                }
                let _ = tx.send(Ok(Event::ProcessingCancelled)).await;
                return;
            }
            _ = tx.closed() => {
                debug!("Event consumer dropped, stopping reconstruction process");
                let _ = child.kill().await;
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(event) = parse_line(&line, &request) else {
                        continue;
                    };
                    saw_terminal |= matches!(
                        event,
                        Event::RequestComplete { .. }
                            | Event::RequestError { .. }
                            | Event::ProcessingCancelled
                    );
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Event consumer dropped, stopping reconstruction process");
                        let _ = child.kill().await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(EngineError::Transport(e.to_string()))).await;
                    let _ = child.kill().await;
                    return;
                }
            }
        }
    }

    let stderr = match stderr {
        Some(reader) => reader.await.unwrap_or_default(),
        None => String::new(),
    };

    match child.wait().await {
        Ok(status) if !status.success() && !saw_terminal => {
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("reconstruction process exited with {}", status)
            } else {
                format!("reconstruction process exited with {}: {}", status, detail)
            };
            let _ = tx.send(Err(EngineError::Transport(message))).await;
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.send(Err(EngineError::Transport(e.to_string()))).await;
        }
    }
}

/// Wire format of one stdout line
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    ProcessingComplete,
    RequestError { error: String },
    RequestComplete { result: RequestResult },
    RequestProgress { fraction: f64 },
    RequestProgressInfo { info: String },
    InputComplete,
    InvalidSample { id: i64, reason: String },
    SkippedSample { id: i64 },
    AutomaticDownsampling,
    ProcessingCancelled,
    StitchingIncomplete,
}

fn parse_line(line: &str, request: &OutputRequest) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let event = match serde_json::from_str::<WireEvent>(line) {
        Ok(WireEvent::ProcessingComplete) => Event::ProcessingComplete,
        Ok(WireEvent::RequestError { error }) => Event::RequestError {
            request: request.clone(),
            error,
        },
        Ok(WireEvent::RequestComplete { result }) => Event::RequestComplete {
            request: request.clone(),
            result,
        },
        Ok(WireEvent::RequestProgress { fraction }) => Event::RequestProgress {
            request: request.clone(),
            fraction,
        },
        Ok(WireEvent::RequestProgressInfo { info }) => Event::RequestProgressInfo {
            request: request.clone(),
            info,
        },
        Ok(WireEvent::InputComplete) => Event::InputIngestionComplete,
        Ok(WireEvent::InvalidSample { id, reason }) => Event::InvalidSample { id, reason },
        Ok(WireEvent::SkippedSample { id }) => Event::SampleSkipped { id },
        Ok(WireEvent::AutomaticDownsampling) => Event::AutomaticDownsamplingApplied,
        Ok(WireEvent::ProcessingCancelled) => Event::ProcessingCancelled,
        Ok(WireEvent::StitchingIncomplete) => Event::StitchingIncomplete,
        Err(_) => Event::Unknown {
            description: line.to_string(),
        },
    };
    Some(event)
}
