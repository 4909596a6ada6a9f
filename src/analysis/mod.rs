//! Frame analysis
//!
//! Recognition is pluggable behind [`FrameAnalyzer`]. The shipped analyzer
//! is a timed stand-in; [`AnalysisSimulator`] runs any analyzer as a
//! cancellable background task that reports exactly one completion event.

use crate::capture::CapturedFrame;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default stand-in analysis time
pub const DEFAULT_ANALYSIS_DELAY: Duration = Duration::from_millis(2000);

/// Analysis errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Internal signal only; never shown to the user
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Analysis failed: {0}")]
    Failed(String),
}

/// What an analyzer found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub frame_id: Uuid,
    /// Value read off the meter, if the analyzer could read one
    pub suggested_value: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

/// A recognition backend
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    async fn analyze(&self, frame: &CapturedFrame) -> Result<AnalysisOutcome, AnalysisError>;
}

/// Waits a fixed time and reports no value
pub struct SimulatedAnalyzer {
    delay: Duration,
}

impl SimulatedAnalyzer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_DELAY)
    }
}

#[async_trait]
impl FrameAnalyzer for SimulatedAnalyzer {
    async fn analyze(&self, frame: &CapturedFrame) -> Result<AnalysisOutcome, AnalysisError> {
        tokio::time::sleep(self.delay).await;
        Ok(AnalysisOutcome {
            frame_id: frame.id,
            suggested_value: None,
            completed_at: Utc::now(),
        })
    }
}

/// Events emitted by analysis runs
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    Completed { run_id: u64, outcome: AnalysisOutcome },
    Failed { run_id: u64, error: AnalysisError },
}

impl AnalysisEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            AnalysisEvent::Completed { run_id, .. } | AnalysisEvent::Failed { run_id, .. } => {
                *run_id
            }
        }
    }
}

/// Handle to one in-flight analysis run. Dropping it cancels the run.
pub struct AnalysisTask {
    run_id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AnalysisTask {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Stop the run; its completion event will not be sent
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Cancelling analysis run {}", self.run_id);
            self.cancel.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AnalysisTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Reports the outcome of one run when dropped
///
/// Dropping also happens while unwinding, so a panicking analyzer still
/// produces a `Failed` event instead of leaving the run pending forever.
struct RunReport {
    run_id: u64,
    events: mpsc::UnboundedSender<AnalysisEvent>,
    token: CancellationToken,
    notify: Arc<Notify>,
    event: Option<AnalysisEvent>,
}

impl RunReport {
    fn finish(&mut self, result: Result<AnalysisOutcome, AnalysisError>) {
        let run_id = self.run_id;
        self.event = Some(match result {
            Ok(outcome) => AnalysisEvent::Completed { run_id, outcome },
            Err(error) => AnalysisEvent::Failed { run_id, error },
        });
    }
}

impl Drop for RunReport {
    fn drop(&mut self) {
        // A cancel that lands after the analyzer finished still wins
        if self.token.is_cancelled() {
            tracing::debug!("Analysis run {} cancelled", self.run_id);
        } else {
            let event = self.event.take().unwrap_or_else(|| {
                tracing::error!("Analysis run {} ended without a result", self.run_id);
                AnalysisEvent::Failed {
                    run_id: self.run_id,
                    error: AnalysisError::Failed("analysis ended unexpectedly".to_string()),
                }
            });
            if self.events.send(event).is_err() {
                tracing::debug!(
                    "Analysis run {} finished after its receiver closed",
                    self.run_id
                );
            }
        }
        self.notify.notify_one();
    }
}

/// Runs an analyzer in the background and reports completions on a channel
pub struct AnalysisSimulator {
    analyzer: Arc<dyn FrameAnalyzer>,
    events: mpsc::UnboundedSender<AnalysisEvent>,
    notify: Arc<Notify>,
    next_run: AtomicU64,
}

impl AnalysisSimulator {
    /// Create a simulator and the receiver its events arrive on
    pub fn new(analyzer: Arc<dyn FrameAnalyzer>) -> (Self, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                analyzer,
                events,
                notify: Arc::new(Notify::new()),
                next_run: AtomicU64::new(1),
            },
            rx,
        )
    }

    /// Signalled whenever a run ends, whether it reported or was cancelled
    ///
    /// Lets a waiter that cannot hold the receiver know when to look again.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Start analysing `frame`. Exactly one event is sent unless the returned
    /// task is cancelled or dropped first.
    pub fn run(&self, frame: CapturedFrame) -> AnalysisTask {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let analyzer = self.analyzer.clone();
        let report = RunReport {
            run_id,
            events: self.events.clone(),
            token: cancel.clone(),
            notify: self.notify.clone(),
            event: None,
        };
        let token = cancel.clone();

        tracing::info!("Analysis run {} started for frame {}", run_id, frame.id);

        let handle = tokio::spawn(async move {
            let mut report = report;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(AnalysisError::Cancelled),
                result = analyzer.analyze(&frame) => result,
            };
            report.finish(result);
        });

        AnalysisTask {
            run_id,
            cancel,
            handle,
        }
    }
}
