//! Reading screen controller
//!
//! Orchestrates one meter-reading screen: the camera session, the capture
//! flow, the analysis run and the requests to the navigation and reading
//! collaborators. Tearing the controller down (or dropping it) cancels any
//! pending analysis and releases the camera.

use super::collaborators::{Navigator, ReadingStore, Route};
use super::machine::{CaptureFlow, FlowError};
use super::store::FlagStore;
use super::types::{CaptureStep, FlowSnapshot, MeterType, Reading};
use crate::analysis::{AnalysisEvent, AnalysisSimulator, AnalysisTask, FrameAnalyzer};
use crate::capture::{CameraSession, CaptureError, CapturedFrame, SessionStatus};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// Errors surfaced by the reading screen
#[derive(Error, Debug)]
pub enum ReadingError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("No camera session is open")]
    NoCamera,
}

impl From<ReadingError> for String {
    fn from(e: ReadingError) -> String {
        e.to_string()
    }
}

pub struct ReadingController {
    flow: CaptureFlow,
    camera: Option<CameraSession>,
    analysis: AnalysisSimulator,
    analysis_events: mpsc::UnboundedReceiver<AnalysisEvent>,
    pending: Option<AnalysisTask>,
    navigator: Arc<dyn Navigator>,
    readings: Arc<dyn ReadingStore>,
}

impl ReadingController {
    pub fn new(
        meter_type: MeterType,
        flags: Arc<dyn FlagStore>,
        analyzer: Arc<dyn FrameAnalyzer>,
        navigator: Arc<dyn Navigator>,
        readings: Arc<dyn ReadingStore>,
    ) -> Self {
        let (analysis, analysis_events) = AnalysisSimulator::new(analyzer);
        Self {
            flow: CaptureFlow::new(meter_type, flags),
            camera: None,
            analysis,
            analysis_events,
            pending: None,
            navigator,
            readings,
        }
    }

    pub fn flow(&self) -> &CaptureFlow {
        &self.flow
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.flow.snapshot()
    }

    pub fn camera_status(&self) -> Option<SessionStatus> {
        self.camera.as_ref().map(CameraSession::status)
    }

    /// Whether an analysis run is waiting to complete
    pub fn analysis_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Enter (or re-enter) the flow for `meter_type` and show its screen
    ///
    /// Whatever the previous screen held is released first: its analysis run
    /// and its camera stream. A fresh session must be opened for the new flow.
    pub fn enter(&mut self, meter_type: MeterType) -> CaptureStep {
        self.teardown();
        let step = self.flow.begin(meter_type);
        self.navigator.navigate(route_for(step, meter_type));
        step
    }

    /// Attach a fresh camera session, closing any previous one first
    pub async fn open_camera(&mut self, mut session: CameraSession) -> Result<(), ReadingError> {
        if let Some(mut previous) = self.camera.take() {
            previous.cleanup();
        }
        let result = session.start().await;
        self.camera = Some(session);
        result.map_err(ReadingError::from)
    }

    /// Retry the attached camera after a failure
    pub async fn retry_camera(&mut self) -> Result<(), ReadingError> {
        let camera = self.camera.as_mut().ok_or(ReadingError::NoCamera)?;
        camera.retry().await?;
        Ok(())
    }

    /// Take the still frame from the attached camera and start analysis
    pub async fn capture(&mut self) -> Result<(), ReadingError> {
        if self.flow.step() != CaptureStep::Capture {
            return Err(FlowError::InvalidTransition {
                operation: "capture",
                step: self.flow.step(),
            }
            .into());
        }
        let camera = self.camera.as_mut().ok_or(ReadingError::NoCamera)?;
        let frame = camera.capture().await?;
        self.camera = None;
        self.on_frame_captured(frame)
    }

    /// Record a frame captured elsewhere and start analysis
    pub fn on_frame_captured(&mut self, frame: CapturedFrame) -> Result<(), ReadingError> {
        self.flow.on_frame_captured(frame.clone())?;
        self.cancel_analysis();
        self.pending = Some(self.analysis.run(frame));
        Ok(())
    }

    /// Wait for the pending analysis run, if any, and apply its result
    ///
    /// Returns the step the flow ended on.
    pub async fn wait_for_analysis(&mut self) -> CaptureStep {
        while self.pending.is_some() {
            match self.analysis_events.recv().await {
                Some(event) => {
                    self.apply_analysis_event(event);
                }
                None => break,
            }
        }
        self.flow.step()
    }

    /// Signalled whenever an analysis run ends; see [`poll_analysis`](Self::poll_analysis)
    pub fn analysis_notifier(&self) -> Arc<Notify> {
        self.analysis.notifier()
    }

    /// Apply analysis events that already arrived, without waiting
    ///
    /// Returns whether a run is still pending.
    pub fn poll_analysis(&mut self) -> bool {
        while self.pending.is_some() {
            match self.analysis_events.try_recv() {
                Ok(event) => {
                    self.apply_analysis_event(event);
                }
                Err(_) => break,
            }
        }
        self.pending.is_some()
    }

    /// Apply an analysis event. Events that do not belong to the pending run
    /// (stale, duplicated or cancelled) are ignored; returns whether it applied.
    pub fn apply_analysis_event(&mut self, event: AnalysisEvent) -> bool {
        let expected = self.pending.as_ref().map(AnalysisTask::run_id);
        if expected != Some(event.run_id()) {
            tracing::debug!(
                "Ignoring analysis event for run {} (pending {:?})",
                event.run_id(),
                expected
            );
            return false;
        }
        self.pending = None;

        match event {
            AnalysisEvent::Completed { .. } => {
                if self.flow.on_analysis_complete().is_err() {
                    return false;
                }
                self.navigator
                    .navigate(Route::Results(self.flow.meter_type()));
                true
            }
            AnalysisEvent::Failed { error, .. } => {
                tracing::warn!("Analysis failed: {}", error);
                self.restart();
                true
            }
        }
    }

    /// "Scan again": drop the capture and return to the camera screen
    pub fn restart(&mut self) {
        self.cancel_analysis();
        self.flow.restart();
        self.navigator.navigate(Route::Capture(self.flow.meter_type()));
    }

    /// Move to the dedicated confirmation screen
    pub fn review(&mut self) -> Result<(), ReadingError> {
        self.flow.review()?;
        self.navigator
            .navigate(Route::Confirmation(self.flow.meter_type()));
        Ok(())
    }

    /// Save the reading. On failure the results stay on screen for a retry.
    pub async fn confirm(&mut self, value: f64) -> Result<Reading, ReadingError> {
        let reading = self.flow.confirm(value, self.readings.as_ref()).await?;
        self.navigator.navigate(Route::Home);
        Ok(reading)
    }

    /// Screen unmount: cancel pending analysis and release the camera
    pub fn teardown(&mut self) {
        self.cancel_analysis();
        if let Some(mut camera) = self.camera.take() {
            camera.cleanup();
        }
    }

    fn cancel_analysis(&mut self) {
        if let Some(task) = self.pending.take() {
            task.cancel();
        }
        // Drop anything a cancelled run managed to send before it stopped
        while self.analysis_events.try_recv().is_ok() {}
    }
}

impl Drop for ReadingController {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn route_for(step: CaptureStep, meter_type: MeterType) -> Route {
    match step {
        CaptureStep::Capture | CaptureStep::Analyzing => Route::Capture(meter_type),
        CaptureStep::Results => Route::Results(meter_type),
        CaptureStep::Confirmation => Route::Confirmation(meter_type),
    }
}
