//! Capture flow state machine
//!
//! `Capture -> Analyzing -> Results -> (Confirmation) -> confirmed`, with
//! `restart` available from anywhere. Steps only move on camera output,
//! analysis completion or explicit user action.

use super::collaborators::ReadingStore;
use super::store::{FlagStore, StoreError};
use super::types::{CaptureStep, FlowSnapshot, MeterType, Reading};
use crate::capture::CapturedFrame;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

/// Flow errors
#[derive(Error, Debug)]
pub enum FlowError {
    /// A caller drove the state machine out of order
    #[error("Cannot {operation} from step {step:?}")]
    InvalidTransition {
        operation: &'static str,
        step: CaptureStep,
    },

    #[error("Frame is for {frame:?} but the flow is reading {flow:?}")]
    MeterMismatch { frame: MeterType, flow: MeterType },

    #[error("Invalid reading value: {0}")]
    InvalidValue(f64),

    #[error("Failed to save reading: {0}")]
    SaveFailed(#[source] StoreError),
}

impl From<FlowError> for String {
    fn from(e: FlowError) -> String {
        e.to_string()
    }
}

pub struct CaptureFlow {
    meter_type: MeterType,
    step: CaptureStep,
    captured_frame: Option<CapturedFrame>,
    persisted_flag: bool,
    flags: Arc<dyn FlagStore>,
}

impl CaptureFlow {
    pub fn new(meter_type: MeterType, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            meter_type,
            step: CaptureStep::Capture,
            captured_frame: None,
            persisted_flag: false,
            flags,
        }
    }

    pub fn meter_type(&self) -> MeterType {
        self.meter_type
    }

    pub fn step(&self) -> CaptureStep {
        self.step
    }

    pub fn captured_frame(&self) -> Option<&CapturedFrame> {
        self.captured_frame.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted_flag
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            meter_type: self.meter_type,
            step: self.step,
            has_frame: self.captured_frame.is_some(),
            persisted: self.persisted_flag,
        }
    }

    /// Enter the flow for `meter_type`
    ///
    /// Starts fresh at `Capture`, unless a completed capture for this meter
    /// was persisted earlier, in which case the flow resumes at `Results`.
    pub fn begin(&mut self, meter_type: MeterType) -> CaptureStep {
        self.meter_type = meter_type;
        self.captured_frame = None;

        let resumed = match self.flags.read(meter_type) {
            Ok(flag) => flag,
            Err(e) => {
                tracing::warn!("Could not read {} capture flag: {}", meter_type, e);
                false
            }
        };

        if resumed {
            self.step = CaptureStep::Results;
            self.persisted_flag = true;
            tracing::info!("Resuming {} flow at results", meter_type);
        } else {
            self.step = CaptureStep::Capture;
            self.persisted_flag = false;
            tracing::info!("Starting {} flow", meter_type);
        }
        self.step
    }

    /// Record a captured frame and move to `Analyzing`
    pub fn on_frame_captured(&mut self, frame: CapturedFrame) -> Result<(), FlowError> {
        if self.step != CaptureStep::Capture {
            return Err(self.invalid("record a captured frame"));
        }
        if frame.meter_type != self.meter_type {
            return Err(FlowError::MeterMismatch {
                frame: frame.meter_type,
                flow: self.meter_type,
            });
        }

        tracing::info!("Frame {} captured, analysing", frame.id);
        self.captured_frame = Some(frame);
        self.step = CaptureStep::Analyzing;
        self.persist(true);
        Ok(())
    }

    /// Analysis finished; move to `Results`
    pub fn on_analysis_complete(&mut self) -> Result<(), FlowError> {
        if self.step != CaptureStep::Analyzing {
            return Err(self.invalid("complete analysis"));
        }

        self.step = CaptureStep::Results;
        self.persist(true);
        tracing::info!("{} analysis complete", self.meter_type);
        Ok(())
    }

    /// Move from `Results` to the confirmation step
    pub fn review(&mut self) -> Result<(), FlowError> {
        if self.step != CaptureStep::Results {
            return Err(self.invalid("review"));
        }
        self.step = CaptureStep::Confirmation;
        Ok(())
    }

    /// Throw away the capture and go back to the camera. Valid from any step.
    pub fn restart(&mut self) {
        tracing::info!("Restarting {} flow from {:?}", self.meter_type, self.step);
        self.captured_frame = None;
        self.step = CaptureStep::Capture;
        self.persist(false);
    }

    /// Hand the reading to `readings` and finish the flow
    ///
    /// On a save failure the step and frame are kept so the user can retry.
    pub async fn confirm(
        &mut self,
        value: f64,
        readings: &dyn ReadingStore,
    ) -> Result<Reading, FlowError> {
        if !matches!(self.step, CaptureStep::Results | CaptureStep::Confirmation) {
            return Err(self.invalid("confirm"));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(FlowError::InvalidValue(value));
        }

        let reading = Reading {
            meter_type: self.meter_type,
            value,
            recorded_at: Utc::now(),
            frame_id: self.captured_frame.as_ref().map(|f| f.id),
        };

        if let Err(e) = readings.save_reading(&reading).await {
            tracing::warn!("Saving {} reading failed: {}", self.meter_type, e);
            return Err(FlowError::SaveFailed(e));
        }

        self.captured_frame = None;
        self.step = CaptureStep::Capture;
        self.persist(false);
        tracing::info!("{} reading confirmed", self.meter_type);
        Ok(reading)
    }

    fn persist(&mut self, completed: bool) {
        match self.flags.write(self.meter_type, completed) {
            Ok(()) => self.persisted_flag = completed,
            Err(e) => {
                // The flow keeps working in memory; only reload resumption is lost
                tracing::warn!("Could not persist {} capture flag: {}", self.meter_type, e);
            }
        }
    }

    fn invalid(&self, operation: &'static str) -> FlowError {
        tracing::error!(
            "Invalid capture flow transition: {} from {:?}",
            operation,
            self.step
        );
        FlowError::InvalidTransition {
            operation,
            step: self.step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawFrame;
    use crate::flow::store::MemoryFlagStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn frame(meter_type: MeterType) -> CapturedFrame {
        let raw = RawFrame {
            width: 2,
            height: 2,
            rgba: vec![10; 16],
        };
        CapturedFrame::encode(&raw, meter_type).unwrap()
    }

    #[derive(Default)]
    struct Readings {
        saved: Mutex<Vec<Reading>>,
        fail: bool,
    }

    #[async_trait]
    impl ReadingStore for Readings {
        async fn save_reading(&self, reading: &Reading) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Remote("offline".to_string()));
            }
            self.saved.lock().push(reading.clone());
            Ok(())
        }
    }

    fn flow() -> (CaptureFlow, Arc<MemoryFlagStore>) {
        let flags = Arc::new(MemoryFlagStore::new());
        let mut flow = CaptureFlow::new(MeterType::Water, flags.clone());
        flow.begin(MeterType::Water);
        (flow, flags)
    }

    #[test]
    fn test_frame_moves_to_analyzing_and_persists() {
        let (mut flow, flags) = flow();

        flow.on_frame_captured(frame(MeterType::Water)).unwrap();

        assert_eq!(flow.step(), CaptureStep::Analyzing);
        assert!(flow.captured_frame().is_some());
        assert!(flow.is_persisted());
        assert!(flags.read(MeterType::Water).unwrap());
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        let (mut flow, _) = flow();

        assert!(matches!(
            flow.on_analysis_complete(),
            Err(FlowError::InvalidTransition { .. })
        ));
        assert!(flow.review().is_err());

        flow.on_frame_captured(frame(MeterType::Water)).unwrap();
        assert!(matches!(
            flow.on_frame_captured(frame(MeterType::Water)),
            Err(FlowError::InvalidTransition {
                step: CaptureStep::Analyzing,
                ..
            })
        ));

        flow.on_analysis_complete().unwrap();
        assert!(flow.on_analysis_complete().is_err());
        assert_eq!(flow.step(), CaptureStep::Results);
    }

    #[test]
    fn test_wrong_meter_frame_is_rejected() {
        let (mut flow, _) = flow();
        assert!(matches!(
            flow.on_frame_captured(frame(MeterType::Electricity)),
            Err(FlowError::MeterMismatch { .. })
        ));
        assert_eq!(flow.step(), CaptureStep::Capture);
    }

    #[test]
    fn test_restart_from_every_step() {
        for stop_at in 0..4 {
            let (mut flow, flags) = flow();
            if stop_at >= 1 {
                flow.on_frame_captured(frame(MeterType::Water)).unwrap();
            }
            if stop_at >= 2 {
                flow.on_analysis_complete().unwrap();
            }
            if stop_at >= 3 {
                flow.review().unwrap();
            }

            flow.restart();

            assert_eq!(flow.step(), CaptureStep::Capture);
            assert!(flow.captured_frame().is_none());
            assert!(!flags.read(MeterType::Water).unwrap());
            assert_eq!(flow.begin(MeterType::Water), CaptureStep::Capture);
        }
    }

    #[test]
    fn test_reload_resumes_at_results() {
        let (mut flow, flags) = flow();
        flow.on_frame_captured(frame(MeterType::Water)).unwrap();
        flow.on_analysis_complete().unwrap();

        let mut reloaded = CaptureFlow::new(MeterType::Water, flags.clone());
        assert_eq!(reloaded.begin(MeterType::Water), CaptureStep::Results);
        assert!(reloaded.is_persisted());

        // Other meters are unaffected
        let mut other = CaptureFlow::new(MeterType::Electricity, flags);
        assert_eq!(other.begin(MeterType::Electricity), CaptureStep::Capture);
    }

    #[tokio::test]
    async fn test_confirm_saves_and_clears_flag() {
        let (mut flow, flags) = flow();
        let readings = Readings::default();
        let captured = frame(MeterType::Water);
        let frame_id = captured.id;
        flow.on_frame_captured(captured).unwrap();
        flow.on_analysis_complete().unwrap();
        flow.review().unwrap();

        let reading = flow.confirm(42.5, &readings).await.unwrap();

        assert_eq!(reading.value, 42.5);
        assert_eq!(reading.frame_id, Some(frame_id));
        assert_eq!(readings.saved.lock().len(), 1);
        assert_eq!(flow.step(), CaptureStep::Capture);
        assert!(!flags.read(MeterType::Water).unwrap());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_results() {
        let (mut flow, flags) = flow();
        let readings = Readings {
            fail: true,
            ..Default::default()
        };
        flow.on_frame_captured(frame(MeterType::Water)).unwrap();
        flow.on_analysis_complete().unwrap();

        let err = flow.confirm(42.5, &readings).await.unwrap_err();

        assert!(matches!(err, FlowError::SaveFailed(_)));
        assert_eq!(flow.step(), CaptureStep::Results);
        assert!(flow.captured_frame().is_some());
        assert!(flags.read(MeterType::Water).unwrap());
    }

    #[tokio::test]
    async fn test_confirm_requires_results() {
        let (mut flow, _) = flow();
        let readings = Readings::default();
        assert!(flow.confirm(1.0, &readings).await.is_err());

        flow.on_frame_captured(frame(MeterType::Water)).unwrap();
        flow.on_analysis_complete().unwrap();
        assert!(matches!(
            flow.confirm(f64::NAN, &readings).await,
            Err(FlowError::InvalidValue(_))
        ));
    }
}
