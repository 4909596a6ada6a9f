//! Camera session lifecycle
//!
//! One `CameraSession` backs one camera screen. It owns at most one live
//! stream handle and releases it on every exit path: capture, error, cleanup,
//! cancellation and drop.

use super::error::{CaptureError, ErrorInfo, ErrorKind};
use super::frame::CapturedFrame;
use super::traits::{MediaError, MediaSource, StreamConstraints, StreamHandle};
use crate::device::DeviceProfile;
use crate::flow::MeterType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Camera permission as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Lifecycle of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    /// Waiting for the platform to grant and negotiate a stream
    Requesting,
    /// Stream attached to the preview
    Active,
    /// Taking the still frame
    Capturing,
    Error,
    /// Terminal; a new session is needed to use the camera again
    Closed,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Serializable view of a session for the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub lifecycle_state: LifecycleState,
    pub permission_state: PermissionState,
    pub last_error: Option<ErrorInfo>,
}

enum AcquireFailure {
    Cancelled,
    Media(MediaError),
}

pub struct CameraSession {
    source: Arc<dyn MediaSource>,
    profile: DeviceProfile,
    meter_type: MeterType,
    stream: Option<Box<dyn StreamHandle>>,
    permission_state: PermissionState,
    lifecycle_state: LifecycleState,
    last_error: Option<ErrorInfo>,
    cancel: CancellationToken,
    acquire_timeout: Option<Duration>,
}

impl CameraSession {
    pub fn new(source: Arc<dyn MediaSource>, profile: DeviceProfile, meter_type: MeterType) -> Self {
        Self {
            source,
            profile,
            meter_type,
            stream: None,
            permission_state: PermissionState::Unknown,
            lifecycle_state: LifecycleState::Idle,
            last_error: None,
            cancel: CancellationToken::new(),
            acquire_timeout: None,
        }
    }

    /// Give up on stream acquisition after `timeout`
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission_state
    }

    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            lifecycle_state: self.lifecycle_state,
            permission_state: self.permission_state,
            last_error: self.last_error.clone(),
        }
    }

    /// Token that tears the session down when cancelled
    ///
    /// Screens hold on to this so they can abort an acquisition that is still
    /// waiting on the permission prompt when they unmount.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request the rear camera and attach it
    ///
    /// A previous attempt that is still requesting or active is torn down
    /// first, so there is never more than one outstanding handle.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        match self.lifecycle_state {
            LifecycleState::Closed | LifecycleState::Capturing => {
                return Err(self.invalid_state("start"));
            }
            LifecycleState::Requesting | LifecycleState::Active => {
                tracing::debug!("Restarting camera session, releasing previous stream");
                self.release_stream();
            }
            LifecycleState::Idle | LifecycleState::Error => {}
        }

        if self.cancel.is_cancelled() {
            self.close();
            return Err(CaptureError::Cancelled);
        }

        self.lifecycle_state = LifecycleState::Requesting;
        self.last_error = None;
        tracing::info!(
            "Requesting {} camera via {}",
            self.meter_type,
            self.source.name()
        );

        match self.acquire().await {
            Ok(handle) => {
                self.stream = Some(handle);
                self.permission_state = PermissionState::Granted;
                self.lifecycle_state = LifecycleState::Active;
                tracing::info!("Camera stream active");
                Ok(())
            }
            Err(AcquireFailure::Cancelled) => {
                tracing::info!("Camera request cancelled");
                self.close();
                Err(CaptureError::Cancelled)
            }
            Err(AcquireFailure::Media(error)) => {
                let info = ErrorInfo::classify(&error, &self.profile);
                tracing::warn!("Failed to start camera: {} ({:?})", error, info.kind);

                if info.kind == ErrorKind::PermissionDenied {
                    self.permission_state = PermissionState::Denied;
                }
                self.lifecycle_state = LifecycleState::Error;
                self.last_error = Some(info.clone());
                Err(CaptureError::Camera(info))
            }
        }
    }

    /// Release the current attempt and request the camera again
    pub async fn retry(&mut self) -> Result<(), CaptureError> {
        if matches!(
            self.lifecycle_state,
            LifecycleState::Closed | LifecycleState::Capturing
        ) {
            return Err(self.invalid_state("retry"));
        }

        self.release_stream();
        self.start().await
    }

    /// Take a still frame and close the session
    ///
    /// Waits for the stream to report decodable dimensions before rendering.
    /// The stream is released whether or not the capture succeeds.
    pub async fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        match self.lifecycle_state {
            LifecycleState::Active => {}
            // An earlier capture was abandoned before it finished; this one replaces it
            LifecycleState::Capturing if self.stream.is_some() => {
                tracing::debug!("Superseding unfinished capture");
            }
            _ => return Err(self.invalid_state("capture")),
        }

        self.lifecycle_state = LifecycleState::Capturing;
        let result = self.grab_still().await;
        self.cleanup();

        match &result {
            Ok(frame) => tracing::info!(
                "Captured {} frame {}x{}",
                frame.meter_type,
                frame.width,
                frame.height
            ),
            Err(e) => tracing::warn!("Capture failed: {}", e),
        }
        result
    }

    /// Release the stream and close the session. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.cancel.cancel();
        self.close();
    }

    fn close(&mut self) {
        self.release_stream();
        if self.lifecycle_state != LifecycleState::Closed {
            tracing::debug!("Camera session closed from {:?}", self.lifecycle_state);
            self.lifecycle_state = LifecycleState::Closed;
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!("Camera stream released");
        }
    }

    async fn acquire(&self) -> Result<Box<dyn StreamHandle>, AcquireFailure> {
        match self.open_with(&StreamConstraints::rear_minimal()).await {
            Err(AcquireFailure::Media(MediaError::Overconstrained(detail))) => {
                tracing::warn!(
                    "Rear camera constraint rejected ({}), retrying unconstrained",
                    detail
                );
                self.open_with(&StreamConstraints::unconstrained()).await
            }
            other => other,
        }
    }

    async fn open_with(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn StreamHandle>, AcquireFailure> {
        let open = async {
            match self.acquire_timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.source.open(constraints))
                    .await
                    .unwrap_or(Err(MediaError::Timeout)),
                None => self.source.open(constraints).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AcquireFailure::Cancelled),
            result = open => result.map_err(AcquireFailure::Media),
        }
    }

    async fn grab_still(&mut self) -> Result<CapturedFrame, CaptureError> {
        let cancel = self.cancel.clone();
        let meter_type = self.meter_type;
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(self.invalid_state("capture")),
        };

        let dimensions = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
            ready = stream.wait_ready() => ready?,
        };
        if dimensions.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }

        let raw = stream.grab_frame()?;
        CapturedFrame::encode(&raw, meter_type)
    }

    fn invalid_state(&self, operation: &'static str) -> CaptureError {
        tracing::error!(
            "Invalid camera operation: {} in state {:?}",
            operation,
            self.lifecycle_state
        );
        CaptureError::InvalidState {
            operation,
            state: self.lifecycle_state,
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{ScriptedOutcome, ScriptedSource};
    use crate::device::PlatformFamily;

    fn ios_app() -> DeviceProfile {
        DeviceProfile {
            is_mobile: true,
            platform_family: PlatformFamily::Ios,
            is_installed_app: true,
        }
    }

    fn session(source: &Arc<ScriptedSource>) -> CameraSession {
        CameraSession::new(source.clone(), DeviceProfile::default(), MeterType::Water)
    }

    #[tokio::test]
    async fn test_start_attaches_stream() {
        let source = Arc::new(ScriptedSource::granting(8, 6));
        let mut session = session(&source);

        session.start().await.unwrap();

        assert_eq!(session.lifecycle_state(), LifecycleState::Active);
        assert_eq!(session.permission_state(), PermissionState::Granted);
        assert!(session.has_stream());
        assert_eq!(source.live_handles(), 1);
        assert_eq!(source.requests()[0], StreamConstraints::rear_minimal());
    }

    #[tokio::test]
    async fn test_repeated_start_never_leaks_handles() {
        let source = Arc::new(ScriptedSource::granting(8, 6));
        let mut session = session(&source);

        for _ in 0..5 {
            session.start().await.unwrap();
            assert_eq!(source.live_handles(), 1);
        }
        session.cleanup();
        session.cleanup();

        assert_eq!(source.live_handles(), 0);
        assert_eq!(source.peak_live_handles(), 1);
        assert_eq!(session.lifecycle_state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_capture_releases_stream() {
        let source = Arc::new(ScriptedSource::granting(8, 6));
        let mut session = session(&source);
        session.start().await.unwrap();

        let frame = session.capture().await.unwrap();

        assert_eq!(frame.meter_type, MeterType::Water);
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(session.lifecycle_state(), LifecycleState::Closed);
        assert_eq!(source.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_capture_requires_active_stream() {
        let source = Arc::new(ScriptedSource::granting(8, 6));
        let mut session = session(&source);

        assert!(matches!(
            session.capture().await,
            Err(CaptureError::InvalidState { .. })
        ));

        session.start().await.unwrap();
        session.capture().await.unwrap();
        // Capture is terminal for the session
        assert!(matches!(
            session.capture().await,
            Err(CaptureError::InvalidState { .. })
        ));
        assert!(session.start().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_sized_stream_yields_no_frame() {
        let source = Arc::new(ScriptedSource::granting(0, 0));
        let mut session = session(&source);
        session.start().await.unwrap();

        assert!(matches!(session.capture().await, Err(CaptureError::EmptyFrame)));
        assert_eq!(source.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_waits_for_stream_ready() {
        let ready_delay = Duration::from_secs(3);
        let source = Arc::new(ScriptedSource::granting(8, 6).with_ready_delay(ready_delay));
        let mut session = session(&source);
        session.start().await.unwrap();

        let started = tokio::time::Instant::now();
        let frame = session.capture().await.unwrap();

        assert!(started.elapsed() >= ready_delay);
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(source.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_ready() {
        let source = Arc::new(
            ScriptedSource::granting(8, 6).with_ready_delay(Duration::from_secs(30)),
        );
        let mut session = session(&source);
        session.start().await.unwrap();
        let token = session.cancel_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let started = tokio::time::Instant::now();
        assert!(matches!(session.capture().await, Err(CaptureError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(session.lifecycle_state(), LifecycleState::Closed);
        assert_eq!(source.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_on_ios_app() {
        let source = Arc::new(ScriptedSource::failing(MediaError::NotAllowed(
            "user denied".into(),
        )));
        let mut session = CameraSession::new(source.clone(), ios_app(), MeterType::Electricity);

        let err = session.start().await.unwrap_err();

        assert_eq!(session.lifecycle_state(), LifecycleState::Error);
        assert_eq!(session.permission_state(), PermissionState::Denied);
        let info = err.error_info().unwrap();
        assert_eq!(info.kind, ErrorKind::PermissionDenied);
        assert!(info.platform_hint.contains("home screen"));
        assert_eq!(session.last_error(), Some(info));
    }

    #[tokio::test]
    async fn test_retry_after_error() {
        let source = Arc::new(ScriptedSource::scripted(vec![
            ScriptedOutcome::Fail(MediaError::NotReadable("busy".into())),
            ScriptedOutcome::Grant {
                width: 8,
                height: 6,
            },
        ]));
        let mut session = session(&source);

        assert!(session.start().await.is_err());
        session.retry().await.unwrap();

        assert_eq!(session.lifecycle_state(), LifecycleState::Active);
        assert!(session.last_error().is_none());
        assert_eq!(source.live_handles(), 1);
    }

    #[tokio::test]
    async fn test_overconstrained_falls_back_to_any_camera() {
        let source = Arc::new(ScriptedSource::scripted(vec![
            ScriptedOutcome::Fail(MediaError::Overconstrained("facingMode".into())),
            ScriptedOutcome::Grant {
                width: 8,
                height: 6,
            },
        ]));
        let mut session = session(&source);

        session.start().await.unwrap();

        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], StreamConstraints::unconstrained());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_request_closes_session() {
        let source = Arc::new(
            ScriptedSource::granting(8, 6).with_open_delay(Duration::from_secs(30)),
        );
        let mut session = session(&source);
        let token = session.cancel_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        assert!(matches!(session.start().await, Err(CaptureError::Cancelled)));
        assert_eq!(session.lifecycle_state(), LifecycleState::Closed);
        assert_eq!(source.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout() {
        let source = Arc::new(
            ScriptedSource::granting(8, 6).with_open_delay(Duration::from_secs(30)),
        );
        let mut session = session(&source).with_acquire_timeout(Some(Duration::from_secs(5)));

        let err = session.start().await.unwrap_err();

        assert_eq!(err.error_info().unwrap().kind, ErrorKind::StreamStartFailed);
        assert_eq!(session.lifecycle_state(), LifecycleState::Error);
    }

    #[tokio::test]
    async fn test_drop_releases_stream() {
        let source = Arc::new(ScriptedSource::granting(8, 6));
        {
            let mut session = session(&source);
            session.start().await.unwrap();
            assert_eq!(source.live_handles(), 1);
        }
        assert_eq!(source.live_handles(), 0);
    }
}
