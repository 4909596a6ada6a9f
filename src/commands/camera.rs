//! Camera-related Tauri commands

use super::AppState;
use crate::capture::native::{list_cameras, NativeSource};
use crate::capture::traits::CameraInfo;
use crate::capture::{CameraSession, MediaSource, ScriptedSource, SessionStatus};
use crate::config::AppConfig;
use crate::device::{DeviceProfile, EnvironmentSignals};
use crate::flow::{FlowSnapshot, ReadingController};
use crate::utils::{AppError, ErrorResponse};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tauri::{AppHandle, Manager, State};

/// Record the environment the webview runs in
///
/// Only the first report counts; the profile does not change while the app
/// is running.
#[tauri::command]
pub fn detect_device(state: State<'_, AppState>, signals: EnvironmentSignals) -> DeviceProfile {
    let detected = DeviceProfile::detect(&signals);
    let profile = *state.device.get_or_init(|| detected);
    if profile != detected {
        tracing::debug!("Device profile already set, ignoring {:?}", detected);
    }
    profile
}

/// Same as [`detect_device`], from a percent-encoded launch query
#[tauri::command]
pub fn detect_device_from_query(state: State<'_, AppState>, query: String) -> DeviceProfile {
    detect_device(state, EnvironmentSignals::from_query(&query))
}

/// Get list of available cameras/webcams
#[tauri::command]
pub async fn get_cameras() -> Result<Vec<CameraInfo>, String> {
    Ok(list_cameras())
}

fn media_source(config: &AppConfig) -> Arc<dyn MediaSource> {
    if config.virtual_camera {
        return Arc::new(ScriptedSource::granting(1280, 720));
    }
    if list_cameras().is_empty() {
        tracing::warn!("No camera found, using the virtual camera");
        return Arc::new(ScriptedSource::granting(1280, 720));
    }
    Arc::new(NativeSource::new(None))
}

/// Open a camera session for the current reading screen
#[tauri::command]
pub async fn open_camera(state: State<'_, AppState>) -> Result<SessionStatus, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;

    let session = CameraSession::new(
        media_source(&state.config),
        state.device_profile(),
        controller.flow().meter_type(),
    )
    .with_acquire_timeout(state.config.camera_timeout());
    *state.camera_cancel.lock() = Some(session.cancel_token());

    let result = controller.open_camera(session).await;
    let status = controller.camera_status();
    result.map_err(AppError::from)?;
    status.ok_or_else(|| AppError::NoScreen.into())
}

/// Retry the camera after a failure
#[tauri::command]
pub async fn retry_camera(state: State<'_, AppState>) -> Result<SessionStatus, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;

    controller.retry_camera().await.map_err(AppError::from)?;
    controller
        .camera_status()
        .ok_or_else(|| AppError::NoScreen.into())
}

/// Get the camera session state
#[tauri::command]
pub async fn camera_status(state: State<'_, AppState>) -> Result<Option<SessionStatus>, String> {
    let screen = state.screen.lock().await;
    Ok(screen.as_ref().and_then(ReadingController::camera_status))
}

/// Take the still frame and start analysing it
///
/// The step changes to `results` (and a navigation event is emitted) when
/// the analysis completes in the background.
#[tauri::command]
pub async fn capture_frame(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<FlowSnapshot, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;

    controller.capture().await.map_err(AppError::from)?;
    state.camera_cancel.lock().take();

    // A pump that is already running picks up the new run on its next pass
    if !state.analysis_pump.swap(true, Ordering::SeqCst) {
        spawn_analysis_pump(app);
    }

    Ok(controller.snapshot())
}

/// Apply analysis results as runs end, until no run is pending
///
/// Waits on the current screen's notifier rather than holding the screen
/// lock, so restart and leave stay responsive during analysis.
fn spawn_analysis_pump(app: AppHandle) {
    tokio::spawn(async move {
        loop {
            let notify = {
                let state = app.state::<AppState>();
                let mut screen = state.screen.lock().await;
                let pending = screen
                    .as_mut()
                    .is_some_and(ReadingController::poll_analysis);
                match screen.as_ref() {
                    Some(controller) if pending => controller.analysis_notifier(),
                    _ => {
                        state.analysis_pump.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            };
            notify.notified().await;
        }
        tracing::debug!("Analysis pump finished");
    });
}
