//! Reading-flow Tauri commands
//!
//! One reading screen is open at a time. Entering a flow creates (or reuses)
//! its controller; leaving tears it down, cancelling analysis and releasing
//! the camera.

use super::{AppState, TauriNavigator};
use crate::capture::CapturedFrame;
use crate::flow::{FlowSnapshot, MeterType, Reading, ReadingController};
use crate::utils::{AppError, ErrorResponse};
use std::sync::Arc;
use tauri::{AppHandle, State};

/// Enter the reading flow for `meter_type`
///
/// Resumes at the results step if a completed capture was persisted before
/// a reload.
#[tauri::command]
pub async fn enter_flow(
    app: AppHandle,
    state: State<'_, AppState>,
    meter_type: MeterType,
) -> Result<FlowSnapshot, String> {
    let mut screen = state.screen.lock().await;
    let controller = screen.get_or_insert_with(|| {
        ReadingController::new(
            meter_type,
            state.flags.clone(),
            state.analyzer.clone(),
            Arc::new(TauriNavigator::new(app.clone())),
            state.readings.clone(),
        )
    });

    controller.enter(meter_type);
    Ok(controller.snapshot())
}

/// Leave the reading screen
#[tauri::command]
pub async fn leave_flow(state: State<'_, AppState>) -> Result<(), String> {
    // Abort a camera request first; it holds the screen lock while waiting
    if let Some(token) = state.camera_cancel.lock().take() {
        token.cancel();
    }

    let mut screen = state.screen.lock().await;
    if let Some(mut controller) = screen.take() {
        controller.teardown();
        tracing::info!("Left {} reading screen", controller.flow().meter_type());
    }
    Ok(())
}

/// Get the current flow state
#[tauri::command]
pub async fn get_flow_state(state: State<'_, AppState>) -> Result<Option<FlowSnapshot>, String> {
    let screen = state.screen.lock().await;
    Ok(screen.as_ref().map(ReadingController::snapshot))
}

/// Get the frame being analysed or reviewed
#[tauri::command]
pub async fn get_captured_frame(
    state: State<'_, AppState>,
) -> Result<Option<CapturedFrame>, String> {
    let screen = state.screen.lock().await;
    Ok(screen
        .as_ref()
        .and_then(|controller| controller.flow().captured_frame().cloned()))
}

/// Discard the capture and scan again
#[tauri::command]
pub async fn restart_flow(state: State<'_, AppState>) -> Result<FlowSnapshot, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;
    controller.restart();
    Ok(controller.snapshot())
}

/// Move from results to the confirmation screen
#[tauri::command]
pub async fn review_reading(state: State<'_, AppState>) -> Result<FlowSnapshot, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;
    controller.review().map_err(AppError::from)?;
    Ok(controller.snapshot())
}

/// Save the reading and finish the flow
#[tauri::command]
pub async fn confirm_reading(
    state: State<'_, AppState>,
    value: f64,
) -> Result<Reading, ErrorResponse> {
    let mut screen = state.screen.lock().await;
    let controller = screen.as_mut().ok_or(AppError::NoScreen)?;
    let reading = controller.confirm(value).await.map_err(AppError::from)?;
    Ok(reading)
}

/// Most recent saved reading for `meter_type`
#[tauri::command]
pub async fn get_latest_reading(
    state: State<'_, AppState>,
    meter_type: MeterType,
) -> Result<Option<Reading>, ErrorResponse> {
    let reading = state
        .readings
        .latest(meter_type)
        .map_err(AppError::from)?;
    Ok(reading)
}
