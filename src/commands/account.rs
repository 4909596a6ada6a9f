//! Account and app information commands

use super::AppState;
use crate::account::UserProfile;
use crate::utils::{AppError, ErrorResponse};
use serde::{Deserialize, Serialize};

/// Basic information about the running app
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub os: String,
    pub data_dir: String,
}

/// Get basic app information
#[tauri::command]
pub async fn get_app_info(state: tauri::State<'_, AppState>) -> Result<AppInfo, String> {
    Ok(AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        os: std::env::consts::OS.to_string(),
        data_dir: state.config.data_dir.display().to_string(),
    })
}

/// Get the signed-in user's profile, fetching it on first use
#[tauri::command]
pub async fn get_profile(state: tauri::State<'_, AppState>) -> Result<UserProfile, ErrorResponse> {
    let profile = state.profiles.get().await.map_err(AppError::from)?;
    Ok((*profile).clone())
}

/// Fetch the profile again
#[tauri::command]
pub async fn refresh_profile(
    state: tauri::State<'_, AppState>,
) -> Result<UserProfile, ErrorResponse> {
    let profile = state.profiles.refresh().await.map_err(AppError::from)?;
    Ok((*profile).clone())
}

/// Forget the cached profile
#[tauri::command]
pub async fn sign_out(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.profiles.invalidate().await;
    tracing::info!("Profile cache cleared");
    Ok(())
}
