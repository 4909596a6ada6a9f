//! Meter Capture - utility meter readings from the phone camera.
//!
//! This is the main library crate for the Meter Capture application.
//! The reading pipeline (device detection, camera session, capture flow and
//! analysis) builds on its own; the Tauri shell is behind the `app` feature.

pub mod account;
pub mod analysis;
pub mod capture;
pub mod config;
pub mod device;
pub mod flow;
pub mod utils;

#[cfg(feature = "app")]
pub mod commands;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter. Calling this twice is harmless.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meter_capture_lib=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Initialize the application
#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::AppState;

    init_tracing();
    tracing::info!("Starting Meter Capture v{}", env!("CARGO_PKG_VERSION"));

    let state = match prepare_state() {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Startup failed, using default configuration: {:#}", e);
            AppState::new(config::AppConfig::default())
        }
    };

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_fs::init())
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            // Device and camera commands
            commands::camera::detect_device,
            commands::camera::detect_device_from_query,
            commands::camera::get_cameras,
            commands::camera::open_camera,
            commands::camera::retry_camera,
            commands::camera::camera_status,
            commands::camera::capture_frame,
            // Flow commands
            commands::flow::enter_flow,
            commands::flow::leave_flow,
            commands::flow::get_flow_state,
            commands::flow::get_captured_frame,
            commands::flow::restart_flow,
            commands::flow::review_reading,
            commands::flow::confirm_reading,
            commands::flow::get_latest_reading,
            // Account commands
            commands::account::get_app_info,
            commands::account::get_profile,
            commands::account::refresh_profile,
            commands::account::sign_out,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(feature = "app")]
fn prepare_state() -> anyhow::Result<commands::AppState> {
    use anyhow::Context;

    let config = config::AppConfig::load().context("Failed to load configuration")?;
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;
    Ok(commands::AppState::new(config))
}
