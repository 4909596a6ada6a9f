//! Tauri command handlers
//!
//! This module contains all the IPC command handlers that can be called
//! from the frontend via Tauri's invoke system.

pub mod account;
pub mod camera;
pub mod flow;

use crate::account::{JsonAccountClient, ProfileCache};
use crate::analysis::{FrameAnalyzer, SimulatedAnalyzer};
use crate::config::AppConfig;
use crate::device::DeviceProfile;
use crate::flow::{
    FlagStore, JsonFlagStore, JsonReadingLog, MemoryFlagStore, Navigator, ReadingController, Route,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use tauri::{AppHandle, Emitter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Event the frontend router listens on
pub const NAVIGATE_EVENT: &str = "navigate";

/// Application state shared by all commands
pub struct AppState {
    pub config: AppConfig,
    /// Computed once from the signals the webview reports at launch
    pub device: OnceLock<DeviceProfile>,
    pub flags: Arc<dyn FlagStore>,
    pub readings: Arc<JsonReadingLog>,
    pub analyzer: Arc<dyn FrameAnalyzer>,
    pub profiles: ProfileCache,
    /// The open reading screen, if any
    pub screen: Mutex<Option<ReadingController>>,
    /// Cancels a camera request still waiting on the platform. Reachable
    /// without the screen lock, which the request holds while it waits.
    pub camera_cancel: parking_lot::Mutex<Option<CancellationToken>>,
    /// Set while a task is applying analysis results; changed under `screen`
    pub analysis_pump: AtomicBool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let flags: Arc<dyn FlagStore> = match JsonFlagStore::open(config.flags_path()) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    "Capture flags unavailable, resume after reload is disabled: {}",
                    e
                );
                Arc::new(MemoryFlagStore::new())
            }
        };

        Self {
            device: OnceLock::new(),
            flags,
            readings: Arc::new(JsonReadingLog::new(config.readings_path())),
            analyzer: Arc::new(SimulatedAnalyzer::new(config.analysis_delay())),
            profiles: ProfileCache::new(Arc::new(JsonAccountClient::new(config.profile_path()))),
            screen: Mutex::new(None),
            camera_cancel: parking_lot::Mutex::new(None),
            analysis_pump: AtomicBool::new(false),
            config,
        }
    }

    /// Device profile, falling back to a desktop profile if the frontend
    /// never reported its environment
    pub fn device_profile(&self) -> DeviceProfile {
        *self.device.get_or_init(|| {
            tracing::warn!("No environment signals received, assuming desktop");
            DeviceProfile::default()
        })
    }
}

/// Navigator that forwards route requests to the frontend as events
pub struct TauriNavigator {
    app: AppHandle,
}

impl TauriNavigator {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl Navigator for TauriNavigator {
    fn navigate(&self, route: Route) {
        tracing::debug!("Navigate to {:?}", route);
        if let Err(e) = self.app.emit(NAVIGATE_EVENT, route) {
            tracing::warn!("Failed to emit navigation: {}", e);
        }
    }
}
