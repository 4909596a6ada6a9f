//! External collaborators of the capture flow
//!
//! The flow does not own routing or reading persistence; it talks to them
//! through these traits.

use super::store::StoreError;
use super::types::{MeterType, Reading};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Screens the flow can ask the shell to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", content = "meterType", rename_all = "camelCase")]
pub enum Route {
    Capture(MeterType),
    Results(MeterType),
    Confirmation(MeterType),
    Home,
}

/// Performs screen transitions on behalf of the flow
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only remembers what it was asked to do
#[derive(Default)]
pub struct RouteLog {
    routes: Mutex<Vec<Route>>,
}

impl RouteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes.lock().last().copied()
    }
}

impl Navigator for RouteLog {
    fn navigate(&self, route: Route) {
        tracing::debug!("Navigate to {:?}", route);
        self.routes.lock().push(route);
    }
}

/// Accepts finalized readings
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save_reading(&self, reading: &Reading) -> Result<(), StoreError>;
}

/// Reading store that appends to a local JSON array
pub struct JsonReadingLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonReadingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// All readings saved so far, oldest first
    pub fn list(&self) -> Result<Vec<Reading>, StoreError> {
        let _guard = self.lock.lock();
        self.load()
    }

    /// Most recent reading for `meter_type`
    pub fn latest(&self, meter_type: MeterType) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.meter_type == meter_type)
            .max_by_key(|r| r.recorded_at))
    }

    fn load(&self) -> Result<Vec<Reading>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[async_trait]
impl ReadingStore for JsonReadingLog {
    async fn save_reading(&self, reading: &Reading) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut readings = self.load()?;
        readings.push(reading.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&readings)?)?;

        tracing::info!(
            "Saved {} reading {} {}",
            reading.meter_type,
            reading.value,
            reading.meter_type.unit()
        );
        Ok(())
    }
}
