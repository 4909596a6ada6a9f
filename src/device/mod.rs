//! Runtime environment detection
//!
//! Classifies the device the app runs on so the camera layer can pick
//! capture constraints and permission remediation text.

pub mod profile;

pub use profile::{DeviceProfile, EnvironmentSignals, PlatformFamily};
