//! Camera capture
//!
//! This module provides the camera session and the media sources it can run
//! against: a virtual source everywhere, and native webcams behind the
//! `native-camera` feature.

pub mod error;
pub mod frame;
pub mod scripted;
pub mod session;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod native;

pub use error::{CaptureError, ErrorInfo, ErrorKind};
pub use frame::CapturedFrame;
pub use scripted::{ScriptedOutcome, ScriptedSource};
pub use session::{CameraSession, LifecycleState, PermissionState, SessionStatus};
pub use traits::{FacingMode, MediaError, MediaSource, RawFrame, Resolution, StreamConstraints, StreamHandle};
