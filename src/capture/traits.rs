//! Media acquisition trait definitions
//!
//! Platform-agnostic view of a live camera: a source that opens streams, and
//! the stream handle it returns. This is the only place platform variance
//! enters the capture pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which way the requested camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user
    Environment,
    /// Front camera
    User,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Constraints passed when requesting a stream
///
/// Kept deliberately loose: mobile browsers reject over-constrained requests
/// far more often than they deliver a poor picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    pub facing_mode: Option<FacingMode>,
    pub ideal_resolution: Option<Resolution>,
}

impl StreamConstraints {
    /// Rear camera, nothing else
    pub fn rear_minimal() -> Self {
        Self {
            facing_mode: Some(FacingMode::Environment),
            ideal_resolution: None,
        }
    }

    /// Any camera at all
    pub fn unconstrained() -> Self {
        Self {
            facing_mode: None,
            ideal_resolution: None,
        }
    }
}

/// Information about a camera device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// A single decoded frame in RGBA8 layout
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Failures reported by the platform media layer
///
/// Variants mirror the DOMException names browsers raise from `getUserMedia`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    NotAllowed(String),

    #[error("Insecure context: {0}")]
    Security(String),

    #[error("No camera found: {0}")]
    NotFound(String),

    #[error("Camera not readable: {0}")]
    NotReadable(String),

    #[error("Camera request aborted: {0}")]
    Aborted(String),

    #[error("Constraints cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("Camera request timed out")]
    Timeout,

    #[error("Media error: {0}")]
    Other(String),
}

impl MediaError {
    /// Map a DOMException name (`NotAllowedError`, ...) to a media error
    pub fn from_dom_exception(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name {
            "NotAllowedError" | "PermissionDeniedError" => Self::NotAllowed(message),
            "SecurityError" => Self::Security(message),
            "NotFoundError" | "DevicesNotFoundError" => Self::NotFound(message),
            "NotReadableError" | "TrackStartError" => Self::NotReadable(message),
            "AbortError" => Self::Aborted(message),
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                Self::Overconstrained(message)
            }
            _ => Self::Other(format!("{name}: {message}")),
        }
    }
}

/// Opens live camera streams
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Human readable backend name, for logs
    fn name(&self) -> &str;

    /// Request a live stream. Resolves once the platform has granted access
    /// and negotiated the stream.
    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn StreamHandle>, MediaError>;
}

/// Exclusive ownership of one live stream
///
/// Implementations must release the hardware in `stop` and also when dropped.
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Wait until the video source reports decodable dimensions
    async fn wait_ready(&mut self) -> Result<Resolution, MediaError>;

    /// Render the current video frame
    fn grab_frame(&mut self) -> Result<RawFrame, MediaError>;

    /// Release the stream. Idempotent.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_exception_mapping() {
        assert!(matches!(
            MediaError::from_dom_exception("NotAllowedError", "denied"),
            MediaError::NotAllowed(_)
        ));
        assert!(matches!(
            MediaError::from_dom_exception("NotReadableError", "busy"),
            MediaError::NotReadable(_)
        ));
        assert!(matches!(
            MediaError::from_dom_exception("OverconstrainedError", "facingMode"),
            MediaError::Overconstrained(_)
        ));
        assert_eq!(
            MediaError::from_dom_exception("TypeError", "bad"),
            MediaError::Other("TypeError: bad".to_string())
        );
    }

    #[test]
    fn test_rear_minimal_has_no_resolution() {
        let c = StreamConstraints::rear_minimal();
        assert_eq!(c.facing_mode, Some(FacingMode::Environment));
        assert!(c.ideal_resolution.is_none());
    }
}
