//! Camera error classification
//!
//! Platform failures stop at the session boundary. What leaves it is an
//! [`ErrorInfo`]: a coarse kind plus remediation text chosen for the device.

use super::traits::MediaError;
use super::session::LifecycleState;
use crate::device::{DeviceProfile, PlatformFamily};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing camera failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PermissionDenied,
    /// No camera hardware, or it is held by another app
    DeviceUnavailable,
    StreamStartFailed,
}

impl From<&MediaError> for ErrorKind {
    fn from(error: &MediaError) -> Self {
        match error {
            MediaError::NotAllowed(_) | MediaError::Security(_) => Self::PermissionDenied,
            MediaError::NotFound(_) | MediaError::NotReadable(_) | MediaError::Aborted(_) => {
                Self::DeviceUnavailable
            }
            MediaError::Overconstrained(_) | MediaError::Timeout | MediaError::Other(_) => {
                Self::StreamStartFailed
            }
        }
    }
}

/// A classified camera failure with remediation text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub platform_hint: String,
}

const IOS_APP_PERMISSION_HINT: &str = "Camera access is blocked. Open the Settings app, go to \
Privacy & Security > Camera and allow access for this app. Then close the app completely \
(swipe it away in the app switcher) and reopen it from your home screen.";

const IOS_BROWSER_PERMISSION_HINT: &str = "Camera access is blocked. In Safari tap the \"aA\" \
button in the address bar, open Website Settings and set Camera to Allow (or go to Settings > \
Safari > Camera). Then reload the page.";

const ANDROID_APP_PERMISSION_HINT: &str = "Camera access is blocked. Open Settings > Apps, \
select this app, tap Permissions and allow Camera, then try again.";

const ANDROID_BROWSER_PERMISSION_HINT: &str = "Camera access is blocked. Tap the icon next to \
the address bar, open Permissions and allow Camera, then reload the page.";

const GENERIC_PERMISSION_HINT: &str = "Camera permission is required to read your meter. \
Allow camera access in your browser settings and try again.";

const DEVICE_UNAVAILABLE_HINT: &str = "No camera is available. Make sure your device has a \
camera and that no other app is using it, then try again.";

const STREAM_FAILED_HINT: &str = "The camera could not be started. Please try again.";

const IOS_APP_RESTART_SUFFIX: &str = " If it keeps failing, close the app completely and \
reopen it from your home screen.";

impl ErrorInfo {
    /// Classify `error` and pick remediation text for `profile`
    pub fn classify(error: &MediaError, profile: &DeviceProfile) -> Self {
        let kind = ErrorKind::from(error);
        Self {
            kind,
            platform_hint: remediation_hint(kind, profile),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.platform_hint)
    }
}

/// Remediation text for a failure kind on a given device
pub fn remediation_hint(kind: ErrorKind, profile: &DeviceProfile) -> String {
    match kind {
        ErrorKind::PermissionDenied => {
            let hint = match (profile.platform_family, profile.is_installed_app) {
                (PlatformFamily::Ios, true) => IOS_APP_PERMISSION_HINT,
                (PlatformFamily::Ios, false) => IOS_BROWSER_PERMISSION_HINT,
                (PlatformFamily::Android, true) => ANDROID_APP_PERMISSION_HINT,
                (PlatformFamily::Android, false) => ANDROID_BROWSER_PERMISSION_HINT,
                (PlatformFamily::Other, _) => GENERIC_PERMISSION_HINT,
            };
            hint.to_string()
        }
        ErrorKind::DeviceUnavailable => DEVICE_UNAVAILABLE_HINT.to_string(),
        ErrorKind::StreamStartFailed if profile.is_ios_installed_app() => {
            format!("{STREAM_FAILED_HINT}{IOS_APP_RESTART_SUFFIX}")
        }
        ErrorKind::StreamStartFailed => STREAM_FAILED_HINT.to_string(),
    }
}

/// Errors returned by [`CameraSession`](super::CameraSession) operations
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera error: {0}")]
    Camera(ErrorInfo),

    #[error("Cannot {operation} while camera is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Camera request cancelled")]
    Cancelled,

    #[error("Stream error: {0}")]
    Stream(#[from] MediaError),

    #[error("Captured frame is empty")]
    EmptyFrame,

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CaptureError {
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Camera(info) => Some(info),
            _ => None,
        }
    }
}

impl From<CaptureError> for String {
    fn from(e: CaptureError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(platform_family: PlatformFamily, is_installed_app: bool) -> DeviceProfile {
        DeviceProfile {
            is_mobile: platform_family != PlatformFamily::Other,
            platform_family,
            is_installed_app,
        }
    }

    #[test]
    fn test_ios_installed_app_gets_restart_guidance() {
        let info = ErrorInfo::classify(
            &MediaError::NotAllowed("denied".into()),
            &profile(PlatformFamily::Ios, true),
        );
        assert_eq!(info.kind, ErrorKind::PermissionDenied);
        assert!(info.platform_hint.contains("Settings app"));
        assert!(info.platform_hint.contains("reopen it from your home screen"));
    }

    #[test]
    fn test_ios_browser_gets_browser_settings() {
        let info = ErrorInfo::classify(
            &MediaError::NotAllowed("denied".into()),
            &profile(PlatformFamily::Ios, false),
        );
        assert!(info.platform_hint.contains("Safari"));
        assert!(!info.platform_hint.contains("home screen"));
    }

    #[test]
    fn test_desktop_gets_generic_text() {
        let info = ErrorInfo::classify(
            &MediaError::Security("http".into()),
            &profile(PlatformFamily::Other, false),
        );
        assert_eq!(info.kind, ErrorKind::PermissionDenied);
        assert_eq!(info.platform_hint, GENERIC_PERMISSION_HINT);
    }

    #[test]
    fn test_busy_camera_is_unavailable() {
        let info = ErrorInfo::classify(
            &MediaError::NotReadable("in use".into()),
            &profile(PlatformFamily::Android, false),
        );
        assert_eq!(info.kind, ErrorKind::DeviceUnavailable);
    }

    #[test]
    fn test_timeout_is_stream_failure() {
        let info = ErrorInfo::classify(&MediaError::Timeout, &profile(PlatformFamily::Ios, true));
        assert_eq!(info.kind, ErrorKind::StreamStartFailed);
        assert!(info.platform_hint.ends_with(IOS_APP_RESTART_SUFFIX));
    }
}
