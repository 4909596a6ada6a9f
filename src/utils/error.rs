//! Error types and handling
//!
//! Common error types used across the application.

use crate::account::AccountError;
use crate::capture::{CaptureError, ErrorKind};
use crate::config::ConfigError;
use crate::flow::{FlowError, ReadingError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No reading screen is open")]
    NoScreen,

    #[error("No camera session is open")]
    NoCamera,
}

impl From<ReadingError> for AppError {
    fn from(error: ReadingError) -> Self {
        match error {
            ReadingError::Capture(e) => AppError::Capture(e),
            ReadingError::Flow(e) => AppError::Flow(e),
            ReadingError::NoCamera => AppError::NoCamera,
        }
    }
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Capture(CaptureError::Camera(info)) => match info.kind {
                ErrorKind::PermissionDenied => "PERMISSION_DENIED",
                ErrorKind::DeviceUnavailable => "DEVICE_UNAVAILABLE",
                ErrorKind::StreamStartFailed => "STREAM_START_FAILED",
            },
            AppError::Capture(CaptureError::InvalidState { .. }) => "INVALID_TRANSITION",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Flow(FlowError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            AppError::Flow(FlowError::SaveFailed(_)) => "SAVE_FAILED",
            AppError::Flow(_) => "FLOW_ERROR",
            AppError::Store(_) => "STORAGE_ERROR",
            AppError::Account(AccountError::Unauthenticated) => "UNAUTHENTICATED",
            AppError::Account(_) => "ACCOUNT_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::NoScreen => "NO_SCREEN",
            AppError::NoCamera => "NO_CAMERA",
        };

        // Camera failures carry their own user-facing remediation text
        let message = match &error {
            AppError::Capture(CaptureError::Camera(info)) => info.platform_hint.clone(),
            _ => error.to_string(),
        };

        ErrorResponse {
            code: code.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ErrorInfo;
    use crate::flow::CaptureStep;

    #[test]
    fn test_camera_error_response_uses_hint() {
        let info = ErrorInfo {
            kind: ErrorKind::PermissionDenied,
            platform_hint: "Allow the camera".to_string(),
        };
        let response = ErrorResponse::from(AppError::from(CaptureError::Camera(info)));
        assert_eq!(response.code, "PERMISSION_DENIED");
        assert_eq!(response.message, "Allow the camera");
    }

    #[test]
    fn test_invalid_transition_code() {
        let error = FlowError::InvalidTransition {
            operation: "confirm",
            step: CaptureStep::Capture,
        };
        let response = ErrorResponse::from(AppError::from(ReadingError::Flow(error)));
        assert_eq!(response.code, "INVALID_TRANSITION");
    }

    #[test]
    fn test_missing_camera_is_not_a_missing_screen() {
        let response = ErrorResponse::from(AppError::from(ReadingError::NoCamera));
        assert_eq!(response.code, "NO_CAMERA");
        assert_eq!(response.message, "No camera session is open");

        let response = ErrorResponse::from(AppError::NoScreen);
        assert_eq!(response.code, "NO_SCREEN");
    }
}
