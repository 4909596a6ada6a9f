//! Still-frame encoding
//!
//! A captured frame is stored as a PNG data URL so the webview can render it
//! directly and the flow can persist it without a side file.

use super::error::CaptureError;
use super::traits::RawFrame;
use crate::flow::MeterType;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// An encoded still image taken from a camera session. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFrame {
    pub id: Uuid,
    pub meter_type: MeterType,
    /// `data:image/png;base64,...`
    pub image_data: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// Encode `raw` into a new frame stamped with the current time
    pub fn encode(raw: &RawFrame, meter_type: MeterType) -> Result<Self, CaptureError> {
        let png = encode_png(raw)?;
        Ok(Self {
            id: Uuid::new_v4(),
            meter_type,
            image_data: to_data_url(&png),
            width: raw.width,
            height: raw.height,
            captured_at: Utc::now(),
        })
    }

    /// Raw PNG bytes of the image
    pub fn png_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let encoded = self
            .image_data
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| CaptureError::Encoding("not a PNG data URL".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CaptureError::Encoding(e.to_string()))
    }
}

/// Encode an RGBA frame as PNG
pub fn encode_png(raw: &RawFrame) -> Result<Vec<u8>, CaptureError> {
    if raw.width == 0 || raw.height == 0 {
        return Err(CaptureError::EmptyFrame);
    }

    let expected = raw.width as usize * raw.height as usize * 4;
    if raw.rgba.len() != expected {
        return Err(CaptureError::Encoding(format!(
            "frame buffer is {} bytes, expected {} for {}x{} RGBA",
            raw.rgba.len(),
            expected,
            raw.width,
            raw.height
        )));
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, raw.width, raw.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        writer
            .write_image_data(&raw.rgba)
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
    }

    Ok(out)
}

fn to_data_url(png: &[u8]) -> String {
    format!(
        "{DATA_URL_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
