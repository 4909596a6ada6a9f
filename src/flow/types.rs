//! Capture flow types
//!
//! Meter types, flow steps, finalized readings and the serializable flow
//! snapshot handed to the frontend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which utility a reading belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    Water,
    Electricity,
}

impl MeterType {
    /// Stable key used by the durable stores
    pub fn key(&self) -> &'static str {
        match self {
            MeterType::Water => "water",
            MeterType::Electricity => "electricity",
        }
    }

    /// Unit the meter counts in
    pub fn unit(&self) -> &'static str {
        match self {
            MeterType::Water => "m³",
            MeterType::Electricity => "kWh",
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where the user is in the capture → analysis → confirmation flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStep {
    Capture,
    Analyzing,
    Results,
    Confirmation,
}

impl Default for CaptureStep {
    fn default() -> Self {
        Self::Capture
    }
}

/// A confirmed meter reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub meter_type: MeterType,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    /// Frame the value was read from; absent when the flow was resumed after a reload
    pub frame_id: Option<Uuid>,
}

/// Frontend view of a capture flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub meter_type: MeterType,
    pub step: CaptureStep,
    pub has_frame: bool,
    pub persisted: bool,
}
