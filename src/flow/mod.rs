//! Meter reading flow
//!
//! This module implements the capture → analysis → results → confirmation
//! flow:
//! - CaptureFlow, the persisted state machine
//! - FlagStore implementations for the durable resume flag
//! - Navigator and ReadingStore collaborator traits
//! - ReadingController to drive one reading screen

pub mod collaborators;
pub mod controller;
pub mod machine;
pub mod store;
pub mod types;

pub use collaborators::{JsonReadingLog, Navigator, ReadingStore, Route, RouteLog};
pub use controller::{ReadingController, ReadingError};
pub use machine::{CaptureFlow, FlowError};
pub use store::{FlagStore, JsonFlagStore, MemoryFlagStore, StoreError};
pub use types::{CaptureStep, FlowSnapshot, MeterType, Reading};
