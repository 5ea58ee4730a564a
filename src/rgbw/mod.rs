//! RGBW multi-capability aggregator.
//!
//! - `color`: channel math and HSV conversion
//! - `aggregator`: pure write/report state machine
//! - `controller`: debounce windows and device I/O around the aggregator

pub mod aggregator;
pub mod color;
pub mod controller;

pub use aggregator::{
    ColorComponentState, LightCommand, LightState, LightWrite, ReportDecision, RgbwAggregator,
    WritePlan, derive_capabilities,
};
pub use color::{LightMode, PartialRgbw, Rgbw};
pub use controller::{LightController, LightEvent, LightHandle};
