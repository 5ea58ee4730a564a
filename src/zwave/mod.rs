//! Z-Wave protocol vocabulary consumed by the capability layer.
//!
//! The radio/session protocol itself lives behind the [`ZwaveNode`] trait.
//! This module only describes what the capability layer needs from it:
//! the node graph, decoded reports, outbound commands and status requests.

pub mod command_class;
pub mod message;
pub mod node;
pub mod transport;

pub use command_class::{CommandClass, DeviceClassGeneric};
pub use message::{
    ColorComponentId, Command, ConfigurationValue, MeterScale, Report, Request, SensorType,
    ThermostatMode,
};
pub use node::{MultiChannelNode, Node};
pub use transport::{ZwaveNode, configuration_get_with_retry};
