//! Z-Wave capability bridge library.
//!
//! Maps Qubino flush and DIN modules onto hub capabilities: endpoint
//! topology, one-time migration of legacy settings, capability bindings,
//! digital input flows and the RGBW light aggregator. The radio transport
//! and the hub's device storage are collaborators behind traits.

pub mod binding;
pub mod config;
pub mod device;
pub mod error;
pub mod flow;
pub mod input;
pub mod migration;
pub mod profiles;
pub mod rgbw;
pub mod settings;
pub mod simulation;
pub mod topology;
pub mod zwave;
