//! Hub-side device record and the per-device session.
//!
//! The record is the hub's storage collaborator (capabilities, settings,
//! store). The session owns everything that lives for one initialization:
//! resolved topology, capability bindings, input descriptors and the light
//! controller.

pub mod capability;
pub mod memory;
pub mod record;
pub mod session;
pub mod value;

pub use capability::Capability;
pub use memory::{MemoryDeviceRecord, RecordSnapshot};
pub use record::DeviceRecord;
pub use session::DeviceSession;
pub use value::{Settings, Value};
