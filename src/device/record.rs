use super::capability::Capability;
use super::value::{Settings, Value};
use crate::error::Result;
use async_trait::async_trait;

/// Hub-side representation of one device.
///
/// Implemented by the hub's storage backend. Reads are synchronous snapshots;
/// writes are asynchronous and may fail.
#[async_trait]
pub trait DeviceRecord: Send + Sync + 'static {
    fn setting(&self, key: &str) -> Option<Value>;

    /// Snapshot of every setting the record currently declares.
    fn settings(&self) -> Settings;

    /// Merge the given settings into the stored map in one batch.
    async fn set_settings(&self, settings: Settings) -> Result<()>;

    fn store_value(&self, key: &str) -> Option<Value>;

    async fn set_store_value(&self, key: &str, value: Value) -> Result<()>;

    fn has_capability(&self, capability: Capability) -> bool;

    /// Declared capabilities in declaration order.
    fn capabilities(&self) -> Vec<Capability>;

    async fn add_capability(&self, capability: Capability) -> Result<()>;

    async fn remove_capability(&self, capability: Capability) -> Result<()>;

    fn capability_value(&self, capability: Capability) -> Option<Value>;

    async fn set_capability_value(&self, capability: Capability, value: Value) -> Result<()>;

    async fn set_available(&self) -> Result<()>;

    async fn set_unavailable(&self, reason: &str) -> Result<()>;
}
