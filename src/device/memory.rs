//! In-memory device record.
//!
//! Backs the demo binary and the tests. Storage failures can be injected per
//! capability or for all store writes to exercise the error paths.

use super::capability::Capability;
use super::record::DeviceRecord;
use super::value::{Settings, Value};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Serializable state of a [`MemoryDeviceRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub capability_values: BTreeMap<Capability, Value>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub store: BTreeMap<String, Value>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

fn default_available() -> bool {
    true
}

pub struct MemoryDeviceRecord {
    state: RwLock<RecordSnapshot>,
    failing_capabilities: RwLock<BTreeSet<Capability>>,
    fail_store_writes: AtomicBool,
}

impl MemoryDeviceRecord {
    pub fn new() -> Self {
        Self::from_snapshot(RecordSnapshot {
            available: true,
            ..Default::default()
        })
    }

    pub fn from_snapshot(snapshot: RecordSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            failing_capabilities: RwLock::new(BTreeSet::new()),
            fail_store_writes: AtomicBool::new(false),
        }
    }

    pub fn with_capabilities(self, capabilities: &[Capability]) -> Self {
        {
            let mut state = self.state.write();
            for capability in capabilities {
                if !state.capabilities.contains(capability) {
                    state.capabilities.push(*capability);
                }
            }
        }
        self
    }

    pub fn with_setting(self, key: &str, value: impl Into<Value>) -> Self {
        self.state.write().settings.insert(key.to_string(), value.into());
        self
    }

    pub fn with_store_value(self, key: &str, value: impl Into<Value>) -> Self {
        self.state.write().store.insert(key.to_string(), value.into());
        self
    }

    pub fn with_capability_value(self, capability: Capability, value: impl Into<Value>) -> Self {
        self.state
            .write()
            .capability_values
            .insert(capability, value.into());
        self
    }

    /// Make every add/remove of this capability fail.
    pub fn fail_capability(&self, capability: Capability) {
        self.failing_capabilities.write().insert(capability);
    }

    /// Make every store write fail.
    pub fn fail_store_writes(&self, fail: bool) {
        self.fail_store_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        self.state.read().clone()
    }

    pub fn is_available(&self) -> bool {
        self.state.read().available
    }

    pub fn unavailable_reason(&self) -> Option<String> {
        self.state.read().unavailable_reason.clone()
    }

    fn check_capability(&self, capability: Capability) -> Result<()> {
        if self.failing_capabilities.read().contains(&capability) {
            return Err(BridgeError::Storage(format!(
                "capability {capability} is locked"
            )));
        }
        Ok(())
    }
}

impl Default for MemoryDeviceRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRecord for MemoryDeviceRecord {
    fn setting(&self, key: &str) -> Option<Value> {
        self.state.read().settings.get(key).cloned()
    }

    fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    async fn set_settings(&self, settings: Settings) -> Result<()> {
        self.state.write().settings.extend(settings);
        Ok(())
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.state.read().store.get(key).cloned()
    }

    async fn set_store_value(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_store_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage(format!("store write {key} rejected")));
        }
        self.state.write().store.insert(key.to_string(), value);
        Ok(())
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.state.read().capabilities.contains(&capability)
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.state.read().capabilities.clone()
    }

    async fn add_capability(&self, capability: Capability) -> Result<()> {
        self.check_capability(capability)?;
        let mut state = self.state.write();
        if !state.capabilities.contains(&capability) {
            state.capabilities.push(capability);
        }
        Ok(())
    }

    async fn remove_capability(&self, capability: Capability) -> Result<()> {
        self.check_capability(capability)?;
        let mut state = self.state.write();
        state.capabilities.retain(|c| *c != capability);
        state.capability_values.remove(&capability);
        Ok(())
    }

    fn capability_value(&self, capability: Capability) -> Option<Value> {
        self.state.read().capability_values.get(&capability).cloned()
    }

    async fn set_capability_value(&self, capability: Capability, value: Value) -> Result<()> {
        let mut state = self.state.write();
        if !state.capabilities.contains(&capability) {
            return Err(BridgeError::Storage(format!(
                "capability {capability} is not declared"
            )));
        }
        state.capability_values.insert(capability, value);
        Ok(())
    }

    async fn set_available(&self) -> Result<()> {
        let mut state = self.state.write();
        state.available = true;
        state.unavailable_reason = None;
        Ok(())
    }

    async fn set_unavailable(&self, reason: &str) -> Result<()> {
        let mut state = self.state.write();
        state.available = false;
        state.unavailable_reason = Some(reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capability_add_remove_is_idempotent() {
        let record = MemoryDeviceRecord::new().with_capabilities(&[Capability::Onoff]);

        record.add_capability(Capability::Onoff).await.unwrap();
        record.add_capability(Capability::Dim).await.unwrap();
        assert_eq!(
            record.capabilities(),
            vec![Capability::Onoff, Capability::Dim]
        );

        record.remove_capability(Capability::Onoff).await.unwrap();
        record.remove_capability(Capability::Onoff).await.unwrap();
        assert_eq!(record.capabilities(), vec![Capability::Dim]);
    }

    #[tokio::test]
    async fn test_undeclared_capability_value_is_rejected() {
        let record = MemoryDeviceRecord::new();
        let result = record
            .set_capability_value(Capability::Onoff, Value::Bool(true))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let record = MemoryDeviceRecord::new();
        record.fail_store_writes(true);
        assert!(record.set_store_value("k", Value::Bool(true)).await.is_err());

        record.fail_capability(Capability::ResetMeter);
        assert!(record.add_capability(Capability::ResetMeter).await.is_err());
    }
}
