//! Digital input event pipeline.
//!
//! Each enabled input claims the next sensor endpoint (ascending index) in
//! the order the profile declares its inputs. That order is fixed for
//! already-paired devices. A report only fires flows when it changes the
//! input state: `toggle` first, then `on` or `off`.

use crate::binding::parsers::{notification_active, sensor_binary_active};
use crate::device::{DeviceRecord, Settings, Value};
use crate::error::{BridgeError, Result};
use crate::flow::FlowTriggers;
use crate::topology::{EndpointPurpose, Topology};
use crate::zwave::message::report_name;
use crate::zwave::{CommandClass, Report, ZwaveNode, configuration_get_with_retry};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;

/// How an input's enablement is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enablement {
    /// Fixed by the profile
    Static(bool),
    /// Read from a configuration parameter; nonzero means enabled
    Parameter(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    pub input_id: u8,
    pub enablement: Enablement,
}

impl InputConfig {
    pub fn enabled(input_id: u8) -> Self {
        Self {
            input_id,
            enablement: Enablement::Static(true),
        }
    }

    pub fn gated(input_id: u8, parameter: u16) -> Self {
        Self {
            input_id,
            enablement: Enablement::Parameter(parameter),
        }
    }
}

/// Setting holding the enablement of an input. The store entry with the
/// same key marks the setting as synced from the device.
pub fn enablement_key(input_id: u8) -> String {
    format!("enableInput{input_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Unknown,
    Off,
    On,
}

impl From<bool> for InputState {
    fn from(active: bool) -> Self {
        if active { InputState::On } else { InputState::Off }
    }
}

/// One input bound to its endpoint.
#[derive(Debug, Clone)]
pub struct InputDescriptor {
    pub input_id: u8,
    pub endpoint: u8,
    pub triggers: FlowTriggers,
    state: InputState,
}

impl InputDescriptor {
    pub fn new(input_id: u8, endpoint: u8) -> Self {
        Self {
            input_id,
            endpoint,
            triggers: FlowTriggers::for_input(input_id),
            state: InputState::Unknown,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    /// Flows to fire for a decoded report; empty when the state is unchanged.
    fn transition(&mut self, active: bool) -> Vec<String> {
        let next = InputState::from(active);
        if next == self.state {
            return Vec::new();
        }
        self.state = next;
        let directional = if active {
            &self.triggers.on
        } else {
            &self.triggers.off
        };
        vec![self.triggers.toggle.clone(), directional.clone()]
    }
}

/// Input reports decoded to a boolean; `None` for other report types.
pub fn decode_input_report(report: &Report) -> Option<bool> {
    match report {
        Report::SensorBinary { sensor_value } => Some(sensor_binary_active(sensor_value)),
        Report::Notification { event } => Some(notification_active(event)),
        _ => None,
    }
}

/// Input descriptors of one device session, keyed by endpoint.
#[derive(Debug, Default)]
pub struct InputPipeline {
    descriptors: BTreeMap<u8, InputDescriptor>,
}

impl InputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptor(mut self, descriptor: InputDescriptor) -> Self {
        self.descriptors.insert(descriptor.endpoint, descriptor);
        self
    }

    pub fn handles(&self, endpoint: u8) -> bool {
        self.descriptors.contains_key(&endpoint)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &InputDescriptor> {
        self.descriptors.values()
    }

    /// Input id to endpoint.
    pub fn assignment(&self) -> BTreeMap<u8, u8> {
        self.descriptors
            .values()
            .map(|d| (d.input_id, d.endpoint))
            .collect()
    }

    /// Feed one report; returns the flow ids to trigger, in order.
    pub fn process(&mut self, endpoint: u8, report: &Report) -> Result<Vec<String>> {
        let descriptor = self
            .descriptors
            .get_mut(&endpoint)
            .ok_or(BridgeError::UnknownInputEndpoint(endpoint))?;
        let Some(active) = decode_input_report(report) else {
            return Ok(Vec::new());
        };
        let flows = descriptor.transition(active);
        if !flows.is_empty() {
            debug!(
                "[Input] Input {} on endpoint {} is now {:?}",
                descriptor.input_id, endpoint, descriptor.state
            );
        }
        Ok(flows)
    }
}

/// Resolve enablement of every configured input and bind the enabled ones
/// to sensor endpoints.
///
/// An input whose enablement cannot be read is skipped; it never fails the
/// registration as a whole.
pub async fn register_inputs(
    node: &dyn ZwaveNode,
    record: &dyn DeviceRecord,
    topology: &Topology,
    configs: &[InputConfig],
    attempts: u32,
    timeout: Duration,
) -> InputPipeline {
    let mut queue = topology.queue(EndpointPurpose::InputSensor);
    let mut pipeline = InputPipeline::new();

    for config in configs {
        let enabled = match config.enablement {
            Enablement::Static(enabled) => enabled,
            Enablement::Parameter(index) => {
                match resolve_enablement(node, record, config.input_id, index, attempts, timeout)
                    .await
                {
                    Some(enabled) => enabled,
                    None => {
                        warn!(
                            "[Input] Cannot determine whether input {} is enabled, skipping",
                            config.input_id
                        );
                        continue;
                    }
                }
            }
        };
        if !enabled {
            debug!("[Input] Input {} disabled", config.input_id);
            continue;
        }

        let Some(endpoint) = queue.claim() else {
            warn!("[Input] No sensor endpoint left for input {}", config.input_id);
            continue;
        };
        for command_class in [CommandClass::SensorBinary, CommandClass::Notification] {
            node.register_report_listener(Some(endpoint), command_class, report_name(command_class));
        }
        info!("[Input] Input {} bound to endpoint {}", config.input_id, endpoint);
        pipeline = pipeline.with_descriptor(InputDescriptor::new(config.input_id, endpoint));
    }

    pipeline
}

async fn resolve_enablement(
    node: &dyn ZwaveNode,
    record: &dyn DeviceRecord,
    input_id: u8,
    index: u16,
    attempts: u32,
    timeout: Duration,
) -> Option<bool> {
    let key = enablement_key(input_id);
    let setting = record.setting(&key).and_then(|v| v.as_f64());
    if let Some(setting) = setting
        && record.store_value(&key).is_some()
    {
        return Some(setting > 0.0);
    }

    let value = configuration_get_with_retry(node, index, attempts, timeout)
        .await
        .map_err(|e| warn!("[Input] {}", e))
        .ok()?;
    if let Err(e) = record.set_store_value(&key, Value::from(value.value)).await {
        warn!("[Input] Failed to mark {} as synced: {}", key, e);
    }
    let synced = Settings::from([(key.clone(), Value::from(value.value.to_string()))]);
    if let Err(e) = record.set_settings(synced).await {
        warn!("[Input] Failed to save {}: {}", key, e);
    }
    Some(value.value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDeviceRecord;
    use crate::simulation::SimulatedNode;
    use crate::zwave::{DeviceClassGeneric, MultiChannelNode, Node};

    fn sensor_node() -> Node {
        Node::new(9)
            .with_endpoint(1, MultiChannelNode::new(DeviceClassGeneric::SwitchBinary))
            .with_endpoint(2, MultiChannelNode::new(DeviceClassGeneric::SensorNotification))
            .with_endpoint(3, MultiChannelNode::new(DeviceClassGeneric::SensorBinary))
    }

    fn detected() -> Report {
        Report::SensorBinary {
            sensor_value: "detected an event".to_string(),
        }
    }

    #[test]
    fn test_transition_fires_toggle_then_direction() {
        let mut pipeline = InputPipeline::new().with_descriptor(InputDescriptor::new(2, 3));

        let flows = pipeline.process(3, &detected()).unwrap();
        assert_eq!(flows, vec!["inputTwoToggled", "inputTwoTurnedOn"]);

        // Identical report is not a transition
        assert!(pipeline.process(3, &detected()).unwrap().is_empty());

        let inactive = Report::Notification {
            event: "Event inactive".to_string(),
        };
        let flows = pipeline.process(3, &inactive).unwrap();
        assert_eq!(flows, vec!["inputTwoToggled", "inputTwoTurnedOff"]);
    }

    #[test]
    fn test_unknown_endpoint() {
        let mut pipeline = InputPipeline::new();
        assert!(matches!(
            pipeline.process(7, &detected()),
            Err(BridgeError::UnknownInputEndpoint(7))
        ));
    }

    #[tokio::test]
    async fn test_inputs_claim_endpoints_in_declared_order() {
        let sim = SimulatedNode::new(sensor_node()).with_parameter(100, 1, 0);
        let record = MemoryDeviceRecord::new();
        let topology = Topology::new(sim.node().clone());
        let configs = [
            InputConfig::gated(2, 100),
            InputConfig::enabled(3),
            InputConfig::enabled(4),
        ];

        let pipeline =
            register_inputs(&sim, &record, &topology, &configs, 3, Duration::from_secs(1)).await;
        // Input 2 is disabled, so input 3 takes the first sensor endpoint
        assert_eq!(pipeline.assignment(), BTreeMap::from([(3, 2), (4, 3)]));
        assert_eq!(record.store_value("enableInput2"), Some(Value::from(0i64)));
        assert_eq!(record.setting("enableInput2"), Some(Value::from("0")));
    }

    #[tokio::test]
    async fn test_failed_enablement_read_skips_only_that_input() {
        let sim = SimulatedNode::new(sensor_node()).with_parameter(100, 1, 1);
        sim.fail_configuration_get(100, 3);
        let record = MemoryDeviceRecord::new();
        let topology = Topology::new(sim.node().clone());
        let configs = [InputConfig::gated(2, 100), InputConfig::enabled(3)];

        let pipeline =
            register_inputs(&sim, &record, &topology, &configs, 3, Duration::from_secs(1)).await;
        assert_eq!(sim.configuration_get_calls(100), 3);
        assert_eq!(pipeline.assignment(), BTreeMap::from([(3, 2)]));
        assert_eq!(record.store_value("enableInput2"), None);
    }

    #[tokio::test]
    async fn test_synced_setting_skips_query() {
        let sim = SimulatedNode::new(sensor_node());
        let record = MemoryDeviceRecord::new()
            .with_store_value("enableInput2", 1i64)
            .with_setting("enableInput2", "1");
        let topology = Topology::new(sim.node().clone());

        let pipeline = register_inputs(
            &sim,
            &record,
            &topology,
            &[InputConfig::gated(2, 100)],
            3,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(sim.configuration_get_calls(100), 0);
        assert!(pipeline.handles(2));
        assert_eq!(sim.listeners().len(), 2);
    }

    #[tokio::test]
    async fn test_setting_wins_over_stale_store() {
        let sim = SimulatedNode::new(sensor_node()).with_parameter(100, 1, 1);
        let record = MemoryDeviceRecord::new()
            .with_store_value("enableInput2", 1i64)
            .with_setting("enableInput2", "0");
        let topology = Topology::new(sim.node().clone());

        let pipeline = register_inputs(
            &sim,
            &record,
            &topology,
            &[InputConfig::gated(2, 100)],
            3,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(sim.configuration_get_calls(100), 0);
        assert!(!pipeline.handles(2));
        assert!(sim.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_unsynced_setting_is_refreshed_from_device() {
        let sim = SimulatedNode::new(sensor_node()).with_parameter(100, 1, 1);
        let record = MemoryDeviceRecord::new().with_setting("enableInput2", "0");
        let topology = Topology::new(sim.node().clone());

        let pipeline = register_inputs(
            &sim,
            &record,
            &topology,
            &[InputConfig::gated(2, 100)],
            3,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(sim.configuration_get_calls(100), 1);
        assert!(pipeline.handles(2));
        assert_eq!(record.setting("enableInput2"), Some(Value::from("1")));
        assert_eq!(record.store_value("enableInput2"), Some(Value::from(1i64)));
    }
}
