//! Per-device session.
//!
//! [`DeviceSession::initialize`] runs the full initialization of a paired
//! device: migration, multi-channel reporting setup, capability
//! registration, temperature sensor and digital inputs, then the optional
//! light task and shutter calibration. Afterwards the session routes
//! incoming reports and hub writes.

use super::{Capability, DeviceRecord, Settings, Value};
use crate::binding::{BindOptions, BindOutcome, BindingRegistry, Effect};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::flow::{FlowSink, trigger_flow};
use crate::input::{InputPipeline, decode_input_report, register_inputs};
use crate::migration::{
    MigrationOutcome, base_capability_rules, generic_migration_map, run_migrations,
};
use crate::profiles::{DeviceProfile, ShutterCalibration, base_settings_schema};
use crate::rgbw::{LightController, LightHandle};
use crate::settings::{
    REPAIR_MESSAGE, SettingsChange, SettingsSchema, plan_parameter_writes, requires_repair,
    write_parameters,
};
use crate::topology::{EndpointPurpose, Resolution, Topology};
use crate::zwave::{Command, CommandClass, Report, Request, ZwaveNode};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Settings flag marking completed multi-channel reporting setup.
pub const MULTI_CHANNEL_REPORTING_CONFIGURED: &str = "multiChannelReportingConfigured";
/// Reason shown while initialization is running.
pub const CONFIGURING: &str = "configuring";

/// Mutable view handed to a profile while it registers capabilities.
pub struct Registration<'a> {
    node: &'a dyn ZwaveNode,
    record: &'a dyn DeviceRecord,
    topology: &'a Topology,
    config: &'a Config,
    bindings: &'a mut BindingRegistry,
    unavailable: Option<String>,
    light_endpoint: Option<Option<u8>>,
}

impl<'a> Registration<'a> {
    pub fn node(&self) -> &'a dyn ZwaveNode {
        self.node
    }

    pub fn record(&self) -> &'a dyn DeviceRecord {
        self.record
    }

    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Endpoint used by bindings without an explicit target.
    pub fn default_endpoint(&self) -> Option<u8> {
        self.bindings.default_endpoint()
    }

    /// Bind a capability; a missing mandatory command class marks the
    /// device unavailable.
    pub fn bind(
        &mut self,
        capability: Capability,
        command_class: CommandClass,
        options: BindOptions,
    ) -> BindOutcome {
        let outcome = self
            .bindings
            .bind(self.record, self.node, capability, command_class, options);
        if let BindOutcome::MissingCommandClass {
            endpoint,
            mandatory: true,
        } = outcome
        {
            let missing = BridgeError::MissingCommandClass {
                command_class: command_class.to_string(),
                endpoint: match endpoint {
                    Some(index) => format!("endpoint {index}"),
                    None => "the root node".to_string(),
                },
            };
            self.mark_unavailable(&missing.to_string());
        }
        outcome
    }

    /// Add a capability if the record lacks it.
    pub async fn ensure_capability(&self, capability: Capability) {
        if self.record.has_capability(capability) {
            return;
        }
        match self.record.add_capability(capability).await {
            Ok(()) => info!("[Device] Added capability {}", capability),
            Err(e) => error!("[Device] Failed to add capability {}: {}", capability, e),
        }
    }

    /// Remove a capability if the record declares it.
    pub async fn remove_capability(&self, capability: Capability) {
        if !self.record.has_capability(capability) {
            return;
        }
        match self.record.remove_capability(capability).await {
            Ok(()) => info!("[Device] Removed capability {}", capability),
            Err(e) => error!("[Device] Failed to remove capability {}: {}", capability, e),
        }
    }

    /// Serve the light capabilities through the RGBW light task.
    pub fn enable_light(&mut self, endpoint: Option<u8>) {
        self.light_endpoint = Some(endpoint);
    }

    /// Keep the device unavailable after initialization. The first reason wins.
    pub fn mark_unavailable(&mut self, reason: &str) {
        warn!("[Device] Unavailable: {}", reason);
        self.unavailable.get_or_insert_with(|| reason.to_string());
    }

    /// Temperature sensor endpoint, falling back to the root node.
    async fn register_temperature_sensor(&mut self) {
        let resolution = self
            .topology
            .resolve_command_class(EndpointPurpose::TemperatureSensor, CommandClass::SensorMultilevel);
        match resolution {
            Resolution::Absent => {
                debug!("[Device] No temperature sensor");
                self.remove_capability(Capability::MeasureTemperature).await;
            }
            found => {
                self.bind(
                    Capability::MeasureTemperature,
                    CommandClass::SensorMultilevel,
                    BindOptions::new().endpoint(found.endpoint()),
                );
            }
        }
    }

    fn finish(self) -> (Option<String>, Option<Option<u8>>) {
        (self.unavailable, self.light_endpoint)
    }
}

pub struct DeviceSession {
    node: Arc<dyn ZwaveNode>,
    record: Arc<dyn DeviceRecord>,
    flows: Arc<dyn FlowSink>,
    profile: Box<dyn DeviceProfile>,
    schema: SettingsSchema,
    topology: Topology,
    bindings: BindingRegistry,
    inputs: InputPipeline,
    light: Option<LightHandle>,
    light_task: Option<JoinHandle<()>>,
    calibration: Option<ShutterCalibration>,
    migration: MigrationOutcome,
}

impl DeviceSession {
    pub async fn initialize(
        node: Arc<dyn ZwaveNode>,
        record: Arc<dyn DeviceRecord>,
        flows: Arc<dyn FlowSink>,
        profile: Box<dyn DeviceProfile>,
        config: Config,
    ) -> Result<Self> {
        info!(
            "[Device] Initializing node {} as {}",
            node.node().node_id,
            profile.id()
        );
        if let Err(e) = record.set_unavailable(CONFIGURING).await {
            warn!("[Device] Failed to mark device as configuring: {}", e);
        }

        let topology = Topology::new(node.node().clone())
            .with_root_device_class(profile.root_device_class())
            .with_multi_channel_disabled(profile.multi_channel_configuration_disabled());
        debug!("[Topology] {:?}", topology.assignment());

        let schema = base_settings_schema().merge(profile.settings_schema());
        let migration_map = generic_migration_map().overlay(profile.migration_map());
        let mut rules = base_capability_rules();
        rules.extend(profile.capability_rules());
        let migration = run_migrations(
            record.as_ref(),
            topology.node(),
            &migration_map,
            &schema,
            &rules,
        )
        .await;

        let unavailable = configure_multi_channel_reporting(node.as_ref(), record.as_ref()).await;

        let mut bindings = BindingRegistry::new(topology.root_device_endpoint());
        let mut registration = Registration {
            node: node.as_ref(),
            record: record.as_ref(),
            topology: &topology,
            config: &config,
            bindings: &mut bindings,
            unavailable,
            light_endpoint: None,
        };
        profile.register_capabilities(&mut registration).await?;
        registration.register_temperature_sensor().await;
        let (unavailable, light_endpoint) = registration.finish();

        let inputs = register_inputs(
            node.as_ref(),
            record.as_ref(),
            &topology,
            &profile.input_configs(),
            config.transport.configuration_get_attempts,
            config.transport.timeout(),
        )
        .await;

        let (light, light_task) = match light_endpoint {
            Some(endpoint) => {
                let (handle, task) = LightController::new(node.clone(), record.clone(), endpoint)
                    .with_windows(
                        config.timing.capability_write_debounce(),
                        config.timing.color_report_debounce(),
                    )
                    .start();
                (Some(handle), Some(task))
            }
            None => (None, None),
        };

        let calibration = profile.traits().shutter.then(|| {
            ShutterCalibration::new(
                node.clone(),
                config.timing.calibration_reset(),
                config.timing.calibration_restart_delay(),
            )
        });

        let mut session = Self {
            node,
            record,
            flows,
            profile,
            schema,
            topology,
            bindings,
            inputs,
            light,
            light_task,
            calibration,
            migration,
        };
        session.run_start_requests().await;

        let availability = match &unavailable {
            Some(reason) => session.record.set_unavailable(reason).await,
            None => session.record.set_available().await,
        };
        if let Err(e) = availability {
            warn!("[Device] Failed to update availability: {}", e);
        }
        info!("[Device] Node {} initialized", session.node.node().node_id);
        Ok(session)
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn inputs(&self) -> &InputPipeline {
        &self.inputs
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn migration(&self) -> &MigrationOutcome {
        &self.migration
    }

    pub fn profile(&self) -> &dyn DeviceProfile {
        self.profile.as_ref()
    }

    /// Route one report from the transport.
    pub async fn handle_report(&mut self, endpoint: Option<u8>, report: Report) {
        if let Some(index) = endpoint
            && self.inputs.handles(index)
            && decode_input_report(&report).is_some()
        {
            match self.inputs.process(index, &report) {
                Ok(flow_ids) => {
                    for flow_id in flow_ids {
                        trigger_flow(self.flows.as_ref(), &flow_id, Settings::new(), Settings::new())
                            .await;
                    }
                }
                Err(e) => warn!("[Input] {}", e),
            }
            return;
        }

        if let Report::SwitchColor { component, value } = &report
            && let Some(light) = &self.light
        {
            if let Err(e) = light.report(*component, *value).await {
                warn!("[RGBW] {}", e);
            }
            return;
        }

        let parsed = self
            .bindings
            .parse_report(endpoint, &report, self.record.as_ref());
        if parsed.is_empty() {
            debug!("[Device] Unhandled {} on endpoint {:?}", report.name(), endpoint);
        }
        for (capability, parsed) in parsed {
            if let Some(value) = parsed.value {
                self.store_capability(capability, value).await;
            }
            self.apply_effects(parsed.effects).await;
        }
    }

    /// Handle a hub write to a capability.
    pub async fn set_capability(&mut self, capability: Capability, value: Value) -> Result<()> {
        if let Some(light) = &self.light
            && Capability::LIGHT.contains(&capability)
        {
            return light.write(capability, value).await;
        }

        match capability {
            Capability::ButtonResetMeter => return self.reset_meter(None).await,
            Capability::ButtonCalibration => return self.calibrate().await,
            Capability::AllOn => return self.turn_all_on().await,
            Capability::AllOff => return self.turn_all_off().await,
            _ => {}
        }

        let (endpoint, outcome) = self
            .bindings
            .build_set(capability, &value, self.record.as_ref())?;
        if let Some(command) = outcome.command {
            self.node.send_command(endpoint, command).await?;
        }
        self.apply_effects(outcome.effects).await;
        self.store_capability(capability, value).await;
        Ok(())
    }

    /// Validate, write and persist a settings change.
    ///
    /// Returns the message to show when a changed setting needs re-pairing.
    pub async fn on_settings(&mut self, change: SettingsChange) -> Result<Option<String>> {
        self.profile.validate_settings(&change)?;

        let writes = plan_parameter_writes(
            &change,
            &self.schema,
            self.profile.all_on_all_off_parameter(),
        );
        write_parameters(self.node.as_ref(), &writes).await?;

        let accepted: Settings = change
            .changed
            .iter()
            .filter_map(|key| change.new.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        if !accepted.is_empty() {
            self.record.set_settings(accepted).await?;
        }

        let effects = self
            .profile
            .settings_effects(&change, self.record.as_ref());
        self.apply_effects(effects).await;

        let repair_keys = self.profile.repair_keys();
        Ok(requires_repair(&change, &repair_keys).then(|| REPAIR_MESSAGE.to_string()))
    }

    /// Reset the energy meter of an endpoint, by default the metering
    /// endpoint.
    pub async fn reset_meter(&self, endpoint: Option<u8>) -> Result<()> {
        let endpoint = match endpoint {
            Some(index) => Some(index),
            None => self
                .bindings
                .endpoint_of(Capability::MeterPower)
                .or_else(|| self.bindings.endpoint_of(Capability::MeasurePower))
                .unwrap_or(self.bindings.default_endpoint()),
        };
        if !self
            .node
            .node()
            .endpoint_supports(endpoint, CommandClass::Meter)
        {
            return Err(BridgeError::Unsupported(
                "device_does_not_support_meter_reset".to_string(),
            ));
        }
        self.node.send_command(endpoint, Command::MeterReset).await?;
        info!("[Device] Meter reset on endpoint {:?}", endpoint);
        self.store_capability(Capability::MeterPower, Value::Number(0.0))
            .await;
        Ok(())
    }

    pub async fn turn_all_on(&self) -> Result<()> {
        self.switch_all(true).await
    }

    pub async fn turn_all_off(&self) -> Result<()> {
        self.switch_all(false).await
    }

    async fn switch_all(&self, on: bool) -> Result<()> {
        if !self.node.node().supports(CommandClass::SwitchBinary) {
            return Err(BridgeError::Unsupported(
                "device_does_not_support_switch_binary".to_string(),
            ));
        }
        self.node
            .send_command(None, Command::SwitchBinarySet { on })
            .await?;
        info!("[Device] Switched all outputs {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// Write the thermostat mode and read it back from the device.
    pub async fn set_thermostat_mode(&mut self, mode: &str) -> Result<()> {
        let Some(endpoint) = self.bindings.endpoint_of(Capability::OffAutoThermostatMode) else {
            return Err(BridgeError::Unsupported(
                "device_does_not_support_thermostat_mode".to_string(),
            ));
        };
        self.set_capability(Capability::OffAutoThermostatMode, Value::from(mode))
            .await?;
        match self.node.request(endpoint, Request::ThermostatModeGet).await {
            Ok(report) => self.handle_report(endpoint, report).await,
            Err(e) => warn!("[Thermostat] Failed to refresh mode: {}", e),
        }
        Ok(())
    }

    pub async fn calibrate(&self) -> Result<()> {
        let calibration = self.calibration.as_ref().ok_or_else(|| {
            BridgeError::Unsupported("device_does_not_support_calibration".to_string())
        })?;
        calibration.trigger().await
    }

    /// Stop the light task, flushing a pending write.
    pub async fn shutdown(mut self) {
        self.light = None;
        if let Some(task) = self.light_task.take()
            && let Err(e) = task.await
        {
            warn!("[RGBW] Light task ended abnormally: {}", e);
        }
    }

    async fn run_start_requests(&mut self) {
        for (capability, request) in self.profile.start_requests() {
            let Some(endpoint) = self.bindings.endpoint_of(capability) else {
                continue;
            };
            match self.node.request(endpoint, request).await {
                Ok(report) => self.handle_report(endpoint, report).await,
                Err(e) => warn!("[Device] Initial read of {} failed: {}", capability, e),
            }
        }
    }

    async fn store_capability(&self, capability: Capability, value: Value) {
        if !self.record.has_capability(capability) {
            debug!("[Device] {} not declared, dropping {}", capability, value);
            return;
        }
        if let Err(e) = self.record.set_capability_value(capability, value).await {
            warn!("[Device] Failed to update {}: {}", capability, e);
        }
    }

    async fn apply_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Capability(capability, value) => {
                    self.store_capability(capability, value).await;
                }
                Effect::Store(key, value) => {
                    if let Err(e) = self.record.set_store_value(&key, value).await {
                        warn!("[Device] Failed to store {}: {}", key, e);
                    }
                }
                Effect::Setting(key, value) => {
                    let update = Settings::from([(key.clone(), value)]);
                    if let Err(e) = self.record.set_settings(update).await {
                        warn!("[Settings] Failed to update {}: {}", key, e);
                    }
                }
                Effect::Flow {
                    flow_id,
                    tokens,
                    state,
                } => trigger_flow(self.flows.as_ref(), &flow_id, tokens, state).await,
            }
        }
    }
}

/// Point lifeline group 1 at the controller's root endpoint so every
/// endpoint reports with its own address.
///
/// Returns the reason the device must stay unavailable, if any.
async fn configure_multi_channel_reporting(
    node: &dyn ZwaveNode,
    record: &dyn DeviceRecord,
) -> Option<String> {
    if !node.node().has_sub_endpoints() {
        return None;
    }
    let configured = record
        .setting(MULTI_CHANNEL_REPORTING_CONFIGURED)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if configured {
        return None;
    }

    let mut unavailable = None;
    if !node.node().supports(CommandClass::MultiChannelAssociation) {
        warn!("[Device] Multi channel association not supported, reports stay unaddressed");
        unavailable = Some("missing multi channel command class".to_string());
    } else {
        let commands = [
            Command::AssociationRemove {
                group: 1,
                node_ids: vec![1],
            },
            Command::MultiChannelAssociationSet {
                group: 1,
                node_id: 1,
                endpoint: 1,
            },
        ];
        for command in commands {
            if let Err(e) = node.send_command(None, command).await {
                error!("[Device] Failed to configure multi channel reporting: {}", e);
                unavailable = Some(e.to_string());
                break;
            }
        }
        if unavailable.is_none() {
            info!("[Device] Multi channel reporting configured");
            if let Err(e) = record
                .set_settings(Settings::from([(
                    "zw_group_1".to_string(),
                    Value::from("1.1"),
                )]))
                .await
            {
                warn!("[Settings] Failed to store lifeline association: {}", e);
            }
        }
    }

    if let Err(e) = record
        .set_settings(Settings::from([(
            MULTI_CHANNEL_REPORTING_CONFIGURED.to_string(),
            Value::Bool(true),
        )]))
        .await
    {
        warn!("[Settings] Failed to persist reporting flag: {}", e);
    }
    unavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDeviceRecord;
    use crate::flow::RecordingFlowSink;
    use crate::profiles::{FlushRelay, FlushShutter};
    use crate::simulation::SimulatedNode;
    use crate::zwave::{DeviceClassGeneric, MultiChannelNode, Node};

    fn sensor_relay() -> Node {
        Node::new(3)
            .with_command_class(CommandClass::SwitchBinary)
            .with_command_class(CommandClass::SensorMultilevel)
            .with_command_class(CommandClass::Meter)
    }

    async fn relay_session(
        node: Node,
        record: Arc<MemoryDeviceRecord>,
    ) -> (Arc<SimulatedNode>, DeviceSession) {
        let sim = Arc::new(SimulatedNode::new(node));
        let session = DeviceSession::initialize(
            sim.clone(),
            record,
            Arc::new(RecordingFlowSink::new()),
            Box::new(FlushRelay),
            Config::default(),
        )
        .await
        .unwrap();
        (sim, session)
    }

    #[tokio::test]
    async fn test_temperature_falls_back_to_root() {
        let record = Arc::new(
            MemoryDeviceRecord::new().with_capabilities(&[Capability::MeasureTemperature]),
        );
        let (_sim, mut session) = relay_session(sensor_relay(), record.clone()).await;
        assert_eq!(
            session.bindings().endpoint_of(Capability::MeasureTemperature),
            Some(None)
        );

        session
            .handle_report(
                None,
                Report::SensorMultilevel {
                    sensor: crate::zwave::SensorType::AirTemperature,
                    scale: 0,
                    value: 21.5,
                },
            )
            .await;
        assert_eq!(
            record.capability_value(Capability::MeasureTemperature),
            Some(Value::Number(21.5))
        );
    }

    #[tokio::test]
    async fn test_absent_temperature_sensor_is_removed() {
        let record = Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&[Capability::Onoff, Capability::MeasureTemperature]),
        );
        let node = Node::new(3).with_command_class(CommandClass::SwitchBinary);
        let (_sim, _session) = relay_session(node, record.clone()).await;
        assert!(!record.has_capability(Capability::MeasureTemperature));
        assert!(record.has_capability(Capability::Onoff));
    }

    #[tokio::test]
    async fn test_missing_association_support_marks_unavailable() {
        let node = Node::new(4).with_endpoint(
            1,
            MultiChannelNode::new(DeviceClassGeneric::SwitchBinary)
                .with_command_class(CommandClass::SwitchBinary),
        );
        let record = Arc::new(MemoryDeviceRecord::new());
        let (sim, _session) = relay_session(node, record.clone()).await;

        assert!(!record.is_available());
        assert_eq!(
            record.unavailable_reason(),
            Some("missing multi channel command class".to_string())
        );
        assert!(sim.sent_commands().is_empty());
        assert_eq!(
            record.setting(MULTI_CHANNEL_REPORTING_CONFIGURED),
            Some(Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_failed_write_keeps_capability_value() {
        let record = Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&[Capability::Onoff])
                .with_capability_value(Capability::Onoff, false),
        );
        let (sim, mut session) = relay_session(sensor_relay(), record.clone()).await;
        sim.fail_commands(CommandClass::SwitchBinary);

        let result = session
            .set_capability(Capability::Onoff, Value::Bool(true))
            .await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
        assert_eq!(record.capability_value(Capability::Onoff), Some(Value::Bool(false)));
    }

    #[tokio::test]
    async fn test_repair_message_for_input_enablement() {
        let record = Arc::new(MemoryDeviceRecord::new());
        let (sim, mut session) = relay_session(sensor_relay(), record.clone()).await;

        let change = SettingsChange::new(
            Settings::new(),
            Settings::from([("enableInput2".to_string(), Value::from(1.0))]),
            vec!["enableInput2".to_string()],
        );
        let message = session.on_settings(change).await.unwrap();
        assert_eq!(message, Some(REPAIR_MESSAGE.to_string()));
        assert_eq!(sim.configuration_sets(), vec![(100, 1, 1)]);
    }

    #[tokio::test]
    async fn test_meter_reset_without_meter_is_unsupported() {
        let record = Arc::new(MemoryDeviceRecord::new());
        let node = Node::new(3).with_command_class(CommandClass::SwitchBinary);
        let (_sim, session) = relay_session(node, record).await;
        assert!(matches!(
            session.reset_meter(None).await,
            Err(BridgeError::Unsupported(msg)) if msg == "device_does_not_support_meter_reset"
        ));
    }

    #[tokio::test]
    async fn test_thermostat_mode_needs_binding() {
        let record = Arc::new(MemoryDeviceRecord::new());
        let (_sim, mut session) = relay_session(sensor_relay(), record).await;
        assert!(matches!(
            session.set_thermostat_mode("off").await,
            Err(BridgeError::Unsupported(_))
        ));
        assert!(matches!(session.calibrate().await, Err(BridgeError::Unsupported(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_button_triggers_calibration() {
        let sim = Arc::new(SimulatedNode::new(
            Node::new(9)
                .with_command_class(CommandClass::SwitchMultilevel)
                .with_command_class(CommandClass::Meter),
        ));
        let record = Arc::new(
            MemoryDeviceRecord::new().with_capabilities(&[Capability::WindowcoveringsSet]),
        );
        let mut session = DeviceSession::initialize(
            sim.clone(),
            record,
            Arc::new(RecordingFlowSink::new()),
            Box::new(FlushShutter),
            Config::default(),
        )
        .await
        .unwrap();

        session
            .set_capability(Capability::ButtonCalibration, Value::Bool(true))
            .await
            .unwrap();
        assert_eq!(sim.configuration_sets(), vec![(78, 1, 1)]);

        tokio::time::sleep(Config::default().timing.calibration_reset()).await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(sim.configuration_sets(), vec![(78, 1, 1), (78, 1, 0)]);
    }
}
