//! Flush 1 relay (ZMNHAD).

use super::{
    ALL_ON_ALL_OFF_PARAMETER, DeviceProfile, MIN_POWER_REPORTING_INTERVAL_SECS, ProfileTraits,
    auto_switch_settings, input_settings, metered_settings,
};
use crate::binding::BindOptions;
use crate::device::Capability;
use crate::device::session::Registration;
use crate::error::Result;
use crate::input::InputConfig;
use crate::settings::{SettingSpec, SettingsSchema};
use crate::zwave::CommandClass;
use async_trait::async_trait;

pub const ID: &str = "ZMNHAD";

#[derive(Debug, Default, Clone, Copy)]
pub struct FlushRelay;

#[async_trait]
impl DeviceProfile for FlushRelay {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            metered: true,
            min_power_reporting_interval: Some(MIN_POWER_REPORTING_INTERVAL_SECS),
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        metered_settings()
            .merge(input_settings())
            .merge(auto_switch_settings())
            .with("relayType", SettingSpec::choice().parameter(63, 1))
    }

    fn input_configs(&self) -> Vec<InputConfig> {
        vec![InputConfig::gated(2, 100), InputConfig::gated(3, 101)]
    }

    fn all_on_all_off_parameter(&self) -> Option<(u16, u8)> {
        Some(ALL_ON_ALL_OFF_PARAMETER)
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()> {
        registration
            .ensure_capability(Capability::ButtonResetMeter)
            .await;
        registration.bind(Capability::MeterPower, CommandClass::Meter, BindOptions::new());
        registration.bind(Capability::MeasurePower, CommandClass::Meter, BindOptions::new());
        registration.bind(Capability::Onoff, CommandClass::SwitchBinary, BindOptions::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::session::DeviceSession;
    use crate::device::{DeviceRecord, MemoryDeviceRecord, Value};
    use crate::flow::RecordingFlowSink;
    use crate::simulation::SimulatedNode;
    use crate::zwave::{Command, DeviceClassGeneric, MeterScale, MultiChannelNode, Node, Report};
    use std::sync::Arc;

    fn relay_node() -> Node {
        Node::new(5)
            .with_command_class(CommandClass::MultiChannel)
            .with_command_class(CommandClass::MultiChannelAssociation)
            .with_command_class(CommandClass::SwitchBinary)
            .with_endpoint(
                1,
                MultiChannelNode::new(DeviceClassGeneric::SwitchBinary)
                    .with_command_class(CommandClass::SwitchBinary)
                    .with_command_class(CommandClass::Meter),
            )
            .with_endpoint(
                2,
                MultiChannelNode::new(DeviceClassGeneric::SensorBinary)
                    .with_command_class(CommandClass::SensorBinary),
            )
            .with_endpoint(
                3,
                MultiChannelNode::new(DeviceClassGeneric::SensorBinary)
                    .with_command_class(CommandClass::SensorBinary),
            )
    }

    #[tokio::test]
    async fn test_relay_binds_to_root_device_endpoint() {
        let sim = Arc::new(
            SimulatedNode::new(relay_node())
                .with_parameter(100, 1, 1)
                .with_parameter(101, 1, 1),
        );
        let record = Arc::new(MemoryDeviceRecord::new().with_capabilities(&[
            Capability::Onoff,
            Capability::MeterPower,
            Capability::MeasurePower,
        ]));
        let flows = Arc::new(RecordingFlowSink::new());

        let mut session = DeviceSession::initialize(
            sim.clone(),
            record.clone(),
            flows.clone(),
            Box::new(FlushRelay),
            Config::default(),
        )
        .await
        .unwrap();

        assert!(record.is_available());
        assert!(record.has_capability(Capability::ButtonResetMeter));
        assert_eq!(session.bindings().endpoint_of(Capability::Onoff), Some(Some(1)));

        session
            .set_capability(Capability::Onoff, Value::Bool(true))
            .await
            .unwrap();
        assert!(
            sim.sent_commands()
                .contains(&(Some(1), Command::SwitchBinarySet { on: true }))
        );

        session
            .handle_report(
                Some(1),
                Report::Meter {
                    scale: MeterScale::Watts,
                    value: 7.5,
                },
            )
            .await;
        assert_eq!(
            record.capability_value(Capability::MeasurePower),
            Some(Value::Number(7.5))
        );

        session
            .handle_report(
                Some(3),
                Report::SensorBinary {
                    sensor_value: "detected an event".to_string(),
                },
            )
            .await;
        assert_eq!(
            flows.flow_ids(),
            vec!["inputThreeToggled", "inputThreeTurnedOn"]
        );
    }
}
