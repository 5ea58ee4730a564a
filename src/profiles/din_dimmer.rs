//! DIN rail dimmer (ZMNHDA).
//!
//! The device never reports its dim level when switched through
//! switch-binary, so the last non-zero dim is kept in the store and
//! restored on the `dim` capability when the light is turned back on.

use super::{
    ALL_ON_ALL_OFF_PARAMETER, DeviceProfile, MIN_POWER_REPORTING_INTERVAL_SECS, ProfileTraits,
    auto_switch_settings, dim_settings, metered_settings,
};
use crate::binding::parsers::{expect_bool, level_to_fraction};
use crate::binding::{BindOptions, Effect, ParserContext, Parsed, SetOutcome};
use crate::device::session::Registration;
use crate::device::{Capability, Value};
use crate::error::Result;
use crate::input::InputConfig;
use crate::migration::CapabilityRule;
use crate::settings::{SettingSpec, SettingsSchema};
use crate::zwave::{Command, CommandClass, Report};
use async_trait::async_trait;

pub const ID: &str = "ZMNHDA";

pub const CACHED_DIM_VALUE: &str = "cachedDimValue";

#[derive(Debug, Default, Clone, Copy)]
pub struct DinDimmer;

#[async_trait]
impl DeviceProfile for DinDimmer {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            dimmable: true,
            metered: true,
            min_power_reporting_interval: Some(MIN_POWER_REPORTING_INTERVAL_SECS),
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        metered_settings()
            .merge(auto_switch_settings())
            .merge(dim_settings(super::dimmer::DIM_DURATION_FACTOR))
            .with("switchTypeInput1", SettingSpec::choice().parameter(1, 1))
    }

    fn capability_rules(&self) -> Vec<CapabilityRule> {
        vec![CapabilityRule::remove(Capability::AlarmContact)]
    }

    fn input_configs(&self) -> Vec<InputConfig> {
        vec![InputConfig::enabled(2), InputConfig::enabled(3)]
    }

    fn multi_channel_configuration_disabled(&self) -> bool {
        true
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
        registration.bind(
            Capability::Onoff,
            CommandClass::SwitchBinary,
            BindOptions::new().set_parser(set_onoff),
        );
        registration.bind(
            Capability::Dim,
            CommandClass::SwitchMultilevel,
            BindOptions::new().report_parser(report_dim),
        );
        Ok(())
    }
}

/// Switch the output and move `dim` to 0 or back to the cached level.
fn set_onoff(value: &Value, ctx: &ParserContext) -> Result<SetOutcome> {
    let on = expect_bool(value)?;
    let mut outcome = SetOutcome::command(Command::SwitchBinarySet { on });

    let current_dim = ctx
        .record
        .capability_value(Capability::Dim)
        .and_then(|v| v.as_f64())
        .filter(|dim| *dim > 0.0);
    if let Some(dim) = current_dim {
        outcome = outcome.with_effect(Effect::Store(CACHED_DIM_VALUE.to_string(), Value::Number(dim)));
    }

    if !on {
        return Ok(outcome.with_effect(Effect::Capability(Capability::Dim, Value::Number(0.0))));
    }
    let restored = current_dim.or_else(|| {
        ctx.record
            .store_value(CACHED_DIM_VALUE)
            .and_then(|v| v.as_f64())
    });
    if let Some(dim) = restored {
        outcome = outcome.with_effect(Effect::Capability(Capability::Dim, Value::Number(dim)));
    }
    Ok(outcome)
}

/// Dim level report; also drives `onoff` and refreshes the cache.
fn report_dim(report: &Report, _ctx: &ParserContext) -> Parsed {
    let Report::SwitchMultilevel { level } = report else {
        return Parsed::ignore();
    };
    let dim = level_to_fraction(*level);
    let parsed = Parsed::value(dim).with_effect(Effect::Capability(
        Capability::Onoff,
        Value::Bool(*level > 0),
    ));
    if dim > 0.0 {
        parsed.with_effect(Effect::Store(CACHED_DIM_VALUE.to_string(), Value::Number(dim)))
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::session::DeviceSession;
    use crate::device::{DeviceRecord, MemoryDeviceRecord};
    use crate::flow::RecordingFlowSink;
    use crate::simulation::SimulatedNode;
    use crate::zwave::{DeviceClassGeneric, MultiChannelNode, Node};
    use std::sync::Arc;

    fn din_node() -> Node {
        Node::new(14)
            .with_command_class(CommandClass::SwitchBinary)
            .with_command_class(CommandClass::SwitchMultilevel)
            .with_command_class(CommandClass::Meter)
            .with_command_class(CommandClass::MultiChannelAssociation)
            .with_endpoint(
                1,
                MultiChannelNode::new(DeviceClassGeneric::SwitchMultilevel)
                    .with_command_class(CommandClass::SwitchMultilevel),
            )
            .with_endpoint(
                2,
                MultiChannelNode::new(DeviceClassGeneric::SensorBinary)
                    .with_command_class(CommandClass::SensorBinary),
            )
    }

    #[tokio::test]
    async fn test_off_then_on_restores_cached_dim() {
        let sim = Arc::new(SimulatedNode::new(din_node()));
        let record = Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&[Capability::Onoff, Capability::Dim, Capability::AlarmContact])
                .with_capability_value(Capability::Dim, 0.6),
        );

        let mut session = DeviceSession::initialize(
            sim.clone(),
            record.clone(),
            Arc::new(RecordingFlowSink::new()),
            Box::new(DinDimmer),
            Config::default(),
        )
        .await
        .unwrap();

        assert!(!record.has_capability(Capability::AlarmContact));
        // Multi-channel configuration is disabled: bindings address the root
        assert_eq!(session.bindings().endpoint_of(Capability::Onoff), Some(None));
        // Only one sensor endpoint for two statically enabled inputs
        assert_eq!(session.inputs().assignment().len(), 1);

        session
            .set_capability(Capability::Onoff, Value::Bool(false))
            .await
            .unwrap();
        assert_eq!(record.capability_value(Capability::Dim), Some(Value::Number(0.0)));
        assert_eq!(record.store_value(CACHED_DIM_VALUE), Some(Value::Number(0.6)));

        session
            .set_capability(Capability::Onoff, Value::Bool(true))
            .await
            .unwrap();
        assert_eq!(record.capability_value(Capability::Dim), Some(Value::Number(0.6)));
        assert_eq!(
            sim.sent_commands().last(),
            Some(&(None, Command::SwitchBinarySet { on: true }))
        );
    }

    #[tokio::test]
    async fn test_dim_report_drives_onoff() {
        let record = MemoryDeviceRecord::new();
        let ctx = ParserContext::new(&record, None);
        let parsed = report_dim(&Report::SwitchMultilevel { level: 0 }, &ctx);
        assert_eq!(parsed.value, Some(Value::Number(0.0)));
        assert_eq!(
            parsed.effects,
            vec![Effect::Capability(Capability::Onoff, Value::Bool(false))]
        );

        let parsed = report_dim(&Report::SwitchMultilevel { level: 255 }, &ctx);
        assert_eq!(parsed.value, Some(Value::Number(1.0)));
        assert_eq!(parsed.effects.len(), 2);
    }
}
