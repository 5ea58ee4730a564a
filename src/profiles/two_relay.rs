//! Flush 2 relays (ZMNHBD).
//!
//! The hub pairs the root node and one device per relay endpoint. The root
//! record only switches both relays at once; each relay record carries its
//! own switch and meter.

use super::{ALL_ON_ALL_OFF_PARAMETER, DeviceProfile, ProfileTraits, input_settings};
use crate::binding::BindOptions;
use crate::device::Capability;
use crate::device::session::Registration;
use crate::error::Result;
use crate::migration::{CapabilityRule, MigrationMap, RuleCondition};
use crate::settings::{SettingSpec, SettingsSchema};
use crate::zwave::CommandClass;
use async_trait::async_trait;

pub const ID: &str = "ZMNHBD";

#[derive(Debug, Default, Clone, Copy)]
pub struct FlushTwoRelay;

#[async_trait]
impl DeviceProfile for FlushTwoRelay {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            metered: true,
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        let mut schema = input_settings();
        for (output, offset) in [("Q1", 0u16), ("Q2", 1)] {
            schema = schema
                .with(
                    &format!("autoOff{output}"),
                    SettingSpec::number(0.0, 32535.0).parameter(11 + 2 * offset, 2),
                )
                .with(
                    &format!("autoOn{output}"),
                    SettingSpec::number(0.0, 32535.0).parameter(12 + 2 * offset, 2),
                )
                .with(
                    &format!("powerReportingThreshold{output}"),
                    SettingSpec::number(0.0, 100.0).parameter(40 + offset, 1),
                )
                .with(
                    &format!("powerReportingInterval{output}"),
                    SettingSpec::number(0.0, 32767.0).parameter(42 + offset, 2),
                )
                .with(
                    &format!("relayType{output}"),
                    SettingSpec::choice().parameter(63 + offset, 1),
                );
        }
        schema
    }

    fn migration_map(&self) -> MigrationMap {
        MigrationMap::new()
            .rename("autoOffQ1", "automatic_turning_off_output_q1_after_set_time")
            .rename("autoOffQ2", "automatic_turning_off_output_q2_after_set_time")
            .rename("autoOnQ1", "automatic_turning_on_output_q1_after_set_time")
            .rename("autoOnQ2", "automatic_turning_on_output_q2_after_set_time")
            .rename("powerReportingThresholdQ1", "power_report_on_power_change_q1")
            .rename("powerReportingThresholdQ2", "power_report_on_power_change_q2")
            .rename("powerReportingIntervalQ1", "power_report_by_time_interval_q1")
            .rename("powerReportingIntervalQ2", "power_report_by_time_interval_q2")
            // Legacy keys carry a trailing space
            .rename("relayTypeQ1", "output_switch_selection_q1 ")
            .rename("relayTypeQ2", "output_switch_selection_q2 ")
    }

    fn capability_rules(&self) -> Vec<CapabilityRule> {
        vec![
            CapabilityRule::add(Capability::MeterPower).when(RuleCondition::NoSubEndpoints),
            CapabilityRule::add(Capability::MeasurePower).when(RuleCondition::NoSubEndpoints),
            CapabilityRule::remove(Capability::Onoff).when(RuleCondition::HasSubEndpoints),
            CapabilityRule::remove(Capability::MeterPower).when(RuleCondition::HasSubEndpoints),
            CapabilityRule::remove(Capability::MeasurePower).when(RuleCondition::HasSubEndpoints),
            CapabilityRule::add(Capability::AllOn).when(RuleCondition::HasSubEndpoints),
            CapabilityRule::add(Capability::AllOff).when(RuleCondition::HasSubEndpoints),
        ]
    }

    fn all_on_all_off_parameter(&self) -> Option<(u16, u8)> {
        Some(ALL_ON_ALL_OFF_PARAMETER)
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()> {
        if !registration.topology().is_multi_channel() {
            registration
                .ensure_capability(Capability::ButtonResetMeter)
                .await;
        }
        registration.bind(Capability::MeterPower, CommandClass::Meter, BindOptions::new());
        registration.bind(Capability::MeasurePower, CommandClass::Meter, BindOptions::new());
        registration.bind(Capability::Onoff, CommandClass::SwitchBinary, BindOptions::new());
        Ok(())
    }
}
