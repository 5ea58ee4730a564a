//! Flush dimmer (ZMNHDD).

use super::{
    ALL_ON_ALL_OFF_PARAMETER, DeviceProfile, MIN_POWER_REPORTING_INTERVAL_SECS, ProfileTraits,
    auto_switch_settings, dim_settings, input_settings, metered_settings,
};
use crate::binding::BindOptions;
use crate::device::Capability;
use crate::device::session::Registration;
use crate::error::Result;
use crate::input::InputConfig;
use crate::settings::SettingsSchema;
use crate::zwave::CommandClass;
use async_trait::async_trait;

pub const ID: &str = "ZMNHDD";

/// Seconds to the 10 ms units of the soft on/off duration parameter.
pub const DIM_DURATION_FACTOR: f64 = 100.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct FlushDimmer;

#[async_trait]
impl DeviceProfile for FlushDimmer {
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
            .merge(input_settings())
            .merge(auto_switch_settings())
            .merge(dim_settings(DIM_DURATION_FACTOR))
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
        registration.bind(Capability::Dim, CommandClass::SwitchMultilevel, BindOptions::new());
        registration.bind(Capability::Onoff, CommandClass::SwitchBinary, BindOptions::new());
        Ok(())
    }
}
