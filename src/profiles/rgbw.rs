//! Flush RGBW dimmer (ZMNHWD).
//!
//! Light capabilities are served by the RGBW light task; only `onoff` and
//! `dim` reports are bound directly.

use super::{ALL_ON_ALL_OFF_PARAMETER, DeviceProfile, ProfileTraits, auto_switch_settings, dim_settings};
use crate::binding::BindOptions;
use crate::device::Capability;
use crate::device::session::Registration;
use crate::error::Result;
use crate::settings::{Encoding, SettingSpec, SettingsSchema};
use crate::zwave::CommandClass;
use async_trait::async_trait;
use log::warn;

pub const ID: &str = "ZMNHWD";

/// Seconds to the 100 ms units of the dim duration parameter.
pub const DIM_DURATION_FACTOR: f64 = 10.0;
pub const SCENE_TRANSITION_UNIT: &str = "autoSceneModeTransitionDurationUnit";

#[derive(Debug, Default, Clone, Copy)]
pub struct RgbwDimmer;

#[async_trait]
impl DeviceProfile for RgbwDimmer {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            dimmable: true,
            rgbw: true,
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        dim_settings(DIM_DURATION_FACTOR)
            .merge(auto_switch_settings())
            .with(SCENE_TRANSITION_UNIT, SettingSpec::choice())
            .with(
                "autoSceneModeTransitionDuration",
                SettingSpec::number(1.0, 127.0).encoded_parameter(
                    4,
                    2,
                    Encoding::Duration {
                        unit_key: SCENE_TRANSITION_UNIT.to_string(),
                    },
                ),
            )
    }

    fn all_on_all_off_parameter(&self) -> Option<(u16, u8)> {
        Some(ALL_ON_ALL_OFF_PARAMETER)
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()> {
        registration.bind(Capability::Onoff, CommandClass::SwitchMultilevel, BindOptions::new());
        registration.bind(Capability::Dim, CommandClass::SwitchMultilevel, BindOptions::new());

        let endpoint = registration.default_endpoint();
        if !registration
            .node()
            .node()
            .endpoint_supports(endpoint, CommandClass::SwitchColor)
        {
            warn!("[RGBW] Color switch missing on endpoint {:?}", endpoint);
            registration.mark_unavailable("missing color command class");
            return Ok(());
        }
        registration.enable_light(endpoint);
        Ok(())
    }
}
