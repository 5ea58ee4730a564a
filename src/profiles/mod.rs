//! Device profiles.
//!
//! A profile describes one device family: its legacy settings keys, the
//! capabilities it gains or loses on migration, its digital inputs, its
//! configuration parameters and how its capabilities bind to command
//! classes. Everything else (migration gating, reporting setup, temperature
//! sensor, input registration, report dispatch) is shared by the session.

pub mod dimmer;
pub mod din_dimmer;
pub mod relay;
pub mod rgbw;
pub mod shutter;
pub mod thermostat;
pub mod two_relay;

pub use dimmer::FlushDimmer;
pub use din_dimmer::DinDimmer;
pub use relay::FlushRelay;
pub use rgbw::RgbwDimmer;
pub use shutter::{FlushShutter, ShutterCalibration};
pub use thermostat::FlushThermostat;
pub use two_relay::FlushTwoRelay;

use crate::binding::Effect;
use crate::device::session::Registration;
use crate::device::{Capability, DeviceRecord};
use crate::error::{BridgeError, Result};
use crate::input::InputConfig;
use crate::migration::range::TenthsCodec;
use crate::migration::{ALL_OFF, ALL_ON, CapabilityRule, MigrationMap};
use crate::settings::{
    Encoding, SettingSpec, SettingsChange, SettingsSchema, validate_dim_bounds,
    validate_power_reporting_interval,
};
use crate::zwave::{DeviceClassGeneric, Request};
use async_trait::async_trait;

/// Lowest accepted nonzero power reporting interval, in seconds.
pub const MIN_POWER_REPORTING_INTERVAL_SECS: f64 = 30.0;

/// Index and size of the packed all-on/all-off parameter.
pub const ALL_ON_ALL_OFF_PARAMETER: (u16, u8) = (10, 2);

pub const PROFILE_IDS: [&str; 7] = [
    relay::ID,
    two_relay::ID,
    dimmer::ID,
    din_dimmer::ID,
    thermostat::ID,
    shutter::ID,
    rgbw::ID,
];

/// Behaviors a profile is composed of.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileTraits {
    pub dimmable: bool,
    pub metered: bool,
    pub thermostat: bool,
    pub shutter: bool,
    pub rgbw: bool,
    /// Reject nonzero power reporting intervals below this many seconds
    pub min_power_reporting_interval: Option<f64>,
}

#[async_trait]
pub trait DeviceProfile: Send + Sync + 'static {
    fn id(&self) -> &'static str;

    fn traits(&self) -> ProfileTraits;

    /// Profile-specific settings, merged over [`base_settings_schema`].
    fn settings_schema(&self) -> SettingsSchema;

    /// Device-specific legacy keys, overlaid on the generic map.
    fn migration_map(&self) -> MigrationMap {
        MigrationMap::new()
    }

    /// Rules appended to the base capability rules.
    fn capability_rules(&self) -> Vec<CapabilityRule> {
        Vec::new()
    }

    /// Inputs in declaration order. The order decides which sensor endpoint
    /// each input is bound to on already paired devices.
    fn input_configs(&self) -> Vec<InputConfig> {
        Vec::new()
    }

    fn root_device_class(&self) -> Option<DeviceClassGeneric> {
        None
    }

    fn multi_channel_configuration_disabled(&self) -> bool {
        false
    }

    /// Settings that only apply after re-pairing.
    fn repair_keys(&self) -> Vec<&'static str> {
        vec![
            "enableInput1",
            "enableInput2",
            "enableInput3",
            "functionalityInput3",
            "thermostatMode",
            "workingMode",
        ]
    }

    fn all_on_all_off_parameter(&self) -> Option<(u16, u8)> {
        None
    }

    fn validate_settings(&self, change: &SettingsChange) -> Result<()> {
        let traits = self.traits();
        if traits.dimmable {
            validate_dim_bounds(change)?;
        }
        if let Some(minimum) = traits.min_power_reporting_interval {
            validate_power_reporting_interval(change, minimum)?;
        }
        Ok(())
    }

    /// Capability updates implied by an accepted settings change.
    fn settings_effects(&self, _change: &SettingsChange, _record: &dyn DeviceRecord) -> Vec<Effect> {
        Vec::new()
    }

    /// Status reads issued once registration is complete.
    fn start_requests(&self) -> Vec<(Capability, Request)> {
        Vec::new()
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()>;
}

/// Look up a profile by its product id.
pub fn profile_by_id(id: &str) -> Result<Box<dyn DeviceProfile>> {
    let profile: Box<dyn DeviceProfile> = match id {
        relay::ID => Box::new(FlushRelay),
        two_relay::ID => Box::new(FlushTwoRelay),
        dimmer::ID => Box::new(FlushDimmer),
        din_dimmer::ID => Box::new(DinDimmer),
        thermostat::ID => Box::new(FlushThermostat),
        shutter::ID => Box::new(FlushShutter),
        rgbw::ID => Box::new(RgbwDimmer),
        other => return Err(BridgeError::UnknownProfile(other.to_string())),
    };
    Ok(profile)
}

/// Settings every family shares.
pub fn base_settings_schema() -> SettingsSchema {
    SettingsSchema::new()
        .with(ALL_ON, SettingSpec::choice())
        .with(ALL_OFF, SettingSpec::choice())
        .with(
            "restoreStatus",
            SettingSpec::choice().encoded_parameter(30, 1, Encoding::Inverted),
        )
        .with(
            "temperatureSensorOffset",
            SettingSpec::number(-10.0, 10.0).step(0.1).encoded_parameter(
                110,
                2,
                Encoding::Tenths(TenthsCodec::TEMPERATURE_OFFSET),
            ),
        )
        .with(
            "temperatureSensorReportingThreshold",
            SettingSpec::number(0.0, 12.7)
                .step(0.1)
                .encoded_parameter(120, 1, Encoding::Scaled(10.0)),
        )
}

/// Power reporting on a single metered output.
pub fn metered_settings() -> SettingsSchema {
    SettingsSchema::new()
        .with(
            "powerReportingThreshold",
            SettingSpec::number(0.0, 100.0).parameter(40, 1),
        )
        .with(
            "powerReportingInterval",
            SettingSpec::number(0.0, 32767.0).parameter(42, 2),
        )
}

/// Switch type, contact type and enablement of the inputs.
pub fn input_settings() -> SettingsSchema {
    SettingsSchema::new()
        .with("switchTypeInput1", SettingSpec::choice().parameter(1, 1))
        .with("contactTypeInput2", SettingSpec::choice().parameter(2, 1))
        .with("contactTypeInput3", SettingSpec::choice().parameter(3, 1))
        .with("enableInput2", SettingSpec::choice().parameter(100, 1))
        .with("enableInput3", SettingSpec::choice().parameter(101, 1))
}

/// Timed switching of a single output.
pub fn auto_switch_settings() -> SettingsSchema {
    SettingsSchema::new()
        .with("autoOff", SettingSpec::number(0.0, 32535.0).parameter(11, 2))
        .with("autoOn", SettingSpec::number(0.0, 32535.0).parameter(12, 2))
}

/// Dim bounds and dim durations; `dim_duration_factor` converts seconds to
/// device units.
pub fn dim_settings(dim_duration_factor: f64) -> SettingsSchema {
    SettingsSchema::new()
        .with(
            crate::settings::MINIMUM_DIM_VALUE,
            SettingSpec::number(1.0, 98.0).parameter(60, 1),
        )
        .with(
            crate::settings::MAXIMUM_DIM_VALUE,
            SettingSpec::number(2.0, 99.0).parameter(61, 1),
        )
        .with(
            "dimDuration",
            SettingSpec::number(0.0, 127.0).step(0.1).encoded_parameter(
                65,
                2,
                Encoding::Scaled(dim_duration_factor),
            ),
        )
        .with(
            "dimDurationKeyPressed",
            SettingSpec::number(1.0, 127.0).parameter(66, 1),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Settings, Value};
    use crate::settings::{MAXIMUM_DIM_VALUE, MINIMUM_DIM_VALUE, POWER_REPORTING_INTERVAL};

    fn change(new: &[(&str, Value)]) -> SettingsChange {
        let new: Settings = new.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let changed = new.keys().cloned().collect();
        SettingsChange::new(Settings::new(), new, changed)
    }

    #[test]
    fn test_profile_lookup() {
        for id in PROFILE_IDS {
            assert_eq!(profile_by_id(id).unwrap().id(), id);
        }
        assert!(matches!(
            profile_by_id("ZMNHXX"),
            Err(BridgeError::UnknownProfile(id)) if id == "ZMNHXX"
        ));
    }

    #[test]
    fn test_trait_based_validation() {
        let dimmer = profile_by_id(dimmer::ID).unwrap();
        let relay = profile_by_id(relay::ID).unwrap();
        let inverted_bounds = change(&[
            (MAXIMUM_DIM_VALUE, Value::from(10.0)),
            (MINIMUM_DIM_VALUE, Value::from(50.0)),
        ]);
        assert!(dimmer.validate_settings(&inverted_bounds).is_err());
        assert!(relay.validate_settings(&inverted_bounds).is_ok());

        let short_interval = change(&[(POWER_REPORTING_INTERVAL, Value::from(5.0))]);
        assert!(relay.validate_settings(&short_interval).is_err());
        let rgbw = profile_by_id(rgbw::ID).unwrap();
        assert!(rgbw.validate_settings(&short_interval).is_ok());
    }
}
